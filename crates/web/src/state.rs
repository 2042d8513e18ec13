//! Application state shared across handlers.

use std::sync::Arc;

use shoplist_core::CurrencyCode;

use crate::config::ShoplistConfig;
use crate::live::SyncEngine;
use crate::services::{ListController, MarketDirectory, PurchaseService};
use crate::store::DocumentStore;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the store, the live sync engine and the services built on them.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ShoplistConfig,
    sync: SyncEngine,
    list: ListController,
    markets: MarketDirectory,
    purchases: PurchaseService,
}

impl AppState {
    /// Create a new application state around a started sync engine.
    #[must_use]
    pub fn new(config: ShoplistConfig, sync: SyncEngine) -> Self {
        let store = Arc::clone(sync.store());
        let markets = MarketDirectory::new(Arc::clone(&store), config.market_cache_ttl);
        let purchases = PurchaseService::new(store, markets.clone(), config.price_rule);
        let list = ListController::new(sync.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                sync,
                list,
                markets,
                purchases,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ShoplistConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn currency(&self) -> CurrencyCode {
        self.inner.config.currency
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        self.inner.sync.store()
    }

    #[must_use]
    pub fn sync(&self) -> &SyncEngine {
        &self.inner.sync
    }

    #[must_use]
    pub fn list(&self) -> &ListController {
        &self.inner.list
    }

    #[must_use]
    pub fn markets(&self) -> &MarketDirectory {
        &self.inner.markets
    }

    #[must_use]
    pub fn purchases(&self) -> &PurchaseService {
        &self.inner.purchases
    }
}
