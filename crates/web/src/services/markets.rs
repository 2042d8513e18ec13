//! Market directory with a short-lived cache.
//!
//! The purchase dialog lists every market each time it opens; the list is
//! cached with `moka` for a configurable TTL and invalidated when this
//! process registers a market.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use shoplist_core::{Market, NormalizedName};
use tracing::{debug, instrument};

use crate::db::{MarketRepository, RepositoryError};
use crate::store::DocumentStore;

/// Markets sorted by name, cached.
#[derive(Clone)]
pub struct MarketDirectory {
    inner: Arc<MarketDirectoryInner>,
}

struct MarketDirectoryInner {
    store: Arc<dyn DocumentStore>,
    cache: Cache<(), Arc<Vec<Market>>>,
}

impl MarketDirectory {
    /// Create a directory caching the market list for `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(1).time_to_live(ttl).build();
        Self {
            inner: Arc::new(MarketDirectoryInner { store, cache }),
        }
    }

    /// All markets sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the list has to be loaded and the query
    /// fails.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Arc<Vec<Market>>, RepositoryError> {
        if let Some(markets) = self.inner.cache.get(&()).await {
            debug!("Market list cache hit");
            return Ok(markets);
        }

        let markets = Arc::new(
            MarketRepository::new(self.inner.store.as_ref())
                .list()
                .await?,
        );
        self.inner.cache.insert((), Arc::clone(&markets)).await;
        Ok(markets)
    }

    /// Whether a market with this name is registered.
    ///
    /// Always asks the store, so a market added by another client is seen
    /// even while the list is cached.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails.
    pub async fn exists(&self, name: &NormalizedName) -> Result<bool, RepositoryError> {
        Ok(MarketRepository::new(self.inner.store.as_ref())
            .find_by_name(name)
            .await?
            .is_some())
    }

    /// Register a market unless it exists. Returns whether it was created.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query or write fails.
    #[instrument(skip(self), fields(market = %name))]
    pub async fn register(&self, name: &NormalizedName) -> Result<bool, RepositoryError> {
        let (_, created) = MarketRepository::new(self.inner.store.as_ref())
            .ensure(name)
            .await?;
        if created {
            self.invalidate().await;
        }
        Ok(created)
    }

    /// Drop the cached list.
    pub async fn invalidate(&self) {
        self.inner.cache.invalidate(&()).await;
    }
}
