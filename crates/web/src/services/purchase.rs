//! Purchase dialog and purchase confirmation.
//!
//! # States
//!
//! ```text
//! Closed --open--> Open --submit--> Submitting --ok--> Closed
//!                   ^                   |
//!                   +----- invalid -----+ (re-editable, errors per field)
//!                   +----- failed ------+ (store error, notice)
//! ```
//!
//! Confirmation is one atomic batch: register the market if it is new,
//! create or update the price record, remove the item. Every write in it is
//! safe to retry.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use shoplist_core::{
    CurrencyCode, ItemId, Market, NormalizedName, Price, PriceRule, PriceTrack,
    ProductPriceRecord, Purchase, PurchaseOutcome, ShoppingListItem,
};

use crate::db::{ItemRepository, MarketRepository, ProductRepository, RepositoryError};
use crate::live::PriceCache;
use crate::services::markets::MarketDirectory;
use crate::store::DocumentStore;

/// Raw dialog input, as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchaseForm {
    pub price: String,
    /// Selected existing market (normalized name), empty if none.
    pub market: String,
    /// Name typed into the "new market" field.
    pub new_market: String,
    pub promo: bool,
}

/// Validation messages per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub price: Option<String>,
    pub market: Option<String>,
}

impl FieldErrors {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.price.is_none() && self.market.is_none()
    }
}

/// A validated form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPurchase {
    pub purchase: Purchase,
    /// Whether the market came from the "new market" field.
    pub new_market: bool,
}

impl PurchaseForm {
    /// Pre-fill the form from the cached record.
    ///
    /// Promotion is pre-checked when only a promo price is known; the price
    /// field shows the best price of the pre-selected track.
    #[must_use]
    pub fn prefill(record: Option<&ProductPriceRecord>) -> Self {
        let Some(record) = record else {
            return Self::default();
        };
        let promo = record.best_regular.is_none() && record.best_promo.is_some();
        let best = record.best(PriceTrack::from_promo(promo));
        Self {
            price: best.map(|b| b.price.to_string()).unwrap_or_default(),
            market: best.map(|b| b.market.as_str().to_string()).unwrap_or_default(),
            new_market: String::new(),
            promo,
        }
    }

    /// Validate the form. Nothing is mutated either way.
    ///
    /// # Errors
    ///
    /// Returns the per-field messages when the price or market is invalid.
    pub fn validate(&self) -> Result<ValidPurchase, FieldErrors> {
        let mut errors = FieldErrors::default();

        let price = Price::parse(&self.price)
            .map_err(|e| errors.price = Some(capitalize(&e.to_string())))
            .ok();

        let market = if self.new_market.trim().is_empty() {
            NormalizedName::parse(&self.market).ok().map(|m| (m, false))
        } else {
            match NormalizedName::parse(&self.new_market) {
                Ok(m) => Some((m, true)),
                Err(e) => {
                    errors.market = Some(capitalize(&e.to_string()));
                    None
                }
            }
        };
        if market.is_none() && errors.market.is_none() {
            errors.market = Some("Select a market or enter a new one".to_string());
        }

        match (price, market) {
            (Some(price), Some((market, new_market))) => Ok(ValidPurchase {
                purchase: Purchase {
                    price,
                    market,
                    track: PriceTrack::from_promo(self.promo),
                },
                new_market,
            }),
            _ => Err(errors),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// An open dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDialog {
    pub item_id: ItemId,
    pub item_name: NormalizedName,
    pub form: PurchaseForm,
    pub errors: FieldErrors,
    /// Notice from a failed submission.
    pub notice: Option<String>,
    pub markets: Arc<Vec<Market>>,
}

/// Dialog state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DialogState {
    #[default]
    Closed,
    Open(OpenDialog),
    Submitting(OpenDialog),
}

/// Errors of a dialog transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DialogError {
    #[error("the dialog is not open")]
    NotOpen,
    #[error("the dialog is already submitting")]
    AlreadySubmitting,
}

impl DialogState {
    /// Open for an item, pre-filled from the cached price history.
    #[must_use]
    pub fn open(item: &ShoppingListItem, prices: &PriceCache, markets: Arc<Vec<Market>>) -> Self {
        Self::Open(OpenDialog {
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            form: PurchaseForm::prefill(prices.get(&item.name)),
            errors: FieldErrors::default(),
            notice: None,
            markets,
        })
    }

    /// Reopen with submitted input, as a stateless request handler does.
    #[must_use]
    pub fn with_form(item: &ShoppingListItem, form: PurchaseForm, markets: Arc<Vec<Market>>) -> Self {
        Self::Open(OpenDialog {
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            form,
            errors: FieldErrors::default(),
            notice: None,
            markets,
        })
    }

    /// Validate and move to `Submitting`. Invalid input keeps the dialog
    /// open with per-field errors and returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `DialogError` when the dialog is closed or already submitting.
    pub fn submit(&mut self) -> Result<Option<ValidPurchase>, DialogError> {
        match std::mem::take(self) {
            Self::Open(mut dialog) => match dialog.form.validate() {
                Ok(valid) => {
                    dialog.errors = FieldErrors::default();
                    dialog.notice = None;
                    *self = Self::Submitting(dialog);
                    Ok(Some(valid))
                }
                Err(errors) => {
                    dialog.errors = errors;
                    *self = Self::Open(dialog);
                    Ok(None)
                }
            },
            Self::Closed => Err(DialogError::NotOpen),
            submitting @ Self::Submitting(_) => {
                *self = submitting;
                Err(DialogError::AlreadySubmitting)
            }
        }
    }

    /// Close after a successful confirmation.
    pub fn succeed(&mut self) {
        *self = Self::Closed;
    }

    /// Return to `Open` with a notice after a failed confirmation.
    pub fn fail(&mut self, notice: impl Into<String>) {
        if let Self::Submitting(mut dialog) = std::mem::take(self) {
            dialog.notice = Some(notice.into());
            *self = Self::Open(dialog);
        }
    }

    pub fn cancel(&mut self) {
        *self = Self::Closed;
    }

    #[must_use]
    pub const fn dialog(&self) -> Option<&OpenDialog> {
        match self {
            Self::Open(dialog) | Self::Submitting(dialog) => Some(dialog),
            Self::Closed => None,
        }
    }
}

/// Errors from confirming a purchase.
#[derive(Debug, Error)]
pub enum PurchaseError {
    /// The item is no longer on the list.
    #[error("item not found")]
    ItemNotFound,

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of a confirmed purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub product: NormalizedName,
    pub purchase: Purchase,
    pub outcome: PurchaseOutcome,
    pub market_created: bool,
}

impl Receipt {
    /// Message shown after the purchase.
    #[must_use]
    pub fn notice(&self, currency: CurrencyCode) -> String {
        match &self.outcome {
            PurchaseOutcome::NewBest { track, .. } => format!(
                "New best price! The best {}price of {} is now {} at {}.",
                if track.is_promo() { "promo " } else { "" },
                self.product.display_name(),
                self.purchase.price.display(currency),
                self.purchase.market.display_name(),
            ),
            PurchaseOutcome::Unchanged { best, .. } => format!(
                "Purchase recorded, but the best price is still {} at {}.",
                best.price.display(currency),
                best.market.display_name(),
            ),
        }
    }
}

/// Confirms purchases against the store.
#[derive(Clone)]
pub struct PurchaseService {
    store: Arc<dyn DocumentStore>,
    markets: MarketDirectory,
    rule: PriceRule,
}

impl PurchaseService {
    #[must_use]
    pub const fn new(store: Arc<dyn DocumentStore>, markets: MarketDirectory, rule: PriceRule) -> Self {
        Self {
            store,
            markets,
            rule,
        }
    }

    #[must_use]
    pub const fn markets(&self) -> &MarketDirectory {
        &self.markets
    }

    /// Look up the item a dialog is for.
    ///
    /// # Errors
    ///
    /// Returns `PurchaseError::ItemNotFound` if it left the list.
    pub async fn item(&self, id: &ItemId) -> Result<ShoppingListItem, PurchaseError> {
        ItemRepository::new(self.store.as_ref())
            .get(id)
            .await?
            .ok_or(PurchaseError::ItemNotFound)
    }

    /// Record the purchase and remove the item, in one batch.
    ///
    /// The price record is read from the store rather than the cache so the
    /// comparison sees the latest committed best price.
    ///
    /// # Errors
    ///
    /// Returns `PurchaseError::ItemNotFound` if the item left the list, and
    /// `PurchaseError::Repository` if a read or the batch fails. Nothing is
    /// written in either case.
    #[instrument(skip(self, valid), fields(item = %item_id))]
    pub async fn confirm(&self, item_id: &ItemId, valid: &ValidPurchase) -> Result<Receipt, PurchaseError> {
        let store = self.store.as_ref();
        let item = self.item(item_id).await?;
        let purchase = valid.purchase.clone();

        let mut writes = Vec::with_capacity(3);

        let market_created = valid.new_market && !self.markets.exists(&purchase.market).await?;
        if market_created {
            writes.push(MarketRepository::create_write(&purchase.market).1);
        }

        let products = ProductRepository::new(store);
        let (mut record, stored) = match products.find_by_name(&item.name).await? {
            Some(record) => (record, true),
            None => (ProductRepository::new_record(item.name.clone()), false),
        };
        let outcome = record.apply(&purchase, self.rule);
        writes.push(ProductRepository::purchase_write(&record, &outcome, stored));
        writes.push(ItemRepository::delete_write(&item.id));

        store.commit(writes).await.map_err(RepositoryError::from)?;

        if market_created {
            self.markets.invalidate().await;
        }

        info!(
            product = %item.name,
            price = %purchase.price,
            market = %purchase.market,
            new_best = outcome.is_new_best(),
            "Purchase recorded"
        );

        Ok(Receipt {
            product: item.name,
            purchase,
            outcome,
            market_created,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use shoplist_core::{BestPrice, ProductId};

    use super::*;
    use crate::store::{Collection, MemoryStore, Operation};

    fn name(s: &str) -> NormalizedName {
        NormalizedName::parse(s).unwrap()
    }

    fn form(price: &str, market: &str, new_market: &str, promo: bool) -> PurchaseForm {
        PurchaseForm {
            price: price.into(),
            market: market.into(),
            new_market: new_market.into(),
            promo,
        }
    }

    fn service(store: &MemoryStore) -> PurchaseService {
        let store: Arc<dyn DocumentStore> = Arc::new(store.clone());
        PurchaseService::new(
            Arc::clone(&store),
            MarketDirectory::new(store, Duration::from_secs(30)),
            PriceRule::Strict,
        )
    }

    async fn buy(store: &MemoryStore, product: &str, f: PurchaseForm) -> Receipt {
        let id = ItemRepository::new(store).add(&name(product)).await.unwrap();
        service(store)
            .confirm(&id, &f.validate().unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_validation_reports_each_field() {
        let errors = form("abc", "", "", false).validate().unwrap_err();
        assert!(errors.price.is_some());
        assert!(errors.market.is_some());

        let errors = form("0", "storea", "", false).validate().unwrap_err();
        assert!(errors.price.is_some());
        assert!(errors.market.is_none());

        let valid = form("3,50", "storea", "", true).validate().unwrap();
        assert_eq!(valid.purchase.price, Price::parse("3.50").unwrap());
        assert_eq!(valid.purchase.track, PriceTrack::Promotional);
        assert!(!valid.new_market);
    }

    #[test]
    fn test_new_market_wins_over_selection() {
        let valid = form("2", "storea", "  Store  C ", false).validate().unwrap();
        assert_eq!(valid.purchase.market.as_str(), "store c");
        assert!(valid.new_market);
    }

    #[test]
    fn test_prefill_prefers_regular_track() {
        let mut record = ProductPriceRecord::empty(ProductId::new("p"), name("milk"));
        record.best_promo = Some(BestPrice {
            price: Price::parse("2.50").unwrap(),
            market: name("storeb"),
        });
        let prefilled = PurchaseForm::prefill(Some(&record));
        assert!(prefilled.promo);
        assert_eq!(prefilled.price, "2.50");

        record.best_regular = Some(BestPrice {
            price: Price::parse("3.10").unwrap(),
            market: name("storea"),
        });
        let prefilled = PurchaseForm::prefill(Some(&record));
        assert!(!prefilled.promo);
        assert_eq!(prefilled.market, "storea");
        assert_eq!(PurchaseForm::prefill(None), PurchaseForm::default());
    }

    #[test]
    fn test_state_machine_transitions() {
        let item = ShoppingListItem {
            id: ItemId::new("i"),
            name: name("milk"),
            created_at: Utc::now(),
        };
        let mut state = DialogState::Closed;
        assert_eq!(state.submit(), Err(DialogError::NotOpen));

        state = DialogState::open(&item, &PriceCache::default(), Arc::new(Vec::new()));
        assert_eq!(state.submit(), Ok(None));
        assert!(matches!(&state, DialogState::Open(d) if !d.errors.is_empty()));

        if let DialogState::Open(dialog) = &mut state {
            dialog.form = form("3.50", "storea", "", false);
        }
        assert!(state.submit().unwrap().is_some());
        assert!(matches!(state, DialogState::Submitting(_)));
        assert_eq!(state.submit(), Err(DialogError::AlreadySubmitting));

        state.fail("Could not save");
        let dialog = state.dialog().unwrap();
        assert_eq!(dialog.notice.as_deref(), Some("Could not save"));
        assert_eq!(dialog.form.price, "3.50");

        state.submit().unwrap();
        state.succeed();
        assert_eq!(state, DialogState::Closed);

        state = DialogState::open(&item, &PriceCache::default(), Arc::new(Vec::new()));
        state.cancel();
        assert!(state.dialog().is_none());
    }

    #[tokio::test]
    async fn test_best_price_sequence() {
        let store = MemoryStore::new();

        let first = buy(&store, "Milk", form("3.50", "", "StoreA", false)).await;
        assert!(first.outcome.is_new_best());
        assert!(first.market_created);

        let second = buy(&store, "milk", form("2.99", "", "StoreB", false)).await;
        assert!(second.outcome.is_new_best());
        assert_eq!(
            second.notice(CurrencyCode::BRL),
            "New best price! The best price of Milk is now R$ 2.99 at Storeb."
        );

        let third = buy(&store, "milk", form("4.00", "storea", "", false)).await;
        assert!(!third.outcome.is_new_best());
        assert_eq!(
            third.notice(CurrencyCode::BRL),
            "Purchase recorded, but the best price is still R$ 2.99 at Storeb."
        );

        let record = ProductRepository::new(&store)
            .find_by_name(&name("milk"))
            .await
            .unwrap()
            .unwrap();
        let best = record.best_regular.unwrap();
        assert_eq!(best.price, Price::parse("2.99").unwrap());
        assert_eq!(best.market.as_str(), "storeb");
        assert!(record.best_promo.is_none());

        assert_eq!(store.document_count(Collection::ShoppingList), 0);
        assert_eq!(store.document_count(Collection::Products), 1);
        assert_eq!(store.document_count(Collection::Markets), 2);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let store = MemoryStore::new();
        let id = ItemRepository::new(&store).add(&name("eggs")).await.unwrap();
        store.fail_next(Operation::Delete, 1);

        let valid = form("10", "", "StoreA", false).validate().unwrap();
        let result = service(&store).confirm(&id, &valid).await;
        assert!(matches!(result, Err(PurchaseError::Repository(_))));

        assert_eq!(store.document_count(Collection::ShoppingList), 1);
        assert_eq!(store.document_count(Collection::Products), 0);
        assert_eq!(store.document_count(Collection::Markets), 0);

        // retry succeeds
        service(&store).confirm(&id, &valid).await.unwrap();
        assert_eq!(store.document_count(Collection::ShoppingList), 0);
    }

    #[tokio::test]
    async fn test_confirm_missing_item() {
        let store = MemoryStore::new();
        let valid = form("1", "storea", "", false).validate().unwrap();
        let result = service(&store).confirm(&ItemId::new("gone"), &valid).await;
        assert!(matches!(result, Err(PurchaseError::ItemNotFound)));
    }
}
