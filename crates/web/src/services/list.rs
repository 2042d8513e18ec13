//! List controller: adds, removals and recovery of the shopping list.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use shoplist_core::{ItemId, ListOrder, NameError, NormalizedName};

use crate::db::{ItemRepository, ProductRepository, RepositoryError, decode_lenient};
use crate::live::{Claim, SyncEngine};
use crate::store::DocumentStore;

/// Errors from list operations.
#[derive(Debug, Error)]
pub enum ListError {
    /// The name cannot be used (too long).
    #[error("invalid name: {0}")]
    InvalidName(NameError),

    /// The product is already on the list or being added.
    #[error("{} is already on the list", .0.display_name())]
    Duplicate(NormalizedName),

    /// Store or decoding failure.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of an add request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { id: ItemId, name: NormalizedName },
    /// Blank input, or a history re-add of a name already on its way.
    Ignored,
}

/// What [`reconcile`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Items whose purchase was recorded but whose removal never landed.
    pub purchased: Vec<ItemId>,
    /// Extra items sharing a name with an older item.
    pub duplicates: Vec<ItemId>,
}

impl ReconcileReport {
    #[must_use]
    pub fn removed(&self) -> usize {
        self.purchased.len() + self.duplicates.len()
    }
}

/// Parse user input. Blank input is `None`.
fn parse_input(raw: &str) -> Result<Option<NormalizedName>, ListError> {
    match NormalizedName::parse(raw) {
        Ok(name) => Ok(Some(name)),
        Err(NameError::Empty) => Ok(None),
        Err(e) => Err(ListError::InvalidName(e)),
    }
}

/// Repair the list after interrupted writes.
///
/// Removes, in one batch:
/// - items whose product record was purchased after the item was created
/// - all but the oldest item of each name
///
/// Documents that do not decode are skipped and left in place.
///
/// # Errors
///
/// Returns `RepositoryError` if reading or the batch delete fails.
#[instrument(skip(store))]
pub async fn reconcile(store: &dyn DocumentStore) -> Result<ReconcileReport, RepositoryError> {
    let items = decode_lenient(
        &store
            .query(&ItemRepository::list_query(ListOrder::OldestFirst))
            .await?,
        ItemRepository::from_document,
    );
    let purchased_at: BTreeMap<NormalizedName, DateTime<Utc>> = decode_lenient(
        &store.query(&ProductRepository::history_query()).await?,
        ProductRepository::from_document,
    )
    .into_iter()
    .filter_map(|record| record.last_purchased_at.map(|at| (record.name, at)))
    .collect();

    let mut report = ReconcileReport::default();
    let mut seen: HashSet<NormalizedName> = HashSet::new();
    for item in items {
        if purchased_at
            .get(&item.name)
            .is_some_and(|at| *at > item.created_at)
        {
            report.purchased.push(item.id);
        } else if !seen.insert(item.name) {
            report.duplicates.push(item.id);
        }
    }

    if report.removed() > 0 {
        let ids: Vec<ItemId> = report
            .purchased
            .iter()
            .chain(&report.duplicates)
            .cloned()
            .collect();
        ItemRepository::new(store).delete_many(&ids).await?;
        warn!(
            purchased = report.purchased.len(),
            duplicates = report.duplicates.len(),
            "Removed leftover list items"
        );
    }
    Ok(report)
}

/// Mutations of the shopping list.
///
/// Duplicate prevention reads the sync engine's active set and claims the
/// name in its pending set for the duration of the write.
#[derive(Clone)]
pub struct ListController {
    sync: SyncEngine,
}

impl ListController {
    #[must_use]
    pub const fn new(sync: SyncEngine) -> Self {
        Self { sync }
    }

    fn store(&self) -> &dyn DocumentStore {
        self.sync.store().as_ref()
    }

    /// Write a claimed name, releasing the claim if the write fails.
    async fn create_claimed(&self, name: NormalizedName) -> Result<AddOutcome, ListError> {
        match ItemRepository::new(self.store()).add(&name).await {
            Ok(id) => {
                self.sync.mark_written(&name);
                info!(item = %id, name = %name, "Item added");
                Ok(AddOutcome::Added { id, name })
            }
            Err(e) => {
                self.sync.release(&name);
                Err(e.into())
            }
        }
    }

    /// Add an item typed by the user.
    ///
    /// # Errors
    ///
    /// Returns `ListError::Duplicate` if the name is on the list or being
    /// added, `ListError::InvalidName` if it is too long, and
    /// `ListError::Repository` if the write fails.
    #[instrument(skip(self))]
    pub async fn add_item(&self, raw: &str) -> Result<AddOutcome, ListError> {
        let Some(name) = parse_input(raw)? else {
            return Ok(AddOutcome::Ignored);
        };
        match self.sync.claim(&name) {
            Claim::Claimed => self.create_claimed(name).await,
            Claim::AlreadyActive | Claim::AlreadyPending => Err(ListError::Duplicate(name)),
        }
    }

    /// Put a product from the history panel back on the list.
    ///
    /// A name that is already active or pending is ignored, so repeated
    /// clicks add it once.
    ///
    /// # Errors
    ///
    /// Returns `ListError::Repository` if the write fails.
    #[instrument(skip(self))]
    pub async fn re_add_from_history(&self, raw: &str) -> Result<AddOutcome, ListError> {
        let Some(name) = parse_input(raw)? else {
            return Ok(AddOutcome::Ignored);
        };
        match self.sync.claim(&name) {
            Claim::Claimed => self.create_claimed(name).await,
            Claim::AlreadyActive | Claim::AlreadyPending => Ok(AddOutcome::Ignored),
        }
    }

    /// Remove an item. Removing a missing item succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ListError::Repository` if the write fails.
    #[instrument(skip(self), fields(item = %id))]
    pub async fn delete_item(&self, id: &ItemId) -> Result<(), ListError> {
        ItemRepository::new(self.store()).delete(id).await?;
        Ok(())
    }

    /// Repair the list. See [`reconcile`].
    ///
    /// # Errors
    ///
    /// Returns `ListError::Repository` if reading or deleting fails.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ListError> {
        Ok(reconcile(self.store()).await?)
    }

    /// Change the list ordering.
    ///
    /// # Errors
    ///
    /// Returns `ListError::Repository` if the new subscription fails.
    pub async fn set_order(&self, order: ListOrder) -> Result<(), ListError> {
        if order == self.sync.order() {
            return Ok(());
        }
        self.sync
            .resubscribe_list(order)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use shoplist_core::{Price, PriceRule, PriceTrack, Purchase};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::db::fields;
    use crate::store::{
        Collection, Document, DocumentId, FieldValue, Fields, MemoryStore, Operation, Query,
        Snapshot, SnapshotEvent, StoreResult, Subscription, Unsubscribe, Write,
    };

    /// Memory store whose list feed delivers only the snapshots a test
    /// pushes, like a polling backend that coalesces changes.
    #[derive(Clone, Default)]
    struct CoalescingStore {
        inner: MemoryStore,
        list_feed: Arc<std::sync::Mutex<Option<mpsc::UnboundedSender<SnapshotEvent>>>>,
    }

    impl CoalescingStore {
        fn push(&self, snapshot: Snapshot) {
            let feed = self.list_feed.lock().unwrap();
            feed.as_ref().unwrap().send(Ok(snapshot)).unwrap();
        }
    }

    #[async_trait]
    impl DocumentStore for CoalescingStore {
        async fn commit(&self, writes: Vec<Write>) -> StoreResult<()> {
            self.inner.commit(writes).await
        }

        async fn get(
            &self,
            collection: Collection,
            id: &DocumentId,
        ) -> StoreResult<Option<Document>> {
            self.inner.get(collection, id).await
        }

        async fn query(&self, query: &Query) -> StoreResult<Snapshot> {
            self.inner.query(query).await
        }

        async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
            if query.collection != Collection::ShoppingList {
                return self.inner.subscribe(query).await;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *self.list_feed.lock().unwrap() = Some(tx);
            Ok(Subscription::new(rx, Unsubscribe::new(|| {})))
        }
    }

    fn name(s: &str) -> NormalizedName {
        NormalizedName::parse(s).unwrap()
    }

    async fn setup() -> (MemoryStore, SyncEngine, ListController) {
        let store = MemoryStore::new();
        let sync = SyncEngine::start(Arc::new(store.clone()), ListOrder::OldestFirst)
            .await
            .unwrap();
        let controller = ListController::new(sync.clone());
        (store, sync, controller)
    }

    async fn settle(sync: &SyncEngine, product: &str) {
        let product = name(product);
        tokio::time::timeout(Duration::from_secs(2), sync.wait_for(|v| v.lists(&product)))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_names() {
        let (store, sync, controller) = setup().await;

        let outcome = controller.add_item("Milk").await.unwrap();
        assert!(matches!(outcome, AddOutcome::Added { .. }));

        // still pending
        assert!(matches!(
            controller.add_item("milk").await,
            Err(ListError::Duplicate(_))
        ));

        settle(&sync, "milk").await;
        // now active
        assert!(matches!(
            controller.add_item("  MILK ").await,
            Err(ListError::Duplicate(_))
        ));
        assert_eq!(store.document_count(Collection::ShoppingList), 1);
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let (store, sync, controller) = setup().await;
        assert_eq!(controller.add_item("   ").await.unwrap(), AddOutcome::Ignored);
        assert!(matches!(
            controller.add_item(&"x".repeat(200)).await,
            Err(ListError::InvalidName(_))
        ));
        assert_eq!(store.document_count(Collection::ShoppingList), 0);
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_add_releases_claim() {
        let (store, sync, controller) = setup().await;
        store.fail_next(Operation::Create, 1);

        assert!(matches!(
            controller.add_item("bread").await,
            Err(ListError::Repository(_))
        ));
        assert!(sync.pending().is_empty());

        // retry works
        controller.add_item("bread").await.unwrap();
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_claim_settles_when_item_is_removed_unseen() {
        let store = CoalescingStore::default();
        let sync = SyncEngine::start(Arc::new(store.clone()), ListOrder::OldestFirst)
            .await
            .unwrap();
        let controller = ListController::new(sync.clone());

        let AddOutcome::Added { id, .. } = controller.add_item("milk").await.unwrap() else {
            panic!("milk was not added");
        };
        // removed from another tab before the feed reported it
        controller.delete_item(&id).await.unwrap();
        assert!(sync.pending().contains(&name("milk")));

        store.push(Snapshot::new(Vec::new()));
        tokio::time::timeout(Duration::from_secs(2), async {
            while !sync.pending().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let milk = name("milk");
        assert!(!sync.active().contains(&milk));
        assert!(matches!(
            controller.add_item("milk").await.unwrap(),
            AddOutcome::Added { .. }
        ));
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_re_add_ignores_repeated_clicks() {
        let (store, sync, controller) = setup().await;

        let first = controller.re_add_from_history("rice").await.unwrap();
        let second = controller.re_add_from_history("rice").await.unwrap();
        assert!(matches!(first, AddOutcome::Added { .. }));
        assert_eq!(second, AddOutcome::Ignored);
        assert_eq!(store.document_count(Collection::ShoppingList), 1);
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconcile_removes_purchased_and_duplicate_items() {
        let store = MemoryStore::new();
        let items = ItemRepository::new(&store);

        // "milk" added, then purchased, but the removal never landed
        let stale = items.add(&name("milk")).await.unwrap();
        let mut record = ProductRepository::new_record(name("milk"));
        let outcome = record.apply(
            &Purchase {
                price: Price::parse("3.50").unwrap(),
                market: name("storea"),
                track: PriceTrack::Regular,
            },
            PriceRule::Strict,
        );
        store
            .commit(vec![ProductRepository::purchase_write(&record, &outcome, false)])
            .await
            .unwrap();

        // re-added after the purchase: stays
        let fresh = items.add(&name("milk")).await.unwrap();
        // duplicate written by a second client
        let eggs = items.add(&name("eggs")).await.unwrap();
        let eggs_again = items.add(&name("eggs")).await.unwrap();

        let report = reconcile(&store).await.unwrap();
        assert_eq!(report.purchased, vec![stale]);
        assert_eq!(report.duplicates, vec![eggs_again]);

        let left: Vec<ItemId> = items
            .list(ListOrder::OldestFirst)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(left, vec![fresh, eggs]);

        // second run finds nothing
        assert_eq!(reconcile(&store).await.unwrap().removed(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_skips_undecodable_documents() {
        let store = MemoryStore::new();
        let mut blank = Fields::new();
        blank.insert(fields::NAME.into(), FieldValue::from("   "));
        blank.insert(fields::CREATED_AT.into(), FieldValue::ServerTimestamp);
        store.create(Collection::ShoppingList, blank).await.unwrap();

        let items = ItemRepository::new(&store);
        items.add(&name("tea")).await.unwrap();
        let extra = items.add(&name("tea")).await.unwrap();

        let report = reconcile(&store).await.unwrap();
        assert_eq!(report.duplicates, vec![extra]);
        assert_eq!(store.document_count(Collection::ShoppingList), 2);
    }

    #[tokio::test]
    async fn test_set_order_resubscribes_once() {
        let (store, sync, controller) = setup().await;
        controller.set_order(ListOrder::NewestFirst).await.unwrap();
        controller.set_order(ListOrder::NewestFirst).await.unwrap();
        assert_eq!(sync.order(), ListOrder::NewestFirst);
        assert_eq!(store.listener_count(), 2);
        sync.shutdown().await;
    }
}
