//! Sync engine: owns the standing subscriptions and the state cells.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use shoplist_core::{ListOrder, NormalizedName, PriceHint};

use super::cells::{ActiveItems, Claim, PendingAdds, PriceCache};
use super::view::{LiveView, ViewInputs};
use crate::db::{ItemRepository, ProductRepository, decode_lenient};
use crate::store::{DocumentStore, Snapshot, StoreResult, Subscription, Unsubscribe};

/// Which standing subscription an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedKind {
    List,
    Prices,
}

/// Last error per feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct FeedErrors {
    list: Option<String>,
    prices: Option<String>,
}

impl FeedErrors {
    fn slot(&mut self, kind: FeedKind) -> &mut Option<String> {
        match kind {
            FeedKind::List => &mut self.list,
            FeedKind::Prices => &mut self.prices,
        }
    }

    fn first(&self) -> Option<&str> {
        self.list.as_deref().or(self.prices.as_deref())
    }
}

/// Input cells of the derived view.
struct Cells {
    prices: watch::Sender<Arc<PriceCache>>,
    active: watch::Sender<Arc<ActiveItems>>,
    pending: watch::Sender<PendingAdds>,
    order: watch::Sender<ListOrder>,
    errors: watch::Sender<FeedErrors>,
}

impl Cells {
    fn new() -> Self {
        Self {
            prices: watch::channel(Arc::new(PriceCache::default())).0,
            active: watch::channel(Arc::new(ActiveItems::default())).0,
            pending: watch::channel(PendingAdds::new()).0,
            order: watch::channel(ListOrder::default()).0,
            errors: watch::channel(FeedErrors::default()).0,
        }
    }

    fn apply(&self, kind: FeedKind, snapshot: &Snapshot) {
        match kind {
            FeedKind::List => {
                let items = decode_lenient(snapshot, ItemRepository::from_document);
                let active = Arc::new(ActiveItems::new(items));
                self.active.send_replace(Arc::clone(&active));
                self.pending.send_if_modified(|pending| pending.settle(&active));
            }
            FeedKind::Prices => {
                let records = decode_lenient(snapshot, ProductRepository::from_document);
                self.prices
                    .send_replace(Arc::new(PriceCache::from_records(records)));
            }
        }
    }

    fn set_error(&self, kind: FeedKind, error: Option<String>) {
        self.errors.send_if_modified(|errors| {
            let slot = errors.slot(kind);
            if *slot == error {
                return false;
            }
            *slot = error;
            true
        });
    }
}

/// A running subscription and the task draining it.
struct Feed {
    unsubscribe: Unsubscribe,
    handle: JoinHandle<()>,
}

impl Feed {
    fn spawn(kind: FeedKind, subscription: Subscription, cells: Arc<Cells>) -> Self {
        let (mut events, unsubscribe) = subscription.into_parts();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    Ok(snapshot) => {
                        debug!(feed = ?kind, documents = snapshot.len(), "Snapshot received");
                        cells.apply(kind, &snapshot);
                        cells.set_error(kind, None);
                    }
                    Err(e) => {
                        warn!(feed = ?kind, error = %e, "Subscription error");
                        cells.set_error(kind, Some(e.to_string()));
                    }
                }
            }
            debug!(feed = ?kind, "Subscription ended");
        });
        Self {
            unsubscribe,
            handle,
        }
    }

    /// Unsubscribe first, then stop the task, so no further snapshot is
    /// applied by this feed.
    fn stop(self) {
        self.unsubscribe.unsubscribe();
        self.handle.abort();
    }
}

#[derive(Default)]
struct Tasks {
    list: Option<Feed>,
    prices: Option<Feed>,
    derive: Option<JoinHandle<()>>,
    stopped: bool,
}

/// Recompute the view whenever an input cell changes.
///
/// Each cell is read on its own so no two cell locks are held together.
async fn derive_views(cells: Arc<Cells>, view: watch::Sender<Arc<LiveView>>) {
    let mut prices = cells.prices.subscribe();
    let mut active = cells.active.subscribe();
    let mut pending = cells.pending.subscribe();
    let mut order = cells.order.subscribe();
    let mut errors = cells.errors.subscribe();
    drop(cells);

    let mut version = view.borrow().version;
    loop {
        let prices_now = Arc::clone(&*prices.borrow_and_update());
        let active_now = Arc::clone(&*active.borrow_and_update());
        let pending_now = pending.borrow_and_update().clone();
        let order_now = *order.borrow_and_update();
        let errors_now = errors.borrow_and_update().clone();

        version += 1;
        let next = LiveView::derive(
            version,
            &ViewInputs {
                prices: &prices_now,
                active: &active_now,
                pending: &pending_now,
                order: order_now,
                sync_error: errors_now.first(),
            },
        );
        view.send_replace(Arc::new(next));

        let changed = tokio::select! {
            r = prices.changed() => r,
            r = active.changed() => r,
            r = pending.changed() => r,
            r = order.changed() => r,
            r = errors.changed() => r,
        };
        if changed.is_err() {
            break;
        }
    }
}

/// Lifecycle object for live synchronization.
///
/// Built once by the entry point with [`SyncEngine::start`] and torn down
/// with [`SyncEngine::shutdown`]. Cheaply cloneable.
///
/// # Cells
///
/// - prices: name → best-known record, rebuilt from each history snapshot
/// - active: the list as of the latest list snapshot
/// - pending: names claimed by adds still in flight
/// - the derived [`LiveView`], recomputed whenever any of the above changes
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    store: Arc<dyn DocumentStore>,
    cells: Arc<Cells>,
    view: watch::Receiver<Arc<LiveView>>,
    tasks: Mutex<Tasks>,
}

impl SyncEngine {
    /// Subscribe to the price history and the list, and start deriving the
    /// view.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if either subscription cannot be established.
    /// Nothing is left running in that case.
    #[instrument(skip(store))]
    pub async fn start(store: Arc<dyn DocumentStore>, order: ListOrder) -> StoreResult<Self> {
        let cells = Arc::new(Cells::new());
        let (view_tx, view_rx) = watch::channel(Arc::new(LiveView::default()));
        let derive = tokio::spawn(derive_views(Arc::clone(&cells), view_tx));

        let engine = Self {
            inner: Arc::new(SyncInner {
                store,
                cells,
                view: view_rx,
                tasks: Mutex::new(Tasks {
                    derive: Some(derive),
                    ..Tasks::default()
                }),
            }),
        };

        if let Err(e) = engine.subscribe_prices().await {
            engine.shutdown().await;
            return Err(e);
        }
        if let Err(e) = engine.resubscribe_list(order).await {
            engine.shutdown().await;
            return Err(e);
        }

        info!(order = order.as_str(), "Sync engine started");
        Ok(engine)
    }

    async fn subscribe_prices(&self) -> StoreResult<()> {
        let mut tasks = self.inner.tasks.lock().await;
        if let Some(old) = tasks.prices.take() {
            old.stop();
        }
        let subscription = self
            .inner
            .store
            .subscribe(ProductRepository::history_query())
            .await?;
        tasks.prices = Some(Feed::spawn(
            FeedKind::Prices,
            subscription,
            Arc::clone(&self.inner.cells),
        ));
        Ok(())
    }

    /// Replace the list subscription with one in `order`.
    ///
    /// The previous subscription is cancelled and its task stopped before
    /// the new one is created, so exactly one feed drives the list.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the new subscription cannot be established.
    /// The list then stays at its last snapshot until the next call.
    #[instrument(skip(self))]
    pub async fn resubscribe_list(&self, order: ListOrder) -> StoreResult<()> {
        let mut tasks = self.inner.tasks.lock().await;
        if tasks.stopped {
            return Ok(());
        }
        if let Some(old) = tasks.list.take() {
            old.stop();
        }

        let subscription = self
            .inner
            .store
            .subscribe(ItemRepository::list_query(order))
            .await
            .inspect_err(|e| {
                self.inner
                    .cells
                    .set_error(FeedKind::List, Some(e.to_string()));
            })?;

        self.inner.cells.order.send_replace(order);
        tasks.list = Some(Feed::spawn(
            FeedKind::List,
            subscription,
            Arc::clone(&self.inner.cells),
        ));
        Ok(())
    }

    /// Stop both subscriptions and the derivation task. Idempotent.
    pub async fn shutdown(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        if tasks.stopped {
            return;
        }
        tasks.stopped = true;
        if let Some(feed) = tasks.list.take() {
            feed.stop();
        }
        if let Some(feed) = tasks.prices.take() {
            feed.stop();
        }
        if let Some(derive) = tasks.derive.take() {
            derive.abort();
        }
        info!("Sync engine stopped");
    }

    /// Whether [`shutdown`](Self::shutdown) has not been called yet.
    pub async fn is_running(&self) -> bool {
        !self.inner.tasks.lock().await.stopped
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    /// The latest derived view.
    #[must_use]
    pub fn view(&self) -> Arc<LiveView> {
        Arc::clone(&*self.inner.view.borrow())
    }

    /// A receiver notified on every view change.
    #[must_use]
    pub fn subscribe_view(&self) -> watch::Receiver<Arc<LiveView>> {
        self.inner.view.clone()
    }

    /// Wait until the view satisfies `predicate`.
    ///
    /// Returns `None` if the engine stopped first.
    pub async fn wait_for(&self, predicate: impl FnMut(&Arc<LiveView>) -> bool) -> Option<Arc<LiveView>> {
        let mut rx = self.inner.view.clone();
        rx.wait_for(predicate).await.ok().map(|view| Arc::clone(&*view))
    }

    #[must_use]
    pub fn prices(&self) -> Arc<PriceCache> {
        Arc::clone(&*self.inner.cells.prices.borrow())
    }

    #[must_use]
    pub fn active(&self) -> Arc<ActiveItems> {
        Arc::clone(&*self.inner.cells.active.borrow())
    }

    #[must_use]
    pub fn pending(&self) -> PendingAdds {
        self.inner.cells.pending.borrow().clone()
    }

    #[must_use]
    pub fn order(&self) -> ListOrder {
        *self.inner.cells.order.borrow()
    }

    /// Best-price hint from the cached history.
    #[must_use]
    pub fn best_price_hint(&self, name: &NormalizedName) -> PriceHint {
        self.prices().best_price_hint(name)
    }

    /// Claim `name` for an add unless it is active or already claimed.
    ///
    /// Check and insert happen under the pending cell's lock, so two
    /// concurrent claims of one name cannot both succeed.
    pub fn claim(&self, name: &NormalizedName) -> Claim {
        let mut claim = Claim::Claimed;
        self.inner.cells.pending.send_if_modified(|pending| {
            if pending.contains(name) {
                claim = Claim::AlreadyPending;
                return false;
            }
            if self.inner.cells.active.borrow().contains(name) {
                claim = Claim::AlreadyActive;
                return false;
            }
            pending.insert(name.clone());
            true
        });
        claim
    }

    /// Record that the add claiming `name` was written. The next list
    /// snapshot settles the claim.
    pub fn mark_written(&self, name: &NormalizedName) {
        // membership is unchanged, so the view needs no update
        self.inner.cells.pending.send_if_modified(|pending| {
            pending.mark_written(name);
            false
        });
    }

    /// Release a claim after a failed add.
    pub fn release(&self, name: &NormalizedName) {
        self.inner
            .cells
            .pending
            .send_if_modified(|pending| pending.remove(name));
    }
}
