//! In-process document store.
//!
//! Used for local runs and tests. Behaves like the hosted store where it
//! matters to the application:
//!
//! - batches are atomic: either every write applies or none does
//! - server timestamps strictly increase, even within one clock tick
//! - listeners receive a full snapshot synchronously after every commit that
//!   touches their collection
//!
//! With a data file, the whole store is written as JSON after every commit.
//! Failures can be injected per operation with [`MemoryStore::fail_next`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    Collection, Document, DocumentId, DocumentStore, FieldValue, Fields, Operation, Query,
    Snapshot, SnapshotEvent, StoreError, StoreResult, Subscription, Unsubscribe, Write,
};

type CollectionMap = HashMap<Collection, BTreeMap<DocumentId, StoredDocument>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    fields: Fields,
    update_time: DateTime<Utc>,
}

impl StoredDocument {
    fn to_document(&self, id: &DocumentId) -> Document {
        Document {
            id: id.clone(),
            fields: self.fields.clone(),
            update_time: Some(self.update_time),
        }
    }
}

struct Listener {
    query: Query,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
}

#[derive(Default)]
struct MemoryInner {
    collections: CollectionMap,
    listeners: HashMap<u64, Listener>,
    next_listener_id: u64,
    last_timestamp: Option<DateTime<Utc>>,
    failures: HashMap<Operation, usize>,
    data_file: Option<PathBuf>,
}

impl MemoryInner {
    /// Consume one injected failure for `operation`, if any.
    fn take_failure(&mut self, operation: Operation) -> StoreResult<()> {
        match self.failures.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Unavailable(format!(
                    "injected failure for {operation:?}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Next server timestamp, strictly after the previous one.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn snapshot(&self, query: &Query) -> Snapshot {
        let documents = self
            .collections
            .get(&query.collection)
            .into_iter()
            .flat_map(|docs| docs.iter().map(|(id, doc)| doc.to_document(id)));
        query.evaluate(documents)
    }

    /// Send fresh snapshots to listeners of the touched collections, dropping
    /// listeners whose receiver is gone.
    fn notify(&mut self, touched: &[Collection]) {
        let mut closed = Vec::new();
        for (id, listener) in &self.listeners {
            if !touched.contains(&listener.query.collection) {
                continue;
            }
            let snapshot = self.snapshot(&listener.query);
            if listener.tx.send(Ok(snapshot)).is_err() {
                closed.push(*id);
            }
        }
        for id in closed {
            debug!(listener = id, "Dropping closed listener");
            self.listeners.remove(&id);
        }
    }
}

/// Resolve server timestamp sentinels.
fn resolve_fields(fields: Fields, now: DateTime<Utc>) -> Fields {
    fields
        .into_iter()
        .map(|(name, value)| match value {
            FieldValue::ServerTimestamp => (name, FieldValue::Timestamp(now)),
            other => (name, other),
        })
        .collect()
}

/// Apply a batch to a staged copy of the collections.
fn apply_writes(
    staged: &mut CollectionMap,
    writes: Vec<Write>,
    now: DateTime<Utc>,
) -> StoreResult<Vec<Collection>> {
    let mut touched = Vec::new();
    for write in writes {
        let collection = write.collection();
        if !touched.contains(&collection) {
            touched.push(collection);
        }
        let docs = staged.entry(collection).or_default();
        match write {
            Write::Create { id, fields, .. } => {
                if docs.contains_key(&id) {
                    return Err(StoreError::AlreadyExists { collection, id });
                }
                docs.insert(
                    id,
                    StoredDocument {
                        fields: resolve_fields(fields, now),
                        update_time: now,
                    },
                );
            }
            Write::Update { id, fields, .. } => {
                let Some(doc) = docs.get_mut(&id) else {
                    return Err(StoreError::NotFound { collection, id });
                };
                doc.fields.extend(resolve_fields(fields, now));
                doc.update_time = now;
            }
            Write::Delete { id, .. } => {
                docs.remove(&id);
            }
        }
    }
    Ok(touched)
}

fn persist(path: &Path, collections: &CollectionMap) -> StoreResult<()> {
    let json = serde_json::to_vec_pretty(collections)
        .map_err(|e| StoreError::Persistence(format!("failed to serialize store: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| StoreError::Persistence(format!("failed to write {}: {e}", path.display())))
}

/// In-process [`DocumentStore`].
///
/// Cheaply cloneable; clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    /// Create an empty, non-persistent store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store persisted to `path`, loading it if the file exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the file exists but cannot be
    /// read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let collections = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                StoreError::Persistence(format!("failed to read {}: {e}", path.display()))
            })?;
            serde_json::from_str::<CollectionMap>(&raw).map_err(|e| {
                StoreError::Persistence(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            CollectionMap::new()
        };

        let last_timestamp = collections
            .values()
            .flat_map(BTreeMap::values)
            .map(|doc| doc.update_time)
            .max();

        Ok(Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                collections,
                last_timestamp,
                data_file: Some(path),
                ..MemoryInner::default()
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `times` calls of `operation` fail with
    /// `StoreError::Unavailable`, emulating an outage.
    ///
    /// A batch fails if any of its writes hits an injected failure.
    pub fn fail_next(&self, operation: Operation, times: usize) {
        *self.lock().failures.entry(operation).or_insert(0) += times;
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn document_count(&self, collection: Collection) -> usize {
        self.lock()
            .collections
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    fn remove_listener(inner: &Weak<Mutex<MemoryInner>>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.listeners.remove(&id).is_some() {
                debug!(listener = id, "Listener unsubscribed");
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut inner = self.lock();
        for write in &writes {
            inner.take_failure(write.operation())?;
        }

        let now = inner.next_timestamp();
        let mut staged = inner.collections.clone();
        let touched = apply_writes(&mut staged, writes, now)?;

        if let Some(path) = &inner.data_file {
            persist(path, &staged)?;
        }

        inner.collections = staged;
        inner.notify(&touched);
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &DocumentId) -> StoreResult<Option<Document>> {
        let mut inner = self.lock();
        inner.take_failure(Operation::Get)?;
        Ok(inner
            .collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .map(|doc| doc.to_document(id)))
    }

    async fn query(&self, query: &Query) -> StoreResult<Snapshot> {
        let mut inner = self.lock();
        inner.take_failure(Operation::Query)?;
        Ok(inner.snapshot(query))
    }

    async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
        let mut inner = self.lock();
        inner.take_failure(Operation::Subscribe)?;

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(Ok(inner.snapshot(&query))).is_err() {
            warn!("Subscription receiver dropped before the first snapshot");
        }

        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        debug!(listener = id, collection = %query.collection, "Listener subscribed");
        inner.listeners.insert(id, Listener { query, tx });

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(
            rx,
            Unsubscribe::new(move || Self::remove_listener(&weak, id)),
        ))
    }
}
