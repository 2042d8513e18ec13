//! Document store facade.
//!
//! # Architecture
//!
//! - The store is schemaless: documents are ordered maps of [`FieldValue`]s
//!   living in one of three [`Collection`]s
//! - All writes go through [`DocumentStore::commit`], which applies a batch
//!   atomically; `create`/`update`/`delete` are single-write batches
//! - [`DocumentStore::subscribe`] delivers the full snapshot of a query
//!   first, then again after every change that affects it
//!
//! # Backends
//!
//! - [`MemoryStore`] - in-process store, optionally persisted to a JSON file
//! - [`FirestoreStore`] - Cloud Firestore REST client (subscriptions poll)
//!
//! # Example
//!
//! ```rust,ignore
//! use shoplist_web::store::{Collection, DocumentStore, FieldValue, Fields, MemoryStore, Query};
//!
//! let store = MemoryStore::new();
//! let mut fields = Fields::new();
//! fields.insert("name".into(), FieldValue::from("milk"));
//! fields.insert("createdAt".into(), FieldValue::ServerTimestamp);
//! let id = store.create(Collection::ShoppingList, fields).await?;
//!
//! let mut sub = store
//!     .subscribe(Query::collection(Collection::ShoppingList).order_by_asc("createdAt"))
//!     .await?;
//! let first = sub.next().await;
//! ```

pub mod firestore;
pub mod memory;
mod query;
mod value;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::StoreConfig;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use query::{Direction, Filter, Query};
pub use value::{FieldValue, Fields};

shoplist_core::define_id!(DocumentId);

impl DocumentId {
    /// Length of generated IDs.
    pub const GENERATED_LENGTH: usize = 20;

    /// Generate a random 20-character alphanumeric ID.
    ///
    /// IDs are chosen client side, the same way the hosted store's SDKs do,
    /// so a retried create carries the same ID.
    #[must_use]
    pub fn generate() -> Self {
        let id: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(Self::GENERATED_LENGTH)
            .map(char::from)
            .collect();
        Self(id)
    }
}

/// The three collections used by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    /// Active shopping-list items.
    #[serde(rename = "lista_atual")]
    ShoppingList,
    /// Product price history, one document per normalized name.
    #[serde(rename = "produtos")]
    Products,
    /// Market directory.
    #[serde(rename = "mercados")]
    Markets,
}

impl Collection {
    pub const ALL: [Self; 3] = [Self::ShoppingList, Self::Products, Self::Markets];

    /// Collection name in the store.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ShoppingList => "lista_atual",
            Self::Products => "produtos",
            Self::Markets => "mercados",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A document read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
    /// Time of the last write, when the backend reports it.
    pub update_time: Option<DateTime<Utc>>,
}

impl Document {
    /// Get a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Get a string field. Null and missing fields are `None`.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    /// Get a timestamp field. Null and missing fields are `None`.
    #[must_use]
    pub fn get_timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.get(field).and_then(FieldValue::as_timestamp)
    }
}

/// The result of a query, in query order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    documents: Vec<Document>,
}

impl Snapshot {
    #[must_use]
    pub const fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    #[must_use]
    pub fn first(&self) -> Option<&Document> {
        self.documents.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }
}

/// A single write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create a document. Fails if the ID is taken.
    Create {
        collection: Collection,
        id: DocumentId,
        fields: Fields,
    },
    /// Merge fields into an existing document. Fails if it does not exist.
    Update {
        collection: Collection,
        id: DocumentId,
        fields: Fields,
    },
    /// Delete a document. Deleting a missing document succeeds.
    Delete {
        collection: Collection,
        id: DocumentId,
    },
}

impl Write {
    #[must_use]
    pub const fn collection(&self) -> Collection {
        match self {
            Self::Create { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => *collection,
        }
    }

    #[must_use]
    pub const fn id(&self) -> &DocumentId {
        match self {
            Self::Create { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }

    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Create { .. } => Operation::Create,
            Self::Update { .. } => Operation::Update,
            Self::Delete { .. } => Operation::Delete,
        }
    }
}

/// Store operations, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Get,
    Query,
    Update,
    Delete,
    Subscribe,
}

/// Errors that can occur when talking to a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document an update targets does not exist.
    #[error("document {collection}/{id} not found")]
    NotFound {
        collection: Collection,
        id: DocumentId,
    },

    /// A create targets an ID that is already taken.
    #[error("document {collection}/{id} already exists")]
    AlreadyExists {
        collection: Collection,
        id: DocumentId,
    },

    /// The store could not be reached or refused service.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store rejected the request.
    #[error("remote error (status {status}): {message}")]
    Remote { status: u16, message: String },

    /// A document or response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Local persistence failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One event of a subscription: a full snapshot or an error.
pub type SnapshotEvent = StoreResult<Snapshot>;

/// Receiving half of a subscription.
pub type SnapshotReceiver = mpsc::UnboundedReceiver<SnapshotEvent>;

/// Handle that cancels a subscription.
///
/// Cancelling is explicit via [`Unsubscribe::unsubscribe`]; dropping the
/// handle cancels too.
pub struct Unsubscribe(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Unsubscribe {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Some(Box::new(cancel)))
    }

    /// Cancel the subscription now.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unsubscribe")
            .field(&if self.0.is_some() { "active" } else { "cancelled" })
            .finish()
    }
}

/// A standing query delivering snapshots.
#[derive(Debug)]
pub struct Subscription {
    events: SnapshotReceiver,
    unsubscribe: Unsubscribe,
}

impl Subscription {
    #[must_use]
    pub const fn new(events: SnapshotReceiver, unsubscribe: Unsubscribe) -> Self {
        Self {
            events,
            unsubscribe,
        }
    }

    /// Wait for the next snapshot. Returns `None` once the subscription ended.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.events.recv().await
    }

    /// Split into the event receiver and the cancel handle.
    #[must_use]
    pub fn into_parts(self) -> (SnapshotReceiver, Unsubscribe) {
        (self.events, self.unsubscribe)
    }

    /// Cancel the subscription.
    pub fn unsubscribe(self) {
        self.unsubscribe.unsubscribe();
    }
}

/// A schemaless document store with change notifications.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Apply a batch of writes atomically.
    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()>;

    /// Read one document.
    async fn get(&self, collection: Collection, id: &DocumentId) -> StoreResult<Option<Document>>;

    /// Run a query once.
    async fn query(&self, query: &Query) -> StoreResult<Snapshot>;

    /// Subscribe to a query.
    async fn subscribe(&self, query: Query) -> StoreResult<Subscription>;

    /// Create a document with a generated ID.
    async fn create(&self, collection: Collection, fields: Fields) -> StoreResult<DocumentId> {
        let id = DocumentId::generate();
        self.commit(vec![Write::Create {
            collection,
            id: id.clone(),
            fields,
        }])
        .await?;
        Ok(id)
    }

    /// Merge fields into an existing document.
    async fn update(
        &self,
        collection: Collection,
        id: &DocumentId,
        fields: Fields,
    ) -> StoreResult<()> {
        self.commit(vec![Write::Update {
            collection,
            id: id.clone(),
            fields,
        }])
        .await
    }

    /// Delete a document.
    async fn delete(&self, collection: Collection, id: &DocumentId) -> StoreResult<()> {
        self.commit(vec![Write::Delete {
            collection,
            id: id.clone(),
        }])
        .await
    }
}

/// Build the configured store backend.
///
/// # Errors
///
/// Returns `StoreError::Persistence` if the memory store's data file exists
/// but cannot be loaded.
pub fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn DocumentStore>> {
    match config {
        StoreConfig::Memory { data_file: None } => {
            tracing::info!("Using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::Memory {
            data_file: Some(path),
        } => {
            tracing::info!(path = %path.display(), "Using file-backed in-memory document store");
            Ok(Arc::new(MemoryStore::open(path)?))
        }
        StoreConfig::Firestore(firestore) => {
            tracing::info!(project = %firestore.project_id, "Using Firestore document store");
            Ok(Arc::new(FirestoreStore::new(firestore)))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_alphanumeric_and_unique() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();
        assert_eq!(a.as_str().len(), DocumentId::GENERATED_LENGTH);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::ShoppingList.to_string(), "lista_atual");
        assert_eq!(Collection::Products.name(), "produtos");
        assert_eq!(
            serde_json::to_string(&Collection::Markets).unwrap(),
            "\"mercados\""
        );
    }

    #[test]
    fn test_unsubscribe_runs_once_on_drop() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(handle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&calls);
        let handle = Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
