//! Typed repositories over the document store.
//!
//! # Collections
//!
//! - `lista_atual` - active shopping-list items ([`ItemRepository`])
//! - `produtos` - price history, one document per product ([`ProductRepository`])
//! - `mercados` - market directory ([`MarketRepository`])
//!
//! Repositories borrow a `&dyn DocumentStore` and translate between store
//! documents and `shoplist_core` models. Besides direct operations they
//! expose the [`Write`](crate::store::Write)s behind them, so callers can
//! combine several into one atomic batch.

pub mod items;
pub mod markets;
pub mod products;

use thiserror::Error;

pub use items::ItemRepository;
pub use markets::MarketRepository;
pub use products::ProductRepository;

use crate::store::{Document, Snapshot, StoreError};

/// Field names used in stored documents.
pub mod fields {
    pub const NAME: &str = "name";
    pub const CREATED_AT: &str = "createdAt";
    pub const BEST_REGULAR_PRICE: &str = "bestRegularPrice";
    pub const BEST_REGULAR_MARKET: &str = "bestRegularMarket";
    pub const BEST_PROMO_PRICE: &str = "bestPromoPrice";
    pub const BEST_PROMO_MARKET: &str = "bestPromoMarket";
    pub const LAST_PURCHASED_AT: &str = "lastPurchasedAt";
}

/// Errors that can occur in repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Document store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A stored document does not decode into its model.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Uniqueness violation (e.g. a name already on the list).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Decode every document of a snapshot, skipping (and logging) the ones
/// that do not decode.
///
/// Used for live views, where one bad document must not hide the rest.
pub fn decode_lenient<T>(
    snapshot: &Snapshot,
    decode: impl Fn(&Document) -> Result<T, RepositoryError>,
) -> Vec<T> {
    snapshot
        .iter()
        .filter_map(|document| match decode(document) {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!(id = %document.id, error = %e, "Skipping undecodable document");
                None
            }
        })
        .collect()
}

/// Read a required normalized name field.
fn decode_name(
    document: &Document,
    field: &str,
) -> Result<shoplist_core::NormalizedName, RepositoryError> {
    let raw = document.get_str(field).ok_or_else(|| {
        RepositoryError::DataCorruption(format!("document {} has no {field}", document.id))
    })?;
    shoplist_core::NormalizedName::parse(raw).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid {field} in document {}: {e}", document.id))
    })
}
