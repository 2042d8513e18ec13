//! Market directory repository.

use shoplist_core::{Market, MarketId, NormalizedName};

use super::{RepositoryError, decode_name, fields};
use crate::store::{Collection, Document, DocumentId, DocumentStore, FieldValue, Fields, Query, Write};

/// Repository for registered markets.
pub struct MarketRepository<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> MarketRepository<'a> {
    /// Create a new market repository.
    #[must_use]
    pub const fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Decode a stored market.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` if the name is missing or
    /// invalid.
    pub fn from_document(document: &Document) -> Result<Market, RepositoryError> {
        Ok(Market {
            id: MarketId::new(document.id.as_str()),
            name: decode_name(document, fields::NAME)?,
        })
    }

    /// The write registering a market, with a generated ID.
    #[must_use]
    pub fn create_write(name: &NormalizedName) -> (Market, Write) {
        let id = DocumentId::generate();
        let mut data = Fields::new();
        data.insert(fields::NAME.into(), FieldValue::from(name.as_str()));

        let market = Market {
            id: MarketId::new(id.as_str()),
            name: name.clone(),
        };
        let write = Write::Create {
            collection: Collection::Markets,
            id,
            fields: data,
        };
        (market, write)
    }

    /// List all markets sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a market does not decode.
    pub async fn list(&self) -> Result<Vec<Market>, RepositoryError> {
        let query = Query::collection(Collection::Markets).order_by_asc(fields::NAME);
        let snapshot = self.store.query(&query).await?;
        snapshot.iter().map(Self::from_document).collect()
    }

    /// Find a market by normalized name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the query fails.
    pub async fn find_by_name(&self, name: &NormalizedName) -> Result<Option<Market>, RepositoryError> {
        let query = Query::collection(Collection::Markets)
            .where_eq(fields::NAME, name.as_str())
            .limit(1);
        let snapshot = self.store.query(&query).await?;
        snapshot.first().map(Self::from_document).transpose()
    }

    /// Register a market unless one with the same name exists.
    ///
    /// Returns the market and whether it was created.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the query or write fails.
    pub async fn ensure(&self, name: &NormalizedName) -> Result<(Market, bool), RepositoryError> {
        if let Some(existing) = self.find_by_name(name).await? {
            return Ok((existing, false));
        }
        let (market, write) = Self::create_write(name);
        self.store.commit(vec![write]).await?;
        Ok((market, true))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_ensure_is_idempotent_and_list_is_sorted() {
        let store = MemoryStore::new();
        let repo = MarketRepository::new(&store);

        let zeta = NormalizedName::parse("Zeta Mart").unwrap();
        let alpha = NormalizedName::parse("alpha").unwrap();

        let (first, created) = repo.ensure(&zeta).await.unwrap();
        assert!(created);
        let (again, created) = repo.ensure(&NormalizedName::parse(" ZETA  mart ").unwrap()).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, again.id);

        repo.ensure(&alpha).await.unwrap();
        let names: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name.into_inner())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta mart"]);
    }
}
