//! Shopping-list item repository.

use shoplist_core::{ItemId, ListOrder, NormalizedName, ShoppingListItem};

use super::{RepositoryError, decode_name, fields};
use crate::store::{
    Collection, Direction, Document, DocumentId, DocumentStore, FieldValue, Fields, Query, Write,
};

/// Repository for the active shopping list.
pub struct ItemRepository<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> ItemRepository<'a> {
    /// Create a new item repository.
    #[must_use]
    pub const fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Query backing the live list in the given order.
    #[must_use]
    pub fn list_query(order: ListOrder) -> Query {
        let direction = match order {
            ListOrder::OldestFirst => Direction::Ascending,
            ListOrder::NewestFirst => Direction::Descending,
        };
        Query::collection(Collection::ShoppingList).order_by(fields::CREATED_AT, direction)
    }

    /// Decode a stored item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` if the name or creation
    /// time is missing or invalid.
    pub fn from_document(document: &Document) -> Result<ShoppingListItem, RepositoryError> {
        let name = decode_name(document, fields::NAME)?;
        let created_at = document.get_timestamp(fields::CREATED_AT).ok_or_else(|| {
            RepositoryError::DataCorruption(format!("item {} has no createdAt", document.id))
        })?;

        Ok(ShoppingListItem {
            id: ItemId::new(document.id.as_str()),
            name,
            created_at,
        })
    }

    /// The write creating a new item. The store assigns `createdAt`.
    #[must_use]
    pub fn create_write(name: &NormalizedName) -> (ItemId, Write) {
        let id = DocumentId::generate();
        let mut data = Fields::new();
        data.insert(fields::NAME.into(), FieldValue::from(name.as_str()));
        data.insert(fields::CREATED_AT.into(), FieldValue::ServerTimestamp);

        (
            ItemId::new(id.as_str()),
            Write::Create {
                collection: Collection::ShoppingList,
                id,
                fields: data,
            },
        )
    }

    /// The write removing an item.
    #[must_use]
    pub fn delete_write(id: &ItemId) -> Write {
        Write::Delete {
            collection: Collection::ShoppingList,
            id: DocumentId::new(id.as_str()),
        }
    }

    /// List all items in the given order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if an item does not decode.
    pub async fn list(&self, order: ListOrder) -> Result<Vec<ShoppingListItem>, RepositoryError> {
        let snapshot = self.store.query(&Self::list_query(order)).await?;
        snapshot.iter().map(Self::from_document).collect()
    }

    /// Get an item by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the read fails.
    pub async fn get(&self, id: &ItemId) -> Result<Option<ShoppingListItem>, RepositoryError> {
        let document = self
            .store
            .get(Collection::ShoppingList, &DocumentId::new(id.as_str()))
            .await?;
        document.as_ref().map(Self::from_document).transpose()
    }

    /// Add an item to the list.
    ///
    /// Does not check for duplicates; that is the list controller's job.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the write fails.
    pub async fn add(&self, name: &NormalizedName) -> Result<ItemId, RepositoryError> {
        let (id, write) = Self::create_write(name);
        self.store.commit(vec![write]).await?;
        Ok(id)
    }

    /// Remove an item. Removing a missing item succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the write fails.
    pub async fn delete(&self, id: &ItemId) -> Result<(), RepositoryError> {
        self.store.commit(vec![Self::delete_write(id)]).await?;
        Ok(())
    }

    /// Remove several items in one batch.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the write fails.
    pub async fn delete_many(&self, ids: &[ItemId]) -> Result<(), RepositoryError> {
        let writes = ids.iter().map(Self::delete_write).collect();
        self.store.commit(writes).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn name(s: &str) -> NormalizedName {
        NormalizedName::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_add_and_list_in_both_orders() {
        let store = MemoryStore::new();
        let repo = ItemRepository::new(&store);

        let milk = repo.add(&name("Milk")).await.unwrap();
        let eggs = repo.add(&name("eggs")).await.unwrap();

        let oldest: Vec<ItemId> = repo
            .list(ListOrder::OldestFirst)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(oldest, vec![milk.clone(), eggs.clone()]);

        let newest: Vec<ItemId> = repo
            .list(ListOrder::NewestFirst)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(newest, vec![eggs, milk]);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let store = MemoryStore::new();
        let repo = ItemRepository::new(&store);

        let id = repo.add(&name("bread")).await.unwrap();
        let item = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(item.name.as_str(), "bread");

        repo.delete(&id).await.unwrap();
        assert!(repo.get(&id).await.unwrap().is_none());
        // deleting again is fine
        repo.delete(&id).await.unwrap();
    }

    #[test]
    fn test_from_document_requires_created_at() {
        let mut data = Fields::new();
        data.insert(fields::NAME.into(), FieldValue::from("milk"));
        let document = Document {
            id: DocumentId::new("x"),
            fields: data,
            update_time: None,
        };
        assert!(matches!(
            ItemRepository::from_document(&document),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}
