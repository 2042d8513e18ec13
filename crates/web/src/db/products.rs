//! Price history repository.
//!
//! Prices are stored as decimal strings. Numeric values are accepted on read
//! as well.

use rust_decimal::Decimal;
use shoplist_core::{
    BestPrice, NormalizedName, Price, PriceTrack, ProductId, ProductPriceRecord, PurchaseOutcome,
};

use super::{RepositoryError, decode_name, fields};
use crate::store::{
    Collection, Document, DocumentId, DocumentStore, FieldValue, Fields, Query, Write,
};

/// Field names of one price track.
const fn track_fields(track: PriceTrack) -> (&'static str, &'static str) {
    match track {
        PriceTrack::Regular => (fields::BEST_REGULAR_PRICE, fields::BEST_REGULAR_MARKET),
        PriceTrack::Promotional => (fields::BEST_PROMO_PRICE, fields::BEST_PROMO_MARKET),
    }
}

fn decode_price(document: &Document, field: &str) -> Result<Option<Price>, RepositoryError> {
    let corrupt =
        |detail: String| RepositoryError::DataCorruption(format!("{field} in {}: {detail}", document.id));

    match document.get(field) {
        None | Some(FieldValue::Null) => Ok(None),
        Some(FieldValue::String(raw)) => Price::parse(raw).map(Some).map_err(|e| corrupt(e.to_string())),
        Some(FieldValue::Integer(n)) => Price::new(Decimal::from(*n))
            .map(Some)
            .map_err(|e| corrupt(e.to_string())),
        Some(FieldValue::Double(n)) => Decimal::try_from(*n)
            .map_err(|e| corrupt(e.to_string()))
            .and_then(|d| Price::new(d).map_err(|e| corrupt(e.to_string())))
            .map(Some),
        Some(other) => Err(corrupt(format!("unexpected value {other:?}"))),
    }
}

fn decode_track(
    document: &Document,
    track: PriceTrack,
) -> Result<Option<BestPrice>, RepositoryError> {
    let (price_field, market_field) = track_fields(track);
    let Some(price) = decode_price(document, price_field)? else {
        return Ok(None);
    };
    // a price without a market is kept; the market shows as unknown
    let market = match document.get_str(market_field) {
        Some(raw) => NormalizedName::parse(raw).map_err(|e| {
            RepositoryError::DataCorruption(format!("{market_field} in {}: {e}", document.id))
        })?,
        None => NormalizedName::parse("unknown").map_err(|e| {
            RepositoryError::DataCorruption(e.to_string())
        })?,
    };
    Ok(Some(BestPrice { price, market }))
}

fn encode_track(data: &mut Fields, track: PriceTrack, best: Option<&BestPrice>) {
    let (price_field, market_field) = track_fields(track);
    data.insert(
        price_field.into(),
        FieldValue::from(best.map(|b| b.price.amount().to_string())),
    );
    data.insert(
        market_field.into(),
        FieldValue::from(best.map(|b| b.market.as_str().to_string())),
    );
}

/// Repository for product price records.
pub struct ProductRepository<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Query backing the history panel and price cache.
    #[must_use]
    pub fn history_query() -> Query {
        Query::collection(Collection::Products).order_by_asc(fields::NAME)
    }

    fn by_name_query(name: &NormalizedName) -> Query {
        Query::collection(Collection::Products)
            .where_eq(fields::NAME, name.as_str())
            .limit(1)
    }

    /// Decode a stored price record.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` if the name or a price is
    /// invalid.
    pub fn from_document(document: &Document) -> Result<ProductPriceRecord, RepositoryError> {
        Ok(ProductPriceRecord {
            id: ProductId::new(document.id.as_str()),
            name: decode_name(document, fields::NAME)?,
            best_regular: decode_track(document, PriceTrack::Regular)?,
            best_promo: decode_track(document, PriceTrack::Promotional)?,
            last_purchased_at: document.get_timestamp(fields::LAST_PURCHASED_AT),
        })
    }

    /// The write persisting a purchase applied to `record`.
    ///
    /// A record that is not yet stored is created whole. A stored record only
    /// gets `lastPurchasedAt` refreshed, plus the purchase's track when it
    /// became the new best. Both forms are safe to retry.
    #[must_use]
    pub fn purchase_write(
        record: &ProductPriceRecord,
        outcome: &PurchaseOutcome,
        stored: bool,
    ) -> Write {
        let mut data = Fields::new();
        data.insert(fields::LAST_PURCHASED_AT.into(), FieldValue::ServerTimestamp);
        let id = DocumentId::new(record.id.as_str());

        if stored {
            if let PurchaseOutcome::NewBest { track, .. } = outcome {
                encode_track(&mut data, *track, record.best(*track));
            }
            return Write::Update {
                collection: Collection::Products,
                id,
                fields: data,
            };
        }

        data.insert(fields::NAME.into(), FieldValue::from(record.name.as_str()));
        for track in [PriceTrack::Regular, PriceTrack::Promotional] {
            encode_track(&mut data, track, record.best(track));
        }
        Write::Create {
            collection: Collection::Products,
            id,
            fields: data,
        }
    }

    /// A fresh record for a product without history, with a generated ID.
    #[must_use]
    pub fn new_record(name: NormalizedName) -> ProductPriceRecord {
        ProductPriceRecord::empty(ProductId::new(DocumentId::generate().into_inner()), name)
    }

    /// List every record, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a record does not decode.
    pub async fn list(&self) -> Result<Vec<ProductPriceRecord>, RepositoryError> {
        let snapshot = self.store.query(&Self::history_query()).await?;
        snapshot.iter().map(Self::from_document).collect()
    }

    /// Find the record of a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the query fails.
    pub async fn find_by_name(
        &self,
        name: &NormalizedName,
    ) -> Result<Option<ProductPriceRecord>, RepositoryError> {
        let snapshot = self.store.query(&Self::by_name_query(name)).await?;
        snapshot.first().map(Self::from_document).transpose()
    }

    /// Get a record by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the read fails.
    pub async fn get(&self, id: &ProductId) -> Result<Option<ProductPriceRecord>, RepositoryError> {
        let document = self
            .store
            .get(Collection::Products, &DocumentId::new(id.as_str()))
            .await?;
        document.as_ref().map(Self::from_document).transpose()
    }

    /// Delete a record from the history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the write fails.
    pub async fn delete(&self, id: &ProductId) -> Result<(), RepositoryError> {
        self.store
            .delete(Collection::Products, &DocumentId::new(id.as_str()))
            .await?;
        Ok(())
    }

    /// Delete the record of a product by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product has no record.
    /// Returns `RepositoryError::Store` if the query or write fails.
    pub async fn delete_by_name(&self, name: &NormalizedName) -> Result<ProductId, RepositoryError> {
        let record = self
            .find_by_name(name)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        self.delete(&record.id).await?;
        Ok(record.id)
    }
}
