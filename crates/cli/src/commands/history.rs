//! Price history management.

use tracing::info;

use shoplist_core::{CurrencyCode, PriceTrack};
use shoplist_web::db::{ProductRepository, RepositoryError};

use super::{CommandError, open_store, parse_name};

/// List every product with its best prices.
///
/// # Errors
///
/// Returns `CommandError` if the store cannot be read.
pub async fn list(currency: CurrencyCode) -> Result<(), CommandError> {
    let store = open_store()?;
    let records = ProductRepository::new(store.as_ref()).list().await?;

    info!("Price history ({} products)", records.len());
    for record in &records {
        let describe = |track| {
            record.best(track).map_or_else(
                || "-".to_string(),
                |best| format!("{} at {}", best.price.display(currency), best.market.display_name()),
            )
        };
        let last = record
            .last_purchased_at
            .map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d").to_string());
        info!(
            "  {}: regular {}, promo {}, last bought {}",
            record.name.display_name(),
            describe(PriceTrack::Regular),
            describe(PriceTrack::Promotional),
            last
        );
    }
    Ok(())
}

/// Remove a product from the price history.
///
/// # Errors
///
/// Returns `CommandError::UnknownProduct` if no record has that name.
pub async fn remove(name: &str) -> Result<(), CommandError> {
    let store = open_store()?;
    let normalized = parse_name(name)?;
    let id = match ProductRepository::new(store.as_ref())
        .delete_by_name(&normalized)
        .await
    {
        Ok(id) => id,
        Err(RepositoryError::NotFound) => return Err(CommandError::UnknownProduct(name.to_owned())),
        Err(e) => return Err(e.into()),
    };
    info!(product = %id, "Removed {} from the price history", normalized.display_name());
    Ok(())
}
