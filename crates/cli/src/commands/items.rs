//! Shopping list inspection.

use tracing::info;

use shoplist_core::{CurrencyCode, ListOrder, PriceHint};
use shoplist_web::db::{ItemRepository, ProductRepository};
use shoplist_web::live::PriceCache;

use super::{CommandError, open_store};

/// List the items on the shopping list with their price hints.
///
/// # Errors
///
/// Returns `CommandError` if the store cannot be read.
pub async fn list(order: ListOrder, currency: CurrencyCode) -> Result<(), CommandError> {
    let store = open_store()?;
    let items = ItemRepository::new(store.as_ref()).list(order).await?;
    let prices = PriceCache::from_records(ProductRepository::new(store.as_ref()).list().await?);

    info!("Shopping list ({} items)", items.len());
    for item in &items {
        let hint: PriceHint = prices.best_price_hint(&item.name);
        info!(
            "  {} [{}] added {} - {}",
            item.name.display_name(),
            item.id,
            item.created_at.format("%Y-%m-%d %H:%M"),
            hint.describe(currency)
        );
    }
    Ok(())
}
