//! List repair.

use tracing::info;

use super::{CommandError, open_store};

/// Remove items left behind by interrupted purchases and duplicates.
///
/// # Errors
///
/// Returns `CommandError` if reading or deleting fails.
pub async fn run() -> Result<(), CommandError> {
    let store = open_store()?;
    let report = shoplist_web::services::reconcile(store.as_ref()).await?;

    if report.removed() == 0 {
        info!("Nothing to repair");
    } else {
        info!(
            purchased = report.purchased.len(),
            duplicates = report.duplicates.len(),
            "Removed {} leftover items",
            report.removed()
        );
    }
    Ok(())
}
