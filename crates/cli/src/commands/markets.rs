//! Market directory management.
//!
//! # Seed file
//!
//! ```yaml
//! markets:
//!   - StoreA
//!   - Mercado Central
//! ```
//!
//! A bare YAML list of names is accepted as well.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use shoplist_web::db::MarketRepository;

use super::{CommandError, open_store, parse_name};

/// Accepted seed file layouts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedFile {
    Names(Vec<String>),
    Document { markets: Vec<String> },
}

impl SeedFile {
    fn into_names(self) -> Vec<String> {
        match self {
            Self::Names(names) | Self::Document { markets: names } => names,
        }
    }
}

/// List every market.
///
/// # Errors
///
/// Returns `CommandError` if the store cannot be read.
pub async fn list() -> Result<(), CommandError> {
    let store = open_store()?;
    let markets = MarketRepository::new(store.as_ref()).list().await?;

    info!("Markets ({})", markets.len());
    for market in &markets {
        info!("  {} [{}]", market.name.display_name(), market.id);
    }
    Ok(())
}

/// Register a market unless one with the same normalized name exists.
///
/// # Errors
///
/// Returns `CommandError` for an invalid name or a store failure.
pub async fn add(name: &str) -> Result<(), CommandError> {
    let store = open_store()?;
    let normalized = parse_name(name)?;
    let (market, created) = MarketRepository::new(store.as_ref())
        .ensure(&normalized)
        .await?;

    if created {
        info!(market = %market.id, "Added market {}", market.name.display_name());
    } else {
        info!("Market {} already exists", market.name.display_name());
    }
    Ok(())
}

/// Register every market listed in a YAML file.
///
/// Invalid names are skipped with a warning; the rest are registered.
///
/// # Errors
///
/// Returns `CommandError` if the file cannot be read or parsed, or a write
/// fails.
pub async fn seed(file_path: &str) -> Result<(), CommandError> {
    let path = Path::new(file_path);
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CommandError::Io(file_path.to_owned(), e))?;
    let names = serde_yaml::from_str::<SeedFile>(&content)?.into_names();
    info!(path = %file_path, entries = names.len(), "Loaded seed file");

    let store = open_store()?;
    let repo = MarketRepository::new(store.as_ref());

    let mut created = 0_usize;
    let mut skipped = 0_usize;
    for raw in &names {
        let name = match parse_name(raw) {
            Ok(name) => name,
            Err(e) => {
                warn!("Skipping entry: {e}");
                skipped += 1;
                continue;
            }
        };
        if repo.ensure(&name).await?.1 {
            created += 1;
        } else {
            skipped += 1;
        }
    }

    info!("Seeding complete!");
    info!("  Markets created: {created}");
    info!("  Skipped (existing or invalid): {skipped}");
    Ok(())
}
