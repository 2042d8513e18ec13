//! CLI command implementations.
//!
//! Every command opens the store configured through the same environment
//! variables as the server (`SHOPLIST_STORE`, `FIRESTORE_*`, ...).

pub mod history;
pub mod items;
pub mod markets;
pub mod reconcile;

use std::sync::Arc;

use thiserror::Error;

use shoplist_core::NameError;
use shoplist_web::config::{ConfigError, StoreConfig};
use shoplist_web::db::RepositoryError;
use shoplist_web::store::{self, DocumentStore, StoreError};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Invalid name '{0}': {1}")]
    InvalidName(String, NameError),

    #[error("Failed to read {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Invalid seed file: {0}")]
    Seed(#[from] serde_yaml::Error),

    #[error("No product named '{0}' in the price history")]
    UnknownProduct(String),
}

/// Open the configured store.
///
/// # Errors
///
/// Returns `CommandError` if the configuration is invalid or the store
/// cannot be opened.
pub fn open_store() -> Result<Arc<dyn DocumentStore>, CommandError> {
    dotenvy::dotenv().ok();
    let config = StoreConfig::from_env()?;
    Ok(store::connect(&config)?)
}

/// Parse a name given on the command line.
fn parse_name(raw: &str) -> Result<shoplist_core::NormalizedName, CommandError> {
    shoplist_core::NormalizedName::parse(raw)
        .map_err(|e| CommandError::InvalidName(raw.to_owned(), e))
}
