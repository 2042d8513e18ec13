//! Shoplist CLI - market, price-history and list management.
//!
//! # Usage
//!
//! ```bash
//! # Show the shopping list with price hints
//! shoplist items list --newest-first
//!
//! # Manage markets
//! shoplist markets list
//! shoplist markets add "Mercado Central"
//! shoplist markets seed markets.yaml
//!
//! # Manage the price history
//! shoplist history list
//! shoplist history remove milk
//!
//! # Remove items left behind by interrupted purchases
//! shoplist reconcile
//! ```
//!
//! The store is selected with the same environment variables as the server.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use shoplist_core::{CurrencyCode, ListOrder};

mod commands;

#[derive(Parser)]
#[command(name = "shoplist")]
#[command(author, version, about = "Shoplist CLI tools")]
struct Cli {
    /// Currency prices are shown in
    #[arg(long, global = true, env = "SHOPLIST_CURRENCY", default_value = "BRL")]
    currency: CurrencyCode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the shopping list
    Items {
        #[command(subcommand)]
        action: ItemsAction,
    },
    /// Manage markets
    Markets {
        #[command(subcommand)]
        action: MarketsAction,
    },
    /// Manage the price history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Remove items left behind by interrupted purchases, and duplicates
    Reconcile,
}

#[derive(Subcommand)]
enum ItemsAction {
    /// List items with their best known prices
    List {
        /// Show the newest items first
        #[arg(long)]
        newest_first: bool,
    },
}

#[derive(Subcommand)]
enum MarketsAction {
    /// List markets
    List,
    /// Add a market
    Add {
        /// Market name
        name: String,
    },
    /// Add every market listed in a YAML file
    Seed {
        /// Path to the YAML file
        file: String,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List products with their best prices
    List,
    /// Remove a product from the history
    Remove {
        /// Product name
        name: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    let currency = cli.currency;
    match cli.command {
        Commands::Items { action } => match action {
            ItemsAction::List { newest_first } => {
                let order = if newest_first {
                    ListOrder::NewestFirst
                } else {
                    ListOrder::OldestFirst
                };
                commands::items::list(order, currency).await?;
            }
        },
        Commands::Markets { action } => match action {
            MarketsAction::List => commands::markets::list().await?,
            MarketsAction::Add { name } => commands::markets::add(&name).await?,
            MarketsAction::Seed { file } => commands::markets::seed(&file).await?,
        },
        Commands::History { action } => match action {
            HistoryAction::List => commands::history::list(currency).await?,
            HistoryAction::Remove { name } => commands::history::remove(&name).await?,
        },
        Commands::Reconcile => commands::reconcile::run().await?,
    }
    Ok(())
}
