//! Core types for Shoplist.
//!
//! This module provides type-safe wrappers for the domain concepts shared by
//! the shopping list, the price history and the market directory.

pub mod hint;
pub mod id;
pub mod item;
pub mod market;
pub mod name;
pub mod price;
pub mod product;

pub use hint::PriceHint;
pub use id::*;
pub use item::{ListOrder, ShoppingListItem};
pub use market::Market;
pub use name::{NameError, NormalizedName};
pub use price::{CurrencyCode, Price, PriceError};
pub use product::{BestPrice, PriceRule, PriceTrack, ProductPriceRecord, Purchase, PurchaseOutcome};
