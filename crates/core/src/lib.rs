//! Shoplist Core - Shared domain types.
//!
//! This crate provides the types used across all Shoplist components:
//! - `web` - The live shopping list served over HTTP
//! - `cli` - Command-line tools for managing markets, history and the list
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no document
//! store access, no HTTP clients. This keeps it lightweight and allows it to
//! be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, normalized names and prices, plus
//!   the shopping-list, price-history and market models

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
