//! Live synchronization with the document store.
//!
//! # Architecture
//!
//! - Two standing subscriptions (list, price history) each run in their own
//!   task and publish into `tokio::sync::watch` cells
//! - A third task derives the [`LiveView`] whenever any input cell changes
//! - There is no ordering between the two subscriptions; the derivation
//!   reads whatever each cell holds
//!
//! All of it is owned by the [`SyncEngine`].

mod cells;
mod engine;
mod view;

pub use cells::{ActiveItems, Claim, PendingAdds, PriceCache};
pub use engine::SyncEngine;
pub use view::{HistoryEntry, ListEntry, LiveView, ViewInputs};
