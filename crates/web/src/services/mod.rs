//! Business logic services.
//!
//! # Services
//!
//! - `list` - Adding, removing and repairing shopping-list items
//! - `markets` - Market directory with a cached listing
//! - `purchase` - Purchase dialog and atomic purchase confirmation

pub mod list;
pub mod markets;
pub mod purchase;

pub use list::{AddOutcome, ListController, ListError, ReconcileReport, reconcile};
pub use markets::MarketDirectory;
pub use purchase::{
    DialogError, DialogState, FieldErrors, OpenDialog, PurchaseError, PurchaseForm,
    PurchaseService, Receipt, ValidPurchase,
};
