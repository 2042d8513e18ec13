//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                            - Home page (add form, list, history)
//! GET  /health                      - Liveness
//! GET  /health/ready                - Readiness (store round trip)
//! GET  /events                      - SSE, one `view-updated` per view change
//!
//! # List (HTMX fragments)
//! GET  /list                        - List fragment
//! POST /list/items                  - Add item (409 on duplicates)
//! POST /list/items/{id}/delete      - Delete item
//! POST /list/order                  - Change ordering (returns list fragment)
//!
//! # Purchase dialog
//! GET  /list/items/{id}/buy         - Open dialog
//! POST /list/items/{id}/buy         - Confirm purchase
//! GET  /list/items/{id}/buy/cancel  - Close dialog
//!
//! # History
//! GET  /history                     - History fragment
//! POST /history/readd               - Re-add product to the list
//! POST /history/{id}/delete         - Delete product from the history
//! ```

pub mod events;
pub mod health;
pub mod history;
pub mod home;
pub mod list;
pub mod purchase;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the list routes router.
pub fn list_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list::show))
        .route("/items", post(list::add))
        .route("/items/{id}/delete", post(list::delete))
        .route("/order", post(list::set_order))
        .route("/items/{id}/buy", get(purchase::open).post(purchase::confirm))
        .route("/items/{id}/buy/cancel", get(purchase::cancel))
}

/// Create the history routes router.
pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(history::show))
        .route("/readd", post(history::re_add))
        .route("/{id}/delete", post(history::delete))
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/events", get(events::stream_updates))
        .nest("/list", list_routes())
        .nest("/history", history_routes())
}
