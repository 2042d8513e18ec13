//! Health check endpoints.

use axum::{extract::State, http::StatusCode};

use crate::db::ItemRepository;
use crate::state::AppState;
use shoplist_core::ItemId;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies a store round trip and a running sync engine. Returns 503
/// Service Unavailable otherwise.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if !state.sync().is_running().await {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match ItemRepository::new(state.store().as_ref())
        .get(&ItemId::new("readiness-check"))
        .await
    {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
