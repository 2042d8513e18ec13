//! Shoplist web library.
//!
//! A shared household shopping list with a per-product price history. This
//! crate provides the server as a library, allowing it to be tested and
//! reused by the CLI.
//!
//! # Modules
//!
//! - [`store`] - Document store facade (memory and Firestore backends)
//! - [`db`] - Typed repositories over the store
//! - [`live`] - Standing subscriptions and the derived live view
//! - [`services`] - List, market and purchase logic
//! - [`routes`] - HTTP handlers and HTMX fragments

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod live;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use std::sync::Arc;

use axum::{Router, middleware::from_fn};
use thiserror::Error;
use tower_http::{
    services::ServeDir,
    trace::{DefaultOnResponse, OnResponse, TraceLayer},
};
use tracing::{Span, info};

use config::ShoplistConfig;
use live::SyncEngine;
use shoplist_core::ListOrder;
use state::AppState;
use store::{DocumentStore, StoreError};

/// Directory static assets are served from, relative to the workspace root.
pub const STATIC_DIR: &str = "crates/web/static";

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("recovery failed: {0}")]
    Recovery(#[from] db::RepositoryError),
}

/// Repair the list, then start live synchronization.
///
/// # Errors
///
/// Returns `StartupError` if the recovery pass or a subscription fails.
pub async fn start(
    config: ShoplistConfig,
    store: Arc<dyn DocumentStore>,
) -> Result<AppState, StartupError> {
    let report = services::reconcile(store.as_ref()).await?;
    if report.removed() > 0 {
        info!(removed = report.removed(), "List repaired on start");
    }

    let sync = SyncEngine::start(store, ListOrder::default()).await?;
    Ok(AppState::new(config, sync))
}

/// Build the router with its middleware stack.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
