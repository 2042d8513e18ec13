//! Integration tests for Shoplist.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shoplist-integration-tests
//! ```
//!
//! Every test runs the full application (router, sync engine, services) over
//! an in-memory store; no external services are needed.
//!
//! # Test Categories
//!
//! - `list_flow` - Adding, removing and ordering items over HTTP
//! - `purchase_flow` - The purchase dialog and best-price bookkeeping
//! - `live_sync` - Subscriptions, the derived view and the history panel

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use tower::ServiceExt;

use shoplist_core::NormalizedName;
use shoplist_web::config::ShoplistConfig;
use shoplist_web::live::LiveView;
use shoplist_web::state::AppState;
use shoplist_web::store::MemoryStore;

/// How long a test waits for the live view to settle.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// A running application over a fresh memory store.
pub struct TestContext {
    pub store: MemoryStore,
    pub state: AppState,
    pub app: Router,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_store(MemoryStore::new()).await
    }

    pub async fn with_store(store: MemoryStore) -> Self {
        let state = shoplist_web::start(ShoplistConfig::in_memory(), Arc::new(store.clone()))
            .await
            .unwrap();
        let app = shoplist_web::app(state.clone());
        Self { store, state, app }
    }

    /// Send a GET request.
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    /// Send a form POST.
    pub async fn post_form(&self, uri: &str, pairs: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        TestResponse::read(response).await
    }

    /// Wait until the live view satisfies `predicate`.
    pub async fn settle(&self, predicate: impl FnMut(&Arc<LiveView>) -> bool) -> Arc<LiveView> {
        tokio::time::timeout(SETTLE_TIMEOUT, self.state.sync().wait_for(predicate))
            .await
            .expect("live view did not settle")
            .unwrap()
    }

    /// Wait until `name` is on the rendered list.
    pub async fn settle_listed(&self, name: &str) -> Arc<LiveView> {
        let name = NormalizedName::parse(name).unwrap();
        self.settle(|view| view.lists(&name)).await
    }

    /// Id of the listed item called `name`.
    pub fn item_id(&self, name: &str) -> String {
        let name = NormalizedName::parse(name).unwrap();
        self.state
            .sync()
            .view()
            .list
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id.as_str().to_string())
            .unwrap()
    }

    pub async fn shutdown(self) {
        self.state.sync().shutdown().await;
    }
}

/// Status, headers and body of a response.
pub struct TestResponse {
    pub status: StatusCode,
    pub trigger: Option<String>,
    pub body: String,
}

impl TestResponse {
    async fn read(response: Response<Body>) -> Self {
        let status = response.status();
        let trigger = response
            .headers()
            .get("hx-trigger")
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        Self {
            status,
            trigger,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    /// Whether the response asks the page to refresh.
    pub fn triggers_refresh(&self) -> bool {
        self.trigger.as_deref() == Some("view-updated")
    }
}
