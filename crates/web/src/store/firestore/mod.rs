//! Cloud Firestore backend over the REST API.
//!
//! Uses `reqwest` 0.13 for HTTP. Batches go through `documents:commit`, which
//! Firestore applies atomically. The REST API has no listen stream, so
//! subscriptions poll: a background task re-runs the query every
//! `poll_interval` and emits a snapshot only when the result changed.

mod encoding;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use crate::config::FirestoreConfig;
use crate::store::{
    Collection, Document, DocumentId, DocumentStore, Query, Snapshot, StoreError, StoreResult,
    Subscription, Unsubscribe, Write,
};

use encoding::{RawDocument, RunQueryItem, decode_document, encode_query, encode_write};

/// Client for one Firestore database.
#[derive(Clone)]
pub struct FirestoreStore {
    inner: Arc<FirestoreInner>,
}

struct FirestoreInner {
    client: reqwest::Client,
    /// API base, e.g. `https://firestore.googleapis.com/v1`.
    endpoint: String,
    /// `projects/{project}/databases/{database}/documents`.
    documents_root: String,
    api_key: String,
    poll_interval: Duration,
}

impl FirestoreStore {
    /// Create a client for the configured project and database.
    #[must_use]
    pub fn new(config: &FirestoreConfig) -> Self {
        let documents_root = format!(
            "projects/{}/databases/{}/documents",
            config.project_id, config.database
        );

        Self {
            inner: Arc::new(FirestoreInner {
                client: reqwest::Client::new(),
                endpoint: config.endpoint.trim_end_matches('/').to_string(),
                documents_root,
                api_key: config.api_key.expose_secret().to_string(),
                poll_interval: config.poll_interval,
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.inner.endpoint)
    }

    /// Send a request and parse the JSON body.
    ///
    /// Returns `Ok(None)` on 404 so callers can decide what a missing
    /// resource means.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> StoreResult<Option<T>> {
        let response = request
            .query(&[("key", self.inner.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body);
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Firestore returned non-success status"
            );
            return Err(match status {
                reqwest::StatusCode::TOO_MANY_REQUESTS
                | reqwest::StatusCode::SERVICE_UNAVAILABLE
                | reqwest::StatusCode::GATEWAY_TIMEOUT => StoreError::Unavailable(message),
                _ => StoreError::Remote {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        serde_json::from_str(&body).map(Some).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse Firestore response"
            );
            StoreError::Decode(e.to_string())
        })
    }

    async fn run_query(&self, query: &Query) -> StoreResult<Snapshot> {
        let url = self.url(&format!("{}:runQuery", self.inner.documents_root));
        let request = self.inner.client.post(url).json(&encode_query(query));
        let items: Vec<RunQueryItem> = self.send(request).await?.unwrap_or_default();

        let documents = items
            .iter()
            .filter_map(|item| item.document.as_ref())
            .map(decode_document)
            .collect::<StoreResult<Vec<Document>>>()?;
        Ok(Snapshot::new(documents))
    }
}

/// Extract `error.message` from a Google API error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Attribute a failed precondition to the write that caused it.
///
/// Firestore reports which precondition failed but not which write, so the
/// first write of the matching kind is named.
fn precondition_error(writes: &[Write], error: StoreError) -> StoreError {
    let StoreError::Remote { status, .. } = &error else {
        return error;
    };
    let wanted: fn(&Write) -> bool = match status {
        409 => |w: &Write| matches!(w, Write::Create { .. }),
        404 => |w: &Write| matches!(w, Write::Update { .. }),
        _ => return error,
    };
    match writes.iter().find(|w| wanted(w)) {
        Some(Write::Create { collection, id, .. }) => StoreError::AlreadyExists {
            collection: *collection,
            id: id.clone(),
        },
        Some(Write::Update { collection, id, .. }) => StoreError::NotFound {
            collection: *collection,
            id: id.clone(),
        },
        _ => error,
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    #[instrument(skip(self, writes), fields(writes = writes.len()))]
    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let body = json!({
            "writes": writes
                .iter()
                .map(|w| encode_write(&self.inner.documents_root, w))
                .collect::<Vec<_>>(),
        });
        let url = self.url(&format!("{}:commit", self.inner.documents_root));
        let request = self.inner.client.post(url).json(&body);

        match self.send::<Value>(request).await {
            Ok(Some(_)) => Ok(()),
            // commit only 404s when an update targets a missing document
            Ok(None) => Err(precondition_error(
                &writes,
                StoreError::Remote {
                    status: 404,
                    message: "document not found".to_string(),
                },
            )),
            Err(e) => Err(precondition_error(&writes, e)),
        }
    }

    #[instrument(skip(self), fields(collection = %collection, id = %id))]
    async fn get(&self, collection: Collection, id: &DocumentId) -> StoreResult<Option<Document>> {
        let url = self.url(&encoding::document_name(
            &self.inner.documents_root,
            collection,
            id,
        ));
        let raw: Option<RawDocument> = self.send(self.inner.client.get(url)).await?;
        raw.as_ref().map(decode_document).transpose()
    }

    #[instrument(skip(self, query), fields(collection = %query.collection))]
    async fn query(&self, query: &Query) -> StoreResult<Snapshot> {
        self.run_query(query).await
    }

    #[instrument(skip(self, query), fields(collection = %query.collection))]
    async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
        // First snapshot is fetched eagerly so a bad query fails the call.
        let initial = self.run_query(&query).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(initial.clone()));

        let store = self.clone();
        let poll_interval = self.inner.poll_interval;
        let task = tokio::spawn(async move {
            let mut last = initial;
            let mut failing = false;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match store.run_query(&query).await {
                    Ok(snapshot) => {
                        failing = false;
                        if snapshot != last {
                            debug!(documents = snapshot.len(), "Snapshot changed");
                            last = snapshot.clone();
                            if tx.send(Ok(snapshot)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Subscription poll failed");
                        // report the first failure of a streak only
                        if !failing && tx.send(Err(e)).is_err() {
                            break;
                        }
                        failing = true;
                    }
                }
            }
        });

        let abort = task.abort_handle();
        Ok(Subscription::new(rx, Unsubscribe::new(move || abort.abort())))
    }
}
