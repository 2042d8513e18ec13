//! Server-sent events for live updates.
//!
//! One `view-updated` event is sent per derived view change; the page
//! re-fetches its fragments on receipt. Changes that happen while a client
//! is slow to read are coalesced into one event.

use std::convert::Infallible;

use async_stream::stream;
use axum::{
    extract::State,
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::Stream;
use tracing::debug;

use super::list::VIEW_UPDATED;
use crate::state::AppState;

/// GET /events
pub async fn stream_updates(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut views = state.sync().subscribe_view();
    views.mark_unchanged();

    let events = stream! {
        while views.changed().await.is_ok() {
            let version = views.borrow_and_update().version;
            yield Ok(Event::default().event(VIEW_UPDATED).data(version.to_string()));
        }
        debug!("View stream closed");
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}
