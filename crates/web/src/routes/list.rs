//! Shopping list route handlers.
//!
//! Mutations answer with an `HX-Trigger: view-updated` header and no body;
//! the page re-fetches the list fragment when the trigger (or the SSE
//! stream) fires.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use shoplist_core::{CurrencyCode, ItemId, ListOrder};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::live::LiveView;
use crate::services::AddOutcome;
use crate::state::AppState;

/// Header and event name used to refresh fragments.
pub const VIEW_UPDATED: &str = "view-updated";

/// A row of the list, ready for display.
#[derive(Clone)]
pub struct ListRowView {
    pub id: String,
    pub name: String,
    pub hint: String,
    pub has_history: bool,
}

/// The list panel.
#[derive(Clone)]
pub struct ListPanelView {
    pub rows: Vec<ListRowView>,
    pub order: &'static str,
    pub sync_error: Option<String>,
}

impl ListPanelView {
    #[must_use]
    pub fn new(view: &LiveView, currency: CurrencyCode) -> Self {
        Self {
            rows: view
                .list
                .iter()
                .map(|entry| ListRowView {
                    id: entry.id.as_str().to_string(),
                    name: entry.name.display_name(),
                    hint: entry.hint.describe(currency),
                    has_history: entry.hint.is_known(),
                })
                .collect(),
            order: view.order.as_str(),
            sync_error: view.sync_error.clone(),
        }
    }
}

/// List fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/list.html")]
pub struct ListTemplate {
    pub list: ListPanelView,
}

/// Inline notice fragment.
#[derive(Template, WebTemplate)]
#[template(path = "partials/notice.html")]
pub struct NoticeTemplate {
    pub kind: &'static str,
    pub message: String,
}

impl NoticeTemplate {
    #[must_use]
    pub const fn info(message: String) -> Self {
        Self {
            kind: "info",
            message,
        }
    }

    #[must_use]
    pub const fn error(message: String) -> Self {
        Self {
            kind: "error",
            message,
        }
    }
}

/// Render an error as a notice fragment with the error's status.
pub fn error_notice(err: &AppError) -> Response {
    if err.status().is_server_error() {
        let event_id = sentry::capture_error(err);
        tracing::error!(error = %err, sentry_event_id = %event_id, "Request error");
    }
    (err.status(), NoticeTemplate::error(err.user_message())).into_response()
}

/// A successful mutation: trigger a refresh, optionally with a notice.
pub fn updated(notice: Option<NoticeTemplate>) -> Response {
    let trigger = AppendHeaders([("HX-Trigger", VIEW_UPDATED)]);
    match notice {
        Some(notice) => (trigger, notice).into_response(),
        None => (trigger, StatusCode::NO_CONTENT).into_response(),
    }
}

/// Add item form data.
#[derive(Debug, Deserialize)]
pub struct AddItemForm {
    pub name: String,
}

/// Order form data.
#[derive(Debug, Deserialize)]
pub struct OrderForm {
    pub order: String,
}

/// List fragment.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>) -> impl IntoResponse {
    ListTemplate {
        list: ListPanelView::new(&state.sync().view(), state.currency()),
    }
}

/// Add an item (HTMX).
///
/// Duplicates answer 409 with a notice.
#[instrument(skip(state, form))]
pub async fn add(State(state): State<AppState>, Form(form): Form<AddItemForm>) -> Response {
    match state.list().add_item(&form.name).await {
        Ok(AddOutcome::Added { id, name }) => {
            add_breadcrumb(
                "list",
                "Item added",
                Some(&[("item", id.as_str()), ("name", name.as_str())]),
            );
            updated(None)
        }
        Ok(AddOutcome::Ignored) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_notice(&AppError::from(e)),
    }
}

/// Remove an item (HTMX).
#[instrument(skip(state))]
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = ItemId::new(id);
    match state.list().delete_item(&id).await {
        Ok(()) => {
            add_breadcrumb("list", "Item deleted", Some(&[("item", id.as_str())]));
            updated(None)
        }
        Err(e) => error_notice(&AppError::from(e)),
    }
}

/// Change the list ordering (HTMX).
///
/// Responds with the list fragment once the new subscription's first
/// snapshot has been derived.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an unknown order and
/// `AppError::Repository` if re-subscribing fails.
#[instrument(skip(state))]
pub async fn set_order(
    State(state): State<AppState>,
    Form(form): Form<OrderForm>,
) -> Result<impl IntoResponse> {
    let order: ListOrder = form.order.parse().map_err(AppError::BadRequest)?;
    state.list().set_order(order).await?;

    let view = state
        .sync()
        .wait_for(|view| view.order == order)
        .await
        .ok_or_else(|| AppError::Internal("sync engine stopped".to_string()))?;

    Ok((
        AppendHeaders([("HX-Trigger", VIEW_UPDATED)]),
        ListTemplate {
            list: ListPanelView::new(&view, state.currency()),
        },
    ))
}
