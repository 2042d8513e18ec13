//! History panel route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use shoplist_core::{BestPrice, CurrencyCode, ProductId};

use super::list::{VIEW_UPDATED, error_notice, updated};
use crate::db::ProductRepository;
use crate::error::{AppError, add_breadcrumb};
use crate::live::LiveView;
use crate::services::AddOutcome;
use crate::state::AppState;

/// A history toggle, ready for display.
#[derive(Clone)]
pub struct HistoryRowView {
    pub id: String,
    /// Normalized name, posted back on re-add.
    pub key: String,
    pub name: String,
    pub regular: Option<String>,
    pub promo: Option<String>,
    pub enabled: bool,
}

impl HistoryRowView {
    #[must_use]
    pub fn rows(view: &LiveView, currency: CurrencyCode) -> Vec<Self> {
        view.history
            .iter()
            .map(|entry| Self {
                id: entry.id.as_str().to_string(),
                key: entry.name.as_str().to_string(),
                name: entry.name.display_name(),
                regular: entry.regular.as_ref().map(|best| describe(best, currency)),
                promo: entry.promo.as_ref().map(|best| describe(best, currency)),
                enabled: entry.enabled,
            })
            .collect()
    }
}

fn describe(best: &BestPrice, currency: CurrencyCode) -> String {
    format!(
        "{} at {}",
        best.price.display(currency),
        best.market.display_name()
    )
}

/// History fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/history.html")]
pub struct HistoryTemplate {
    pub rows: Vec<HistoryRowView>,
}

/// Re-add form data.
#[derive(Debug, Deserialize)]
pub struct ReAddForm {
    pub name: String,
}

/// History panel fragment.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>) -> impl IntoResponse {
    HistoryTemplate {
        rows: HistoryRowView::rows(&state.sync().view(), state.currency()),
    }
}

/// Put a product back on the list (HTMX).
///
/// Repeated clicks while the first add is in flight are ignored.
#[instrument(skip(state, form))]
pub async fn re_add(State(state): State<AppState>, Form(form): Form<ReAddForm>) -> Response {
    match state.list().re_add_from_history(&form.name).await {
        Ok(AddOutcome::Added { id, name }) => {
            add_breadcrumb(
                "history",
                "Item re-added",
                Some(&[("item", id.as_str()), ("name", name.as_str())]),
            );
            updated(None)
        }
        Ok(AddOutcome::Ignored) => updated(None),
        Err(e) => {
            // the claim was released; refresh so the toggle is enabled again
            let mut response = error_notice(&AppError::from(e));
            response
                .headers_mut()
                .insert("hx-trigger", HeaderValue::from_static(VIEW_UPDATED));
            response
        }
    }
}

/// Remove a product from the history (HTMX).
#[instrument(skip(state))]
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = ProductId::new(id);
    match ProductRepository::new(state.store().as_ref()).delete(&id).await {
        Ok(()) => {
            add_breadcrumb("history", "Product deleted", Some(&[("product", id.as_str())]));
            updated(None)
        }
        Err(e) => error_notice(&AppError::from(e)),
    }
}
