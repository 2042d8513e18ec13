//! Purchase dialog route handlers.
//!
//! The dialog is stateless on the server: each request rebuilds a
//! [`DialogState`] from the item and the submitted form and runs one
//! transition on it.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use shoplist_core::ItemId;

use super::list::{NoticeTemplate, error_notice, updated};
use crate::error::{AppError, add_breadcrumb};
use crate::services::{DialogState, OpenDialog, PurchaseForm};
use crate::state::AppState;

/// A market option of the selector.
#[derive(Clone)]
pub struct MarketOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Dialog display data.
#[derive(Clone)]
pub struct DialogView {
    pub item_id: String,
    pub item_name: String,
    pub hint: String,
    pub price: String,
    pub new_market: String,
    pub promo: bool,
    pub markets: Vec<MarketOption>,
    pub price_error: Option<String>,
    pub market_error: Option<String>,
    pub notice: Option<String>,
}

impl DialogView {
    fn new(dialog: &OpenDialog, hint: String) -> Self {
        Self {
            item_id: dialog.item_id.as_str().to_string(),
            item_name: dialog.item_name.display_name(),
            hint,
            price: dialog.form.price.clone(),
            new_market: dialog.form.new_market.clone(),
            promo: dialog.form.promo,
            markets: dialog
                .markets
                .iter()
                .map(|market| MarketOption {
                    value: market.name.as_str().to_string(),
                    label: market.name.display_name(),
                    selected: market.name.as_str() == dialog.form.market,
                })
                .collect(),
            price_error: dialog.errors.price.clone(),
            market_error: dialog.errors.market.clone(),
            notice: dialog.notice.clone(),
        }
    }
}

/// Purchase dialog fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/purchase_dialog.html")]
pub struct PurchaseDialogTemplate {
    pub dialog: DialogView,
}

/// Purchase form data. An unchecked checkbox is absent.
#[derive(Debug, Deserialize)]
pub struct PurchaseFormData {
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub new_market: String,
    pub promo: Option<String>,
}

impl From<PurchaseFormData> for PurchaseForm {
    fn from(data: PurchaseFormData) -> Self {
        Self {
            price: data.price,
            market: data.market,
            new_market: data.new_market,
            promo: data.promo.is_some(),
        }
    }
}

fn render(state: &AppState, dialog: &DialogState, status: StatusCode) -> Response {
    let Some(open) = dialog.dialog() else {
        return Html("").into_response();
    };
    let hint = state
        .sync()
        .best_price_hint(&open.item_name)
        .describe(state.currency());
    (
        status,
        PurchaseDialogTemplate {
            dialog: DialogView::new(open, hint),
        },
    )
        .into_response()
}

/// Open the dialog for an item, pre-filled from the price history.
#[instrument(skip(state))]
pub async fn open(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = ItemId::new(id);
    let item = match state.purchases().item(&id).await {
        Ok(item) => item,
        Err(e) => return error_notice(&AppError::from(e)),
    };
    let markets = match state.markets().list().await {
        Ok(markets) => markets,
        Err(e) => return error_notice(&AppError::from(e)),
    };

    let dialog = DialogState::open(&item, &state.sync().prices(), markets);
    render(&state, &dialog, StatusCode::OK)
}

/// Validate and confirm a purchase.
///
/// Invalid input re-renders the dialog with per-field errors (422). A store
/// failure re-renders it with a notice so the user can retry.
#[instrument(skip(state, form))]
pub async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<PurchaseFormData>,
) -> Response {
    let id = ItemId::new(id);
    let item = match state.purchases().item(&id).await {
        Ok(item) => item,
        Err(e) => return error_notice(&AppError::from(e)),
    };
    let markets = match state.markets().list().await {
        Ok(markets) => markets,
        Err(e) => return error_notice(&AppError::from(e)),
    };

    let mut dialog = DialogState::with_form(&item, form.into(), markets);
    let valid = match dialog.submit() {
        Ok(Some(valid)) => valid,
        Ok(None) => return render(&state, &dialog, StatusCode::UNPROCESSABLE_ENTITY),
        Err(e) => return error_notice(&AppError::BadRequest(e.to_string())),
    };

    match state.purchases().confirm(&item.id, &valid).await {
        Ok(receipt) => {
            dialog.succeed();
            add_breadcrumb(
                "purchase",
                "Purchase confirmed",
                Some(&[
                    ("product", receipt.product.as_str()),
                    ("market", receipt.purchase.market.as_str()),
                ]),
            );
            updated(Some(NoticeTemplate::info(receipt.notice(state.currency()))))
        }
        Err(e) => {
            let err = AppError::from(e);
            if err.status() == StatusCode::NOT_FOUND {
                return error_notice(&err);
            }
            tracing::error!(error = %err, "Purchase failed");
            dialog.fail(err.user_message());
            render(&state, &dialog, err.status())
        }
    }
}

/// Close the dialog.
pub async fn cancel() -> Html<&'static str> {
    Html("")
}
