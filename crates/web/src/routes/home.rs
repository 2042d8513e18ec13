//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use super::history::HistoryRowView;
use super::list::ListPanelView;
use crate::state::AppState;

/// Home page template: add form, live list, history panel.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub list: ListPanelView,
    pub rows: Vec<HistoryRowView>,
    pub currency: &'static str,
}

/// Display the home page.
#[instrument(skip(state))]
pub async fn home(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.sync().view();
    let currency = state.currency();

    HomeTemplate {
        list: ListPanelView::new(&view, currency),
        rows: HistoryRowView::rows(&view, currency),
        currency: currency.code(),
    }
}
