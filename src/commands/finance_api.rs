//! Expense ledger, period summary and dashboard endpoints.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use super::require;
use crate::app_state::AppState;
use crate::auth;
use crate::error::Result;
use crate::finance::{DashboardSummary, ExpenseDraft, PeriodSummary};
use crate::models::Expense;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/finance", get(period_summary))
        .route("/dashboard", get(dashboard))
}

pub async fn list_expenses(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Expense>>> {
    require(&state, &headers, auth::MANAGE_EXPENSES)?;
    let controller = state.controller.lock().await;
    Ok(Json(controller.expenses().to_vec()))
}

pub async fn create_expense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<ExpenseDraft>,
) -> Result<Json<Expense>> {
    require(&state, &headers, auth::MANAGE_EXPENSES)?;
    info!(category = %draft.category, "POST /api/expenses");
    let mut controller = state.controller.lock().await;
    Ok(Json(controller.add_expense(draft).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

pub async fn period_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<PeriodSummary>> {
    require(&state, &headers, auth::VIEW_FINANCE)?;
    let controller = state.controller.lock().await;
    let summary = controller.period_summary(query.start.as_deref(), query.end.as_deref())?;
    Ok(Json(summary))
}

pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DashboardSummary>> {
    require(&state, &headers, auth::VIEW_FINANCE)?;
    let controller = state.controller.lock().await;
    Ok(Json(controller.dashboard()))
}
