//! Loyalty program settings and client stamp cards.

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
use crate::models::{ClientProgress, LoyaltyConfig};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_loyalty).put(save_loyalty))
        .route("/clients", get(clients))
}

pub async fn get_loyalty(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LoyaltyConfig>> {
    require(&state, &headers, auth::MANAGE_LOYALTY)?;
    let controller = state.controller.lock().await;
    Ok(Json(controller.loyalty().clone()))
}

pub async fn save_loyalty(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(config): Json<LoyaltyConfig>,
) -> Result<Json<LoyaltyConfig>> {
    require(&state, &headers, auth::MANAGE_LOYALTY)?;
    info!("PUT /api/loyalty");
    let mut controller = state.controller.lock().await;
    Ok(Json(controller.save_loyalty(config).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientQuery {
    pub q: Option<String>,
}

/// All stamp cards, or the single card matching `q` (name or phone).
pub async fn clients(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ClientQuery>,
) -> Result<Json<Vec<ClientProgress>>> {
    require(&state, &headers, auth::MANAGE_LOYALTY)?;
    let controller = state.controller.lock().await;
    let cards = match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => controller.find_client(q).cloned().into_iter().collect(),
        None => controller.client_progress().to_vec(),
    };
    Ok(Json(cards))
}
