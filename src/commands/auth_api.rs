//! Sign-in endpoints.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app_state::AppState;
use crate::auth::{self, Session};
use crate::error::{AppError, Result};
use crate::queue;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin", post(login_admin))
        .route("/staff", get(login_roster).post(login_staff))
        .route("/logout", post(logout))
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub pin: String,
}

pub async fn login_admin(
    State(state): State<AppState>,
    Json(request): Json<AdminLoginRequest>,
) -> Result<Json<Session>> {
    info!("POST /api/auth/admin");
    let db = state.gateway.cache().clone();
    let sessions = state.auth.clone();
    // bcrypt verification is CPU bound.
    let session = tokio::task::spawn_blocking(move || {
        auth::login_admin(&request.pin, &db, &sessions)
    })
    .await
    .map_err(|e| AppError::Unexpected(format!("login task failed: {e}")))??;
    Ok(Json(session))
}

/// Entry shown on the washer sign-in picker.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub role: String,
    pub photo: Option<String>,
}

/// Active members in rotation order, for the sign-in picker.
pub async fn login_roster(State(state): State<AppState>) -> Json<Vec<RosterEntry>> {
    let controller = state.controller.lock().await;
    let entries = queue::active_rotation(&controller.data().staff)
        .into_iter()
        .map(|m| RosterEntry {
            id: m.id,
            name: m.name,
            role: m.role,
            photo: m.photo,
        })
        .collect();
    Json(entries)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffLoginRequest {
    pub staff_id: String,
}

pub async fn login_staff(
    State(state): State<AppState>,
    Json(request): Json<StaffLoginRequest>,
) -> Result<Json<Session>> {
    info!(staff_id = %request.staff_id, "POST /api/auth/staff");
    let controller = state.controller.lock().await;
    let member = controller
        .staff_member(&request.staff_id)
        .ok_or_else(|| AppError::NotFound(format!("Staff member {}", request.staff_id)))?;
    Ok(Json(auth::login_washer(member, &state.auth)))
}

pub async fn logout(State(state): State<AppState>) -> Json<serde_json::Value> {
    auth::logout(&state.auth);
    Json(serde_json::json!({ "success": true }))
}
