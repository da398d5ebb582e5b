//! Liveness, sync status and full-state endpoints. Health and status are
//! open to unauthenticated callers.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{debug, info};

use super::{require, session_id};
use crate::app_state::{AppData, AppState};
use crate::auth::{self, Session};
use crate::diagnostics::{self, AboutInfo};
use crate::error::Result;
use crate::gateway::SyncStatus;
use crate::models::UserRole;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/data", get(snapshot))
        .route("/refresh", post(refresh))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub about: AboutInfo,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        about: diagnostics::about_info(),
    })
}

/// What the view may know about its own session. Never carries the id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub role: UserRole,
    pub display_name: String,
    pub permissions: Vec<String>,
}

impl From<Session> for SessionInfo {
    fn from(session: Session) -> Self {
        Self {
            role: session.role,
            display_name: session.display_name,
            permissions: session.permissions,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub sync: SyncStatus,
    /// Present only when the caller's `x-session-id` is the live session.
    pub session: Option<SessionInfo>,
}

pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Json<StatusResponse> {
    debug!("GET /api/status");
    Json(StatusResponse {
        sync: state.gateway.status(),
        session: auth::session_for(&state.auth, session_id(&headers)).map(SessionInfo::from),
    })
}

/// Every collection the view renders, in one payload.
pub async fn snapshot(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<AppData>> {
    require(&state, &headers, auth::VIEW_FINANCE)?;
    let controller = state.controller.lock().await;
    Ok(Json(controller.data().clone()))
}

/// Reload everything from the remote store (or the cache when offline).
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<SyncStatus>> {
    require(&state, &headers, auth::VIEW_WASHES)?;
    info!("POST /api/refresh");
    let mut controller = state.controller.lock().await;
    controller.refresh().await?;
    Ok(Json(state.gateway.status()))
}
