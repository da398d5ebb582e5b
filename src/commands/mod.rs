//! HTTP action surface.
//!
//! One JSON endpoint per controller action, nested under `/api`. The view
//! layer passes the session id from its login response in the
//! `x-session-id` header; each handler checks the permission its action
//! needs before touching the controller.

use axum::http::{HeaderMap, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::app_state::AppState;
use crate::auth::{self, Session};
use crate::error::Result;

pub mod auth_api;
pub mod finance_api;
pub mod loyalty_api;
pub mod staff_api;
pub mod system_api;
pub mod washes_api;

pub const SESSION_HEADER: &str = "x-session-id";

pub(crate) fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

/// Resolve the caller's session and check `permission`.
pub(crate) fn require(state: &AppState, headers: &HeaderMap, permission: &str) -> Result<Session> {
    auth::authorize(&state.auth, session_id(headers), permission)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);
    match origin.map(str::parse::<HeaderValue>) {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(e)) => {
            warn!(error = %e, "invalid CORS origin, allowing any origin");
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    }
}

/// Create the router with all routes configured.
pub fn create_router(state: AppState, cors_origin: Option<&str>) -> Router {
    let api_routes = Router::new()
        .merge(system_api::router())
        .nest("/auth", auth_api::router())
        .nest("/washes", washes_api::router())
        .nest("/staff", staff_api::router())
        .merge(finance_api::router())
        .nest("/loyalty", loyalty_api::router());

    Router::new()
        .nest("/api", api_routes)
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
