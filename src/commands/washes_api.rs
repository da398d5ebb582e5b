//! Wash job endpoints: list, intake, admin status toggle and finalize.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use super::require;
use crate::app_state::{AppState, FinalizeOutcome};
use crate::auth;
use crate::error::Result;
use crate::jobs::WashIntake;
use crate::models::WashJob;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_washes).post(create_wash))
        .route("/:id/toggle", post(toggle_wash))
        .route("/:id/finalize", post(finalize_wash))
}

pub async fn list_washes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<WashJob>>> {
    require(&state, &headers, auth::VIEW_WASHES)?;
    let controller = state.controller.lock().await;
    Ok(Json(controller.washes().to_vec()))
}

pub async fn create_wash(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(intake): Json<WashIntake>,
) -> Result<Json<WashJob>> {
    let session = require(&state, &headers, auth::CREATE_WASH)?;
    info!(by = %session.display_name, "POST /api/washes");
    let mut controller = state.controller.lock().await;
    Ok(Json(controller.add_wash(intake).await?))
}

pub async fn toggle_wash(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<WashJob>> {
    require(&state, &headers, auth::TOGGLE_WASH)?;
    let mut controller = state.controller.lock().await;
    Ok(Json(controller.toggle_wash_status(&id).await?))
}

pub async fn finalize_wash(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FinalizeOutcome>> {
    require(&state, &headers, auth::FINALIZE_WASH)?;
    let mut controller = state.controller.lock().await;
    Ok(Json(controller.finalize_wash(&id).await?))
}

#[cfg(test)]
mod tests {
    use crate::commands::test_support::test_app;
    use axum::http::StatusCode;
    use serde_json::json;

    fn intake() -> serde_json::Value {
        json!({
            "clientName": "Ana Souza",
            "clientPhone": "(11) 98888-7777",
            "plate": "abc1d23",
            "type": "Completa",
            "vehicleType": "carro",
            "price": 60.0,
        })
    }

    #[tokio::test]
    async fn requires_a_session() {
        let app = test_app().await;
        let (status, _) = app.call("GET", "/api/washes", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = app.call("GET", "/api/washes", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn intake_then_finalize_credits_a_stamp() {
        let app = test_app().await;
        let sid = app.admin_session().await;

        let (status, job) = app.call("POST", "/api/washes", Some(&sid), Some(intake())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["status"], "PENDING");
        assert_eq!(job["plate"], "ABC1D23");
        assert_eq!(job["assignedStaff"], "Unassigned");

        let uri = format!("/api/washes/{}/finalize", job["id"].as_str().unwrap());
        let (status, outcome) = app.call("POST", &uri, Some(&sid), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["finalized"], true);
        assert_eq!(outcome["job"]["status"], "PAID");
        assert_eq!(outcome["progress"]["stamps"], 1);
        assert!(outcome["whatsappLink"].as_str().unwrap().starts_with("https://wa.me/"));

        let (_, again) = app.call("POST", &uri, Some(&sid), None).await;
        assert_eq!(again["finalized"], false);
        assert_eq!(again["progress"]["stamps"], 1);

        let (_, list) = app.call("GET", "/api/washes", Some(&sid), None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_price_is_a_field_error() {
        let app = test_app().await;
        let sid = app.admin_session().await;
        let mut body = intake();
        body.as_object_mut().unwrap().remove("price");
        let (status, err) = app.call("POST", "/api/washes", Some(&sid), Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["field"], "price");
        assert!(app.fake.rows("washes").is_empty());
    }

    #[tokio::test]
    async fn washer_cannot_toggle() {
        let app = test_app().await;
        let admin = app.admin_session().await;
        let (_, member) = app
            .call("POST", "/api/staff", Some(&admin), Some(json!({ "name": "Bia" })))
            .await;
        let (_, job) = app.call("POST", "/api/washes", Some(&admin), Some(intake())).await;
        let (_, washer) = app
            .call("POST", "/api/auth/staff", None, Some(json!({ "staffId": member["id"] })))
            .await;
        let washer_sid = washer["sessionId"].as_str().unwrap();

        let uri = format!("/api/washes/{}/toggle", job["id"].as_str().unwrap());
        let (status, _) = app.call("POST", &uri, Some(washer_sid), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.call("GET", "/api/washes", Some(washer_sid), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_wash_is_not_found() {
        let app = test_app().await;
        let sid = app.admin_session().await;
        let (status, _) = app
            .call("POST", "/api/washes/nope/toggle", Some(&sid), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
