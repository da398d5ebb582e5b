//! Roster, rotation and payroll endpoints. Admin only.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, info};

use super::require;
use crate::app_state::{AppState, Payout};
use crate::auth;
use crate::error::Result;
use crate::finance::EarningsUpdate;
use crate::models::StaffMember;
use crate::queue::{QueueAction, StaffDraft};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_staff).post(create_staff))
        .route("/:id/queue", post(update_queue))
        .route("/:id/earnings", put(update_earnings))
        .route("/:id/pay", post(pay_staff))
}

/// Roster in rotation order.
pub async fn list_staff(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<StaffMember>>> {
    require(&state, &headers, auth::MANAGE_STAFF)?;
    let controller = state.controller.lock().await;
    Ok(Json(controller.roster()))
}

pub async fn create_staff(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<StaffDraft>,
) -> Result<Json<StaffMember>> {
    require(&state, &headers, auth::MANAGE_STAFF)?;
    info!(name = %draft.name, "POST /api/staff");
    let mut controller = state.controller.lock().await;
    Ok(Json(controller.add_staff(draft).await?))
}

#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub action: QueueAction,
}

/// Returns the updated member, or `null` when the id is not on the roster.
pub async fn update_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<QueueRequest>,
) -> Result<Json<Option<StaffMember>>> {
    require(&state, &headers, auth::MANAGE_STAFF)?;
    let mut controller = state.controller.lock().await;
    let updated = controller.update_staff_queue(&id, request.action).await?;
    if updated.is_none() {
        debug!(staff_id = %id, "queue action for unknown staff ignored");
    }
    Ok(Json(updated))
}

pub async fn update_earnings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<EarningsUpdate>,
) -> Result<Json<StaffMember>> {
    require(&state, &headers, auth::MANAGE_STAFF)?;
    let mut controller = state.controller.lock().await;
    Ok(Json(controller.update_earnings(&id, update).await?))
}

pub async fn pay_staff(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Payout>> {
    require(&state, &headers, auth::MANAGE_STAFF)?;
    let mut controller = state.controller.lock().await;
    Ok(Json(controller.pay_staff(&id).await?))
}

#[cfg(test)]
mod tests {
    use crate::commands::test_support::{test_app, TestApp};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    async fn add(app: &TestApp, sid: &str, name: &str) -> Value {
        let (status, member) = app
            .call("POST", "/api/staff", Some(sid), Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::OK);
        member
    }

    fn names(roster: &Value) -> Vec<String> {
        roster
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn send_to_front_reorders_roster() {
        let app = test_app().await;
        let sid = app.admin_session().await;
        add(&app, &sid, "Ana").await;
        add(&app, &sid, "Bruno").await;
        let caio = add(&app, &sid, "Caio").await;

        let uri = format!("/api/staff/{}/queue", caio["id"].as_str().unwrap());
        let (status, updated) = app
            .call("POST", &uri, Some(&sid), Some(json!({ "action": "TOP" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Caio");

        let (_, roster) = app.call("GET", "/api/staff", Some(&sid), None).await;
        assert_eq!(names(&roster)[0], "Caio");
    }

    #[tokio::test]
    async fn unknown_staff_queue_action_is_null() {
        let app = test_app().await;
        let sid = app.admin_session().await;
        let (status, body) = app
            .call(
                "POST",
                "/api/staff/ghost/queue",
                Some(&sid),
                Some(json!({ "action": "BOTTOM" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn earnings_then_payout() {
        let app = test_app().await;
        let sid = app.admin_session().await;
        let member = add(&app, &sid, "Dora").await;
        let id = member["id"].as_str().unwrap();

        let (status, updated) = app
            .call(
                "PUT",
                &format!("/api/staff/{id}/earnings"),
                Some(&sid),
                Some(json!({ "daysWorked": 4, "dailyRate": 50.0, "commission": 20.0 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["unpaid"], 220.0);

        let (status, payout) = app
            .call("POST", &format!("/api/staff/{id}/pay"), Some(&sid), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payout["amount"], 220.0);
        assert_eq!(payout["member"]["unpaid"], 0.0);
    }

    #[tokio::test]
    async fn negative_days_are_rejected() {
        let app = test_app().await;
        let sid = app.admin_session().await;
        let member = add(&app, &sid, "Edu").await;
        let (status, err) = app
            .call(
                "PUT",
                &format!("/api/staff/{}/earnings", member["id"].as_str().unwrap()),
                Some(&sid),
                Some(json!({ "daysWorked": -1, "dailyRate": 50.0 })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["field"], "daysWorked");
    }
}
