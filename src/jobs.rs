//! Wash job intake and lifecycle.
//!
//! A job is created PENDING at intake and moves to PAID either through
//! [`finalize`] (the happy path, which credits loyalty in the controller) or
//! through [`toggle_status`], an admin correction tool that flips the status
//! both ways and never touches loyalty.

use serde::Deserialize;
use uuid::Uuid;

use crate::data_helpers::{parse_day, today};
use crate::error::{AppError, Result};
use crate::models::{VehicleType, WashJob, WashStatus};

pub const WALK_IN_CLIENT: &str = "Walk-in client";
pub const NO_PLATE: &str = "NO-PLATE";
pub const UNASSIGNED: &str = "Unassigned";

/// Intake form payload: a wash job without id or status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WashIntake {
    #[serde(default)]
    pub client_name: String,
    #[serde(default, alias = "phone")]
    pub client_phone: Option<String>,
    #[serde(default)]
    pub plate: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(rename = "type", alias = "washType", default)]
    pub service_type: String,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default)]
    pub assigned_staff: String,
    pub price: Option<f64>,
    #[serde(default)]
    pub services: Vec<String>,
    /// Defaults to today when omitted.
    #[serde(default)]
    pub date: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validate an intake payload and turn it into a fresh PENDING job.
///
/// Missing required fields block the action before anything is persisted.
pub fn validate_intake(intake: WashIntake) -> Result<WashJob> {
    let service_type = intake.service_type.trim().to_string();
    if service_type.is_empty() {
        return Err(AppError::validation("type", "Service type is required"));
    }

    let price = intake
        .price
        .ok_or_else(|| AppError::validation("price", "Price is required"))?;
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::validation(
            "price",
            "Price must be a non-negative amount",
        ));
    }

    let vehicle_type = intake
        .vehicle_type
        .ok_or_else(|| AppError::validation("vehicleType", "Vehicle type is required"))?;

    let date = match non_blank(intake.date.as_deref()) {
        Some(date) => {
            if parse_day(&date).is_none() {
                return Err(AppError::validation("date", "Date must be YYYY-MM-DD"));
            }
            date
        }
        None => today(),
    };

    let services: Vec<String> = intake
        .services
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    Ok(WashJob {
        id: Uuid::new_v4().to_string(),
        client_name: non_blank(Some(&intake.client_name))
            .unwrap_or_else(|| WALK_IN_CLIENT.to_string()),
        client_phone: non_blank(intake.client_phone.as_deref()),
        plate: non_blank(Some(&intake.plate))
            .map(|p| p.to_uppercase())
            .unwrap_or_else(|| NO_PLATE.to_string()),
        model: non_blank(intake.model.as_deref()),
        services: if services.is_empty() {
            vec![service_type.clone()]
        } else {
            services
        },
        service_type,
        status: WashStatus::Pending,
        assigned_staff: non_blank(Some(&intake.assigned_staff))
            .unwrap_or_else(|| UNASSIGNED.to_string()),
        price,
        vehicle_type,
        date,
    })
}

/// Mark the job paid. Returns `false` when it already was, in which case no
/// loyalty credit must follow.
pub fn finalize(job: &mut WashJob) -> bool {
    if job.status == WashStatus::Paid {
        return false;
    }
    job.status = WashStatus::Paid;
    true
}

/// Admin correction: flip PENDING and PAID.
pub fn toggle_status(job: &mut WashJob) {
    job.status = match job.status {
        WashStatus::Pending => WashStatus::Paid,
        WashStatus::Paid => WashStatus::Pending,
    };
}
