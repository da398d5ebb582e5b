//! Staff rotation queue ("lista da vez").
//!
//! Rotation order is ascending `queue_position`; positions are not kept
//! contiguous and may go negative after repeated send-to-front. Ties are
//! broken by id so the order is deterministic.
//!
//! Operations on an unknown staff id are no-ops and return `None`.

use std::cmp::Ordering;

use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::StaffMember;

/// Daily rate given to new members when the form leaves it out.
pub const DEFAULT_DAILY_RATE: f64 = 45.0;
pub const DEFAULT_ROLE: &str = "Lavador";

/// Which rotation change the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueueAction {
    /// Send to front.
    Top,
    /// Send to back.
    Bottom,
    Toggle,
}

fn rotation_order(a: &StaffMember, b: &StaffMember) -> Ordering {
    a.queue_position
        .cmp(&b.queue_position)
        .then_with(|| a.id.cmp(&b.id))
}

/// Roster sorted for display and iteration.
pub fn sorted_roster(roster: &[StaffMember]) -> Vec<StaffMember> {
    let mut sorted = roster.to_vec();
    sorted.sort_by(rotation_order);
    sorted
}

/// Active members only, in rotation order. Inactive members keep their
/// position but are hidden from rotation and from intake assignment.
pub fn active_rotation(roster: &[StaffMember]) -> Vec<StaffMember> {
    let mut active: Vec<StaffMember> = roster.iter().filter(|s| s.is_active).cloned().collect();
    active.sort_by(rotation_order);
    active
}

/// Whose turn it is: the first active member in rotation order.
pub fn next_in_line(roster: &[StaffMember]) -> Option<&StaffMember> {
    roster
        .iter()
        .filter(|s| s.is_active)
        .min_by(|a, b| rotation_order(a, b))
}

/// Position one past the current maximum (1 for an empty roster).
pub fn next_position(roster: &[StaffMember]) -> i64 {
    roster.iter().map(|s| s.queue_position).max().unwrap_or(0) + 1
}

/// Position one ahead of the current minimum.
fn front_position(roster: &[StaffMember]) -> i64 {
    roster.iter().map(|s| s.queue_position).min().unwrap_or(0) - 1
}

/// Move a member to the end of the rotation. Returns the updated record.
pub fn send_to_back(roster: &mut [StaffMember], staff_id: &str) -> Option<StaffMember> {
    let position = next_position(roster);
    let member = roster.iter_mut().find(|s| s.id == staff_id)?;
    member.queue_position = position;
    debug!(staff_id, position, "staff sent to back of queue");
    Some(member.clone())
}

/// Move a member strictly ahead of the current minimum.
pub fn send_to_front(roster: &mut [StaffMember], staff_id: &str) -> Option<StaffMember> {
    let position = front_position(roster);
    let member = roster.iter_mut().find(|s| s.id == staff_id)?;
    member.queue_position = position;
    debug!(staff_id, position, "staff sent to front of queue");
    Some(member.clone())
}

/// Flip the active flag; the queue position is retained.
pub fn toggle_active(roster: &mut [StaffMember], staff_id: &str) -> Option<StaffMember> {
    let member = roster.iter_mut().find(|s| s.id == staff_id)?;
    member.is_active = !member.is_active;
    debug!(staff_id, is_active = member.is_active, "staff active flag toggled");
    Some(member.clone())
}

pub fn apply(roster: &mut [StaffMember], staff_id: &str, action: QueueAction) -> Option<StaffMember> {
    match action {
        QueueAction::Top => send_to_front(roster, staff_id),
        QueueAction::Bottom => send_to_back(roster, staff_id),
        QueueAction::Toggle => toggle_active(roster, staff_id),
    }
}

/// A new job was assigned to `assigned_name`: if it names a roster member,
/// that member goes to the back of the line.
pub fn assign_next_job(roster: &mut [StaffMember], assigned_name: &str) -> Option<StaffMember> {
    let id = roster
        .iter()
        .find(|s| s.name == assigned_name)
        .map(|s| s.id.clone())?;
    send_to_back(roster, &id)
}

/// New roster entry as submitted by the staff form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub daily_rate: Option<f64>,
}

/// Build an active member placed at the back of the rotation.
pub fn new_member(draft: StaffDraft, roster: &[StaffMember]) -> Result<StaffMember> {
    let name = draft.name.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        return Err(AppError::validation("name", "Name is required"));
    }
    let daily_rate = draft.daily_rate.unwrap_or(DEFAULT_DAILY_RATE);
    if !daily_rate.is_finite() || daily_rate < 0.0 {
        return Err(AppError::validation(
            "dailyRate",
            "Daily rate must be a non-negative amount",
        ));
    }
    Ok(StaffMember {
        id: Uuid::new_v4().to_string(),
        name,
        role: draft
            .role
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        photo: draft.photo.filter(|p| !p.trim().is_empty()),
        queue_position: next_position(roster),
        daily_rate,
        commission: 0.0,
        unpaid: 0.0,
        days_worked: 0,
        is_active: true,
    })
}
