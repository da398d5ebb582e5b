//! Stamp-card loyalty accrual.
//!
//! Each client accumulates one stamp per finalized wash. The count runs
//! `1, 2, ..., stamps_required` and only wraps back to 1 on the completion
//! *after* the cap, so the reward wash itself still shows the full card.
//!
//! Clients are keyed by [`client_key`]; every code path goes through it so a
//! single client never ends up split across two progress records.

use reqwest::Url;
use tracing::debug;

use crate::data_helpers::normalize_phone;
use crate::error::{AppError, Result};
use crate::models::{ClientProgress, LoyaltyConfig, WashJob};

/// Country calling code prefixed to WhatsApp links.
const WHATSAPP_COUNTRY_CODE: &str = "55";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Canonical client identity: phone digits when the phone has any,
/// otherwise the name trimmed, whitespace-collapsed and lowercased.
/// Returns `None` when neither yields anything usable.
pub fn client_key(phone: Option<&str>, name: &str) -> Option<String> {
    if let Some(digits) = phone.map(normalize_phone).filter(|d| !d.is_empty()) {
        return Some(digits);
    }
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

pub fn client_key_for_job(job: &WashJob) -> Option<String> {
    client_key(job.client_phone.as_deref(), &job.client_name)
}

// ---------------------------------------------------------------------------
// Accrual
// ---------------------------------------------------------------------------

/// Stamp count after one more completion. A capacity below 1 is treated as 1.
pub fn next_stamp_count(current: i64, stamps_required: i64) -> i64 {
    let next = current.max(0) + 1;
    if next > stamps_required.max(1) {
        1
    } else {
        next
    }
}

/// Apply one completed wash to a client's progress.
///
/// Returns `None` when the program is inactive; no progress record is
/// created or touched in that case.
pub fn record_completion(
    existing: Option<&ClientProgress>,
    client_key: &str,
    phone: Option<&str>,
    wash_date: &str,
    config: &LoyaltyConfig,
) -> Option<ClientProgress> {
    if !config.is_active {
        return None;
    }

    let current = existing.map(|p| p.stamps).unwrap_or(0);
    let stamps = next_stamp_count(current, config.stamps_required);
    let phone = phone
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .or_else(|| existing.map(|p| p.phone.clone()))
        .unwrap_or_default();

    debug!(client_key, from = current, to = stamps, "loyalty stamp recorded");

    Some(ClientProgress {
        client_key: client_key.to_string(),
        stamps,
        last_wash_date: wash_date.to_string(),
        phone,
    })
}

/// Settings form check before the singleton is replaced.
pub fn validate_config(config: &LoyaltyConfig) -> Result<()> {
    if config.stamps_required < 1 {
        return Err(AppError::validation(
            "stampsRequired",
            "At least one stamp is required",
        ));
    }
    if config.company_name.trim().is_empty() {
        return Err(AppError::validation("companyName", "Company name is required"));
    }
    if config.reward_description.trim().is_empty() {
        return Err(AppError::validation(
            "rewardDescription",
            "Reward description is required",
        ));
    }
    Ok(())
}

/// The card is full: the operator may grant the reward on this visit.
pub fn is_reward_due(progress: &ClientProgress, config: &LoyaltyConfig) -> bool {
    progress.stamps >= config.stamps_required.max(1)
}

// ---------------------------------------------------------------------------
// Presentation helpers
// ---------------------------------------------------------------------------

/// `■■■□□□□□□□` style card.
pub fn stamp_progress_bar(stamps: i64, stamps_required: i64) -> String {
    let required = stamps_required.max(1) as usize;
    let filled = (stamps.max(0) as usize).min(required);
    format!("{}{}", "■".repeat(filled), "□".repeat(required - filled))
}

/// Message sent to the client once the wash is ready.
pub fn completion_message(
    job: &WashJob,
    progress: Option<&ClientProgress>,
    config: &LoyaltyConfig,
) -> String {
    let stamps = progress.map(|p| p.stamps).unwrap_or(0);
    let vehicle = match job.model.as_deref().filter(|m| !m.trim().is_empty()) {
        Some(model) => format!("{model} ({})", job.plate),
        None => job.plate.clone(),
    };
    format!(
        "Hello {}!\n\nYour {} is ready at *{}*.\n\n\
         *LOYALTY:* you earned +1 stamp!\n\
         *PROGRESS:* [{}] {}/{}\n\
         *REWARD:* {}\n\nThank you for choosing us!",
        job.client_name,
        vehicle,
        config.company_name,
        stamp_progress_bar(stamps, config.stamps_required),
        stamps,
        config.stamps_required,
        config.reward_description,
    )
}

/// `wa.me` deep link carrying `message`, or `None` when the job has no phone.
pub fn whatsapp_link(job: &WashJob, message: &str) -> Option<String> {
    let digits = job
        .client_phone
        .as_deref()
        .map(normalize_phone)
        .filter(|d| !d.is_empty())?;
    let base = format!("https://wa.me/{WHATSAPP_COUNTRY_CODE}{digits}");
    Url::parse_with_params(&base, &[("text", message)])
        .ok()
        .map(String::from)
}

/// Look up a client by key substring (case-insensitive) or phone substring.
pub fn find_client<'a, I>(progress: I, query: &str) -> Option<&'a ClientProgress>
where
    I: IntoIterator<Item = &'a ClientProgress>,
{
    let needle = query.trim();
    if needle.is_empty() {
        return None;
    }
    let lower = needle.to_lowercase();
    progress.into_iter().find(|p| {
        p.client_key.to_lowercase().contains(&lower)
            || (!p.phone.is_empty() && p.phone.contains(needle))
    })
}
