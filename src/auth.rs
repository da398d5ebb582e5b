//! Local authentication: admin PIN (bcrypt) and washer sign-in.
//!
//! The admin PIN hash lives in the SQLite `local_settings` table (category
//! "staff", key "admin_pin_hash"), together with the failed-attempt counter
//! so a lockout survives restarts. A washer signs in by picking their roster
//! entry. One session per device: a new login replaces the previous one.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, Result};
use crate::models::{StaffMember, UserRole};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const SESSION_INACTIVITY_MINUTES: i64 = 30;
const SESSION_MAX_DURATION_HOURS: i64 = 12;
const SETTINGS_CATEGORY: &str = "staff";
const ADMIN_PIN_HASH_KEY: &str = "admin_pin_hash";
const LOCKOUT_ATTEMPTS_KEY: &str = "lockout_attempts";
const LOCKOUT_LAST_ATTEMPT_KEY: &str = "lockout_last_attempt";

pub const VIEW_WASHES: &str = "view_washes";
pub const CREATE_WASH: &str = "create_wash";
pub const FINALIZE_WASH: &str = "finalize_wash";
pub const TOGGLE_WASH: &str = "toggle_wash";
pub const MANAGE_STAFF: &str = "manage_staff";
pub const MANAGE_EXPENSES: &str = "manage_expenses";
pub const VIEW_FINANCE: &str = "view_finance";
pub const MANAGE_LOYALTY: &str = "manage_loyalty";

const ADMIN_PERMISSIONS: &[&str] = &[
    VIEW_WASHES,
    CREATE_WASH,
    FINALIZE_WASH,
    TOGGLE_WASH,
    MANAGE_STAFF,
    MANAGE_EXPENSES,
    VIEW_FINANCE,
    MANAGE_LOYALTY,
];

/// Washers see the yard: the job list, intake and finalize.
const WASHER_PERMISSIONS: &[&str] = &[VIEW_WASHES, CREATE_WASH, FINALIZE_WASH];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub role: UserRole,
    pub staff_id: Option<String>,
    pub display_name: String,
    pub permissions: Vec<String>,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self) -> bool {
        let now = Utc::now();
        now >= self.expires_at
            || now - self.last_activity > Duration::minutes(SESSION_INACTIVITY_MINUTES)
    }

    pub fn can(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

struct LockoutEntry {
    attempts: u32,
    last_attempt: DateTime<Utc>,
}

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<String, Session>,
    current: Option<String>,
}

/// Live sessions and the id of the device's current one, behind one lock.
pub struct AuthState {
    table: Mutex<SessionTable>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(SessionTable::default()),
        }
    }

    fn table(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Lockout
// ---------------------------------------------------------------------------

fn check_lockout(lockout: &LockoutEntry) -> Result<()> {
    if lockout.attempts >= MAX_FAILED_ATTEMPTS {
        let elapsed = Utc::now() - lockout.last_attempt;
        if elapsed < Duration::minutes(LOCKOUT_MINUTES) {
            return Err(AppError::LockedOut(LOCKOUT_MINUTES - elapsed.num_minutes()));
        }
    }
    Ok(())
}

fn load_lockout(conn: &rusqlite::Connection) -> LockoutEntry {
    let attempts = db::get_setting(conn, SETTINGS_CATEGORY, LOCKOUT_ATTEMPTS_KEY)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let last_attempt = db::get_setting(conn, SETTINGS_CATEGORY, LOCKOUT_LAST_ATTEMPT_KEY)
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    LockoutEntry {
        attempts,
        last_attempt,
    }
}

fn persist_lockout(conn: &rusqlite::Connection, lockout: &LockoutEntry) -> Result<()> {
    db::set_setting(
        conn,
        SETTINGS_CATEGORY,
        LOCKOUT_ATTEMPTS_KEY,
        &lockout.attempts.to_string(),
    )?;
    db::set_setting(
        conn,
        SETTINGS_CATEGORY,
        LOCKOUT_LAST_ATTEMPT_KEY,
        &lockout.last_attempt.to_rfc3339(),
    )
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

fn create_session(
    auth: &AuthState,
    role: UserRole,
    staff_id: Option<String>,
    display_name: String,
) -> Session {
    let now = Utc::now();
    let permissions = match role {
        UserRole::Admin => ADMIN_PERMISSIONS,
        UserRole::Washer => WASHER_PERMISSIONS,
    };
    let session = Session {
        session_id: Uuid::new_v4().to_string(),
        role,
        staff_id,
        display_name,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        login_time: now,
        last_activity: now,
        expires_at: now + Duration::hours(SESSION_MAX_DURATION_HOURS),
    };

    let mut table = auth.table();
    if let Some(previous) = table.current.take() {
        table.sessions.remove(&previous);
    }
    table
        .sessions
        .insert(session.session_id.clone(), session.clone());
    table.current = Some(session.session_id.clone());
    session
}

/// Verify the admin PIN and open an admin session.
pub fn login_admin(pin: &str, db: &db::DbState, auth: &AuthState) -> Result<Session> {
    if pin.trim().is_empty() {
        return Err(AppError::validation("pin", "PIN is required"));
    }

    let conn = db.lock()?;
    let mut lockout = load_lockout(&conn);
    check_lockout(&lockout)?;

    let hash = db::get_setting(&conn, SETTINGS_CATEGORY, ADMIN_PIN_HASH_KEY)
        .ok_or_else(|| AppError::Unauthorized("Admin PIN is not configured".into()))?;

    if bcrypt::verify(pin.trim(), &hash).unwrap_or(false) {
        lockout.attempts = 0;
        lockout.last_attempt = Utc::now();
        persist_lockout(&conn, &lockout)?;
        info!("admin login successful");
        return Ok(create_session(
            auth,
            UserRole::Admin,
            None,
            "Administrator".into(),
        ));
    }

    lockout.attempts += 1;
    lockout.last_attempt = Utc::now();
    persist_lockout(&conn, &lockout)?;
    warn!(attempts = lockout.attempts, "failed admin login attempt");
    Err(AppError::Unauthorized("Invalid PIN".into()))
}

/// Open a washer session for the chosen roster entry.
pub fn login_washer(member: &StaffMember, auth: &AuthState) -> Session {
    info!(staff_id = %member.id, "washer login");
    create_session(
        auth,
        UserRole::Washer,
        Some(member.id.clone()),
        member.name.clone(),
    )
}

pub fn logout(auth: &AuthState) {
    let mut table = auth.table();
    if let Some(sid) = table.current.take() {
        table.sessions.remove(&sid);
        info!(session_id = %sid, "session logged out");
    }
}

fn live_session(table: &mut SessionTable) -> Option<Session> {
    let sid = table.current.clone()?;
    match table.sessions.get(&sid) {
        Some(session) if !session.is_expired() => Some(session.clone()),
        _ => {
            table.sessions.remove(&sid);
            table.current = None;
            None
        }
    }
}

/// The live session, if any. Expired sessions are dropped.
pub fn current_session(auth: &AuthState) -> Option<Session> {
    live_session(&mut auth.table())
}

/// The live session when `session_id` names it. Does not refresh activity.
pub fn session_for(auth: &AuthState, session_id: Option<&str>) -> Option<Session> {
    let sid = session_id.map(str::trim).filter(|s| !s.is_empty())?;
    current_session(auth).filter(|s| s.session_id == sid)
}

/// Check that `session_id` is the live session and holds `permission`;
/// refreshes the inactivity timer on success.
pub fn authorize(auth: &AuthState, session_id: Option<&str>, permission: &str) -> Result<Session> {
    let sid = session_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Login required".into()))?;

    let mut table = auth.table();
    let session = live_session(&mut table)
        .filter(|s| s.session_id == sid)
        .ok_or_else(|| AppError::Unauthorized("Session expired or not found".into()))?;

    if !session.can(permission) {
        warn!(session_id = %sid, permission, "permission denied");
        return Err(AppError::Forbidden(format!(
            "Permission required: {permission}"
        )));
    }

    if let Some(stored) = table.sessions.get_mut(sid) {
        stored.last_activity = Utc::now();
    }
    Ok(session)
}

// ---------------------------------------------------------------------------
// PIN setup
// ---------------------------------------------------------------------------

fn validate_pin(pin: &str) -> Result<()> {
    if pin.len() < 4 {
        return Err(AppError::validation("pin", "PIN must be at least 4 digits"));
    }
    if !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("pin", "PIN must contain only digits"));
    }
    Ok(())
}

/// Validate, hash and store the admin PIN.
pub fn set_admin_pin(db: &db::DbState, pin: &str, cost: u32) -> Result<()> {
    let pin = pin.trim();
    validate_pin(pin)?;
    let hash = bcrypt::hash(pin, cost)
        .map_err(|e| AppError::Unexpected(format!("Failed to hash admin PIN: {e}")))?;
    let conn = db.lock()?;
    db::set_setting(&conn, SETTINGS_CATEGORY, ADMIN_PIN_HASH_KEY, &hash)?;
    info!("admin PIN set");
    Ok(())
}

pub fn has_admin_pin(db: &db::DbState) -> Result<bool> {
    let conn = db.lock()?;
    Ok(db::get_setting(&conn, SETTINGS_CATEGORY, ADMIN_PIN_HASH_KEY).is_some())
}

/// Startup provisioning: store the configured PIN when no hash exists yet.
pub fn provision_admin_pin(db: &db::DbState, configured: Option<&str>) -> Result<()> {
    if has_admin_pin(db)? {
        return Ok(());
    }
    match configured {
        Some(pin) => set_admin_pin(db, pin, bcrypt::DEFAULT_COST),
        None => {
            warn!("no admin PIN configured; admin login is disabled until CARWASH_ADMIN_PIN is set");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db_state() -> db::DbState {
        db::init_in_memory().expect("in-memory db")
    }

    fn with_admin_pin(pin: &str) -> db::DbState {
        let db_state = test_db_state();
        set_admin_pin(&db_state, pin, 4).expect("store admin pin");
        db_state
    }

    fn lockout_attempts(db_state: &db::DbState) -> u32 {
        let conn = db_state.lock().expect("db lock");
        db::get_setting(&conn, SETTINGS_CATEGORY, LOCKOUT_ATTEMPTS_KEY)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    }

    fn member() -> StaffMember {
        StaffMember {
            id: "s1".into(),
            name: "Maria".into(),
            role: "Lavador".into(),
            photo: None,
            queue_position: 1,
            daily_rate: 45.0,
            commission: 0.0,
            unpaid: 0.0,
            days_worked: 0,
            is_active: true,
        }
    }

    #[test]
    fn lockout_persists_across_auth_state_restart() {
        let db_state = with_admin_pin("1234");
        let auth_before_restart = AuthState::new();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let err = login_admin("9999", &db_state, &auth_before_restart)
                .expect_err("invalid login should fail");
            assert!(matches!(err, AppError::Unauthorized(_)));
        }
        assert_eq!(lockout_attempts(&db_state), MAX_FAILED_ATTEMPTS);

        let auth_after_restart = AuthState::new();
        let err = login_admin("1234", &db_state, &auth_after_restart)
            .expect_err("lockout should remain active after restart");
        assert!(matches!(err, AppError::LockedOut(_)), "unexpected: {err}");
        assert_eq!(lockout_attempts(&db_state), MAX_FAILED_ATTEMPTS);
    }

    #[test]
    fn successful_login_resets_lockout() {
        let db_state = with_admin_pin("1234");
        let auth = AuthState::new();
        for _ in 0..2 {
            login_admin("0000", &db_state, &auth).expect_err("wrong pin");
        }
        assert_eq!(lockout_attempts(&db_state), 2);

        let session = login_admin("1234", &db_state, &auth).expect("valid login");
        assert_eq!(session.role, UserRole::Admin);
        assert_eq!(lockout_attempts(&db_state), 0);
    }

    #[test]
    fn admin_login_without_configured_pin_is_rejected() {
        let db_state = test_db_state();
        let err = login_admin("1234", &db_state, &AuthState::new()).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn washer_session_is_limited_to_yard_actions() {
        let auth = AuthState::new();
        let session = login_washer(&member(), &auth);
        let sid = Some(session.session_id.as_str());

        assert!(authorize(&auth, sid, CREATE_WASH).is_ok());
        assert!(authorize(&auth, sid, FINALIZE_WASH).is_ok());
        assert!(matches!(
            authorize(&auth, sid, MANAGE_STAFF),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize(&auth, None, VIEW_WASHES),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn new_login_replaces_previous_session() {
        let db_state = with_admin_pin("4321");
        let auth = AuthState::new();
        let washer = login_washer(&member(), &auth);
        let admin = login_admin("4321", &db_state, &auth).unwrap();

        assert!(authorize(&auth, Some(&washer.session_id), VIEW_WASHES).is_err());
        assert!(authorize(&auth, Some(&admin.session_id), MANAGE_LOYALTY).is_ok());

        logout(&auth);
        assert!(current_session(&auth).is_none());
        assert!(authorize(&auth, Some(&admin.session_id), VIEW_WASHES).is_err());
    }

    #[test]
    fn pin_setup_validates_and_provisions_once() {
        let db_state = test_db_state();
        assert!(matches!(
            set_admin_pin(&db_state, "12a4", 4),
            Err(AppError::Validation { field: "pin", .. })
        ));
        assert!(set_admin_pin(&db_state, "123", 4).is_err());

        provision_admin_pin(&db_state, None).unwrap();
        assert!(!has_admin_pin(&db_state).unwrap());

        set_admin_pin(&db_state, "2468", 4).unwrap();
        // Already provisioned: the configured value does not overwrite it.
        provision_admin_pin(&db_state, Some("1357")).unwrap();
        assert!(login_admin("2468", &db_state, &AuthState::new()).is_ok());
    }

    #[test]
    fn session_for_requires_the_matching_id() {
        let auth = AuthState::new();
        let session = login_washer(&member(), &auth);
        assert!(session_for(&auth, None).is_none());
        assert!(session_for(&auth, Some("someone-else")).is_none());
        let found = session_for(&auth, Some(&session.session_id)).unwrap();
        assert_eq!(found.display_name, "Maria");
    }

    #[test]
    fn concurrent_logins_and_session_reads_finish() {
        use std::sync::mpsc;
        use std::sync::Arc;
        use std::thread;

        let auth = Arc::new(AuthState::new());
        let (done_tx, done_rx) = mpsc::channel();

        let login_auth = auth.clone();
        let login_done = done_tx.clone();
        thread::spawn(move || {
            for _ in 0..2_000 {
                login_washer(&member(), &login_auth);
                logout(&login_auth);
            }
            login_done.send(()).unwrap();
        });

        let read_auth = auth.clone();
        thread::spawn(move || {
            for _ in 0..2_000 {
                let current = current_session(&read_auth);
                let sid = current.as_ref().map(|s| s.session_id.as_str());
                let _ = authorize(&read_auth, sid, VIEW_WASHES);
            }
            done_tx.send(()).unwrap();
        });

        for _ in 0..2 {
            done_rx
                .recv_timeout(std::time::Duration::from_secs(20))
                .expect("session threads did not finish");
        }
    }
}
