//! Local SQLite cache for the car-wash backend.
//!
//! Uses rusqlite with WAL mode. Holds a mirror of every remote table (the
//! read fallback while the remote store is unreachable, and the store of
//! record in local-only mode) plus the `local_settings` key/value table for
//! device-local state such as the admin PIN hash and lockout counters.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::models::{
    ClientProgress, Expense, ExpenseStatus, LoyaltyConfig, PaymentMethod, StaffMember,
    VehicleType, WashJob, WashStatus,
};

/// Shared handle on the cache connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    pub fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Unexpected("local cache lock poisoned".into()))
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the cache at `{data_dir}/carwash.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure the file
/// is deleted and opened once more; everything in it can be re-fetched.
pub fn init(data_dir: &Path) -> Result<DbState> {
    fs::create_dir_all(data_dir)
        .map_err(|e| AppError::Unexpected(format!("Failed to create data dir: {e}")))?;

    let db_path = data_dir.join("carwash.db");
    info!(path = %db_path.display(), "opening local cache");

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(error = %first_err, "local cache open failed, deleting and retrying once");
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)?
        }
    };

    run_migrations(&conn)?;

    info!("Local cache initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// In-memory cache with every migration applied.
#[cfg(test)]
pub fn init_in_memory() -> Result<DbState> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

fn open_and_configure(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Local cache schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating local cache from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: settings plus the wash, staff and expense mirrors.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE TABLE IF NOT EXISTS washes (
            id TEXT PRIMARY KEY,
            client_name TEXT NOT NULL,
            client_phone TEXT,
            plate TEXT NOT NULL,
            model TEXT,
            service_type TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('PENDING','PAID')),
            assigned_staff TEXT NOT NULL,
            price REAL NOT NULL DEFAULT 0,
            services TEXT NOT NULL DEFAULT '[]',
            vehicle_type TEXT NOT NULL,
            date TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_washes_date ON washes(date);

        CREATE TABLE IF NOT EXISTS staff (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            photo TEXT,
            queue_position INTEGER NOT NULL,
            daily_rate REAL NOT NULL DEFAULT 0,
            commission REAL NOT NULL DEFAULT 0,
            unpaid REAL NOT NULL DEFAULT 0,
            days_worked INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            installments INTEGER,
            operator TEXT,
            brand TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        AppError::from(e)
    })?;

    info!("Applied migration v1 (settings, washes, staff, expenses)");
    Ok(())
}

/// Migration v2: loyalty singleton and per-client stamp progress.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS loyalty_config (
            id INTEGER PRIMARY KEY CHECK(id = 1),
            theme TEXT NOT NULL,
            stamps_required INTEGER NOT NULL,
            reward_description TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            company_name TEXT NOT NULL,
            company_subtitle TEXT NOT NULL,
            company_logo TEXT,
            stamp_icon TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS client_progress (
            client_key TEXT PRIMARY KEY,
            stamps INTEGER NOT NULL,
            last_wash_date TEXT NOT NULL,
            phone TEXT NOT NULL DEFAULT ''
        );

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        AppError::from(e)
    })?;

    info!("Applied migration v2 (loyalty config, client progress)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Wash jobs
// ---------------------------------------------------------------------------

fn wash_from_row(row: &Row<'_>) -> rusqlite::Result<WashJob> {
    let status: String = row.get("status")?;
    let vehicle: String = row.get("vehicle_type")?;
    let services: String = row.get("services")?;
    Ok(WashJob {
        id: row.get("id")?,
        client_name: row.get("client_name")?,
        client_phone: row.get("client_phone")?,
        plate: row.get("plate")?,
        model: row.get("model")?,
        service_type: row.get("service_type")?,
        status: WashStatus::parse(&status).unwrap_or(WashStatus::Pending),
        assigned_staff: row.get("assigned_staff")?,
        price: row.get("price")?,
        services: serde_json::from_str(&services).unwrap_or_default(),
        vehicle_type: VehicleType::parse(&vehicle).unwrap_or(VehicleType::Car),
        date: row.get("date")?,
    })
}

pub fn upsert_wash(conn: &Connection, job: &WashJob) -> Result<()> {
    let services = serde_json::to_string(&job.services)?;
    conn.execute(
        "INSERT OR REPLACE INTO washes (id, client_name, client_phone, plate, model,
            service_type, status, assigned_staff, price, services, vehicle_type, date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            job.id,
            job.client_name,
            job.client_phone,
            job.plate,
            job.model,
            job.service_type,
            job.status.as_str(),
            job.assigned_staff,
            job.price,
            services,
            job.vehicle_type.as_str(),
            job.date,
        ],
    )?;
    Ok(())
}

/// Newest first, matching the remote listing.
pub fn list_washes(conn: &Connection) -> Result<Vec<WashJob>> {
    let mut stmt = conn.prepare("SELECT * FROM washes ORDER BY date DESC, id DESC")?;
    let rows = stmt.query_map([], wash_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn replace_washes(conn: &mut Connection, jobs: &[WashJob]) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM washes", [])?;
    for job in jobs {
        upsert_wash(&tx, job)?;
    }
    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Staff
// ---------------------------------------------------------------------------

fn staff_from_row(row: &Row<'_>) -> rusqlite::Result<StaffMember> {
    Ok(StaffMember {
        id: row.get("id")?,
        name: row.get("name")?,
        role: row.get("role")?,
        photo: row.get("photo")?,
        queue_position: row.get("queue_position")?,
        daily_rate: row.get("daily_rate")?,
        commission: row.get("commission")?,
        unpaid: row.get("unpaid")?,
        days_worked: row.get("days_worked")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
    })
}

pub fn upsert_staff(conn: &Connection, member: &StaffMember) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO staff (id, name, role, photo, queue_position, daily_rate,
            commission, unpaid, days_worked, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            member.id,
            member.name,
            member.role,
            member.photo,
            member.queue_position,
            member.daily_rate,
            member.commission,
            member.unpaid,
            member.days_worked,
            member.is_active as i64,
        ],
    )?;
    Ok(())
}

pub fn list_staff(conn: &Connection) -> Result<Vec<StaffMember>> {
    let mut stmt = conn.prepare("SELECT * FROM staff ORDER BY queue_position ASC, id ASC")?;
    let rows = stmt.query_map([], staff_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn replace_staff(conn: &mut Connection, roster: &[StaffMember]) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM staff", [])?;
    for member in roster {
        upsert_staff(&tx, member)?;
    }
    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

fn expense_from_row(row: &Row<'_>) -> rusqlite::Result<Expense> {
    let status: String = row.get("status")?;
    let method: String = row.get("payment_method")?;
    Ok(Expense {
        id: row.get("id")?,
        category: row.get("category")?,
        description: row.get("description")?,
        amount: row.get("amount")?,
        date: row.get("date")?,
        status: ExpenseStatus::parse(&status).unwrap_or(ExpenseStatus::Paid),
        payment_method: PaymentMethod::parse(&method).unwrap_or(PaymentMethod::Cash),
        installments: row.get("installments")?,
        operator: row.get("operator")?,
        brand: row.get("brand")?,
    })
}

pub fn upsert_expense(conn: &Connection, expense: &Expense) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO expenses (id, category, description, amount, date, status,
            payment_method, installments, operator, brand)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            expense.id,
            expense.category,
            expense.description,
            expense.amount,
            expense.date,
            expense.status.as_str(),
            expense.payment_method.as_str(),
            expense.installments,
            expense.operator,
            expense.brand,
        ],
    )?;
    Ok(())
}

pub fn list_expenses(conn: &Connection) -> Result<Vec<Expense>> {
    let mut stmt = conn.prepare("SELECT * FROM expenses ORDER BY date DESC, id DESC")?;
    let rows = stmt.query_map([], expense_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn replace_expenses(conn: &mut Connection, expenses: &[Expense]) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM expenses", [])?;
    for expense in expenses {
        upsert_expense(&tx, expense)?;
    }
    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Loyalty
// ---------------------------------------------------------------------------

pub fn get_loyalty(conn: &Connection) -> Result<Option<LoyaltyConfig>> {
    let config = conn
        .query_row("SELECT * FROM loyalty_config WHERE id = 1", [], |row| {
            Ok(LoyaltyConfig {
                theme: row.get("theme")?,
                stamps_required: row.get("stamps_required")?,
                reward_description: row.get("reward_description")?,
                is_active: row.get::<_, i64>("is_active")? != 0,
                company_name: row.get("company_name")?,
                company_subtitle: row.get("company_subtitle")?,
                company_logo: row.get("company_logo")?,
                stamp_icon: row.get("stamp_icon")?,
            })
        })
        .optional()?;
    Ok(config)
}

/// Replace the singleton wholesale.
pub fn save_loyalty(conn: &Connection, config: &LoyaltyConfig) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO loyalty_config (id, theme, stamps_required, reward_description,
            is_active, company_name, company_subtitle, company_logo, stamp_icon)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            config.theme,
            config.stamps_required,
            config.reward_description,
            config.is_active as i64,
            config.company_name,
            config.company_subtitle,
            config.company_logo,
            config.stamp_icon,
        ],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Client progress
// ---------------------------------------------------------------------------

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ClientProgress> {
    Ok(ClientProgress {
        client_key: row.get("client_key")?,
        stamps: row.get("stamps")?,
        last_wash_date: row.get("last_wash_date")?,
        phone: row.get("phone")?,
    })
}

pub fn upsert_client_progress(conn: &Connection, progress: &ClientProgress) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO client_progress (client_key, stamps, last_wash_date, phone)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            progress.client_key,
            progress.stamps,
            progress.last_wash_date,
            progress.phone,
        ],
    )?;
    Ok(())
}

pub fn list_client_progress(conn: &Connection) -> Result<Vec<ClientProgress>> {
    let mut stmt = conn.prepare("SELECT * FROM client_progress ORDER BY client_key")?;
    let rows = stmt.query_map([], progress_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn replace_client_progress(conn: &mut Connection, progress: &[ClientProgress]) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM client_progress", [])?;
    for entry in progress {
        upsert_client_progress(&tx, entry)?;
    }
    tx.commit()?;
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("pragma setup");
        run_migrations_for_test(&conn);
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    fn wash(id: &str, status: WashStatus) -> WashJob {
        WashJob {
            id: id.into(),
            client_name: "Ana".into(),
            client_phone: Some("11 98888-7777".into()),
            plate: "ABC1D23".into(),
            model: None,
            service_type: "Exterior".into(),
            status,
            assigned_staff: "João".into(),
            price: 25.0,
            services: vec!["Exterior".into(), "Wax".into()],
            vehicle_type: VehicleType::Motorcycle,
            date: "2026-10-19".into(),
        }
    }

    #[test]
    fn migrations_create_every_table() {
        let conn = test_db();
        let tables = table_names(&conn);
        for table in [
            "local_settings",
            "washes",
            "staff",
            "expenses",
            "loyalty_config",
            "client_progress",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("second run");
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn settings_round_trip() {
        let conn = test_db();
        assert_eq!(get_setting(&conn, "staff", "admin_pin_hash"), None);
        set_setting(&conn, "staff", "admin_pin_hash", "a").unwrap();
        set_setting(&conn, "staff", "admin_pin_hash", "b").unwrap();
        assert_eq!(get_setting(&conn, "staff", "admin_pin_hash").as_deref(), Some("b"));
    }

    #[test]
    fn wash_upsert_twice_equals_once() {
        let conn = test_db();
        let job = wash("w1", WashStatus::Pending);
        upsert_wash(&conn, &job).unwrap();
        upsert_wash(&conn, &job).unwrap();
        let listed = list_washes(&conn).unwrap();
        assert_eq!(listed, vec![job]);
    }

    #[test]
    fn replace_drops_rows_missing_from_snapshot() {
        let mut conn = test_db();
        upsert_wash(&conn, &wash("old", WashStatus::Paid)).unwrap();
        replace_washes(&mut conn, &[wash("new", WashStatus::Pending)]).unwrap();
        let ids: Vec<String> = list_washes(&conn).unwrap().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["new".to_string()]);
    }

    #[test]
    fn staff_listing_is_ordered_by_position_then_id() {
        let mut conn = test_db();
        let member = |id: &str, pos: i64| StaffMember {
            id: id.into(),
            name: id.to_uppercase(),
            role: "Lavador".into(),
            photo: None,
            queue_position: pos,
            daily_rate: 45.0,
            commission: 0.0,
            unpaid: 0.0,
            days_worked: 0,
            is_active: pos != 2,
        };
        replace_staff(&mut conn, &[member("c", 2), member("b", 1), member("a", 2)]).unwrap();
        let listed = list_staff(&conn).unwrap();
        let ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(!listed[1].is_active);
    }

    #[test]
    fn loyalty_singleton_is_replaced_wholesale() {
        let conn = test_db();
        assert!(get_loyalty(&conn).unwrap().is_none());
        save_loyalty(&conn, &LoyaltyConfig::default()).unwrap();
        let updated = LoyaltyConfig {
            stamps_required: 5,
            is_active: false,
            company_logo: Some("data:image/png;base64,AA==".into()),
            ..LoyaltyConfig::default()
        };
        save_loyalty(&conn, &updated).unwrap();
        assert_eq!(get_loyalty(&conn).unwrap(), Some(updated));
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM loyalty_config", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn expenses_and_progress_round_trip() {
        let conn = test_db();
        let expense = Expense {
            id: "e1".into(),
            category: "Produtos".into(),
            description: "Shampoo".into(),
            amount: 120.5,
            date: "2026-10-02".into(),
            status: ExpenseStatus::Pending,
            payment_method: PaymentMethod::CreditCard,
            installments: Some(3),
            operator: Some("Stone".into()),
            brand: Some("Visa".into()),
        };
        upsert_expense(&conn, &expense).unwrap();
        assert_eq!(list_expenses(&conn).unwrap(), vec![expense]);

        let progress = ClientProgress {
            client_key: "11988887777".into(),
            stamps: 3,
            last_wash_date: "2026-10-19".into(),
            phone: "11 98888-7777".into(),
        };
        upsert_client_progress(&conn, &progress).unwrap();
        upsert_client_progress(&conn, &progress).unwrap();
        assert_eq!(list_client_progress(&conn).unwrap(), vec![progress]);
    }

    #[test]
    fn file_backed_init_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let state = init(dir.path()).unwrap();
        assert!(state.db_path.exists());
        let conn = state.lock().unwrap();
        set_setting(&conn, "app", "probe", "1").unwrap();
    }
}
