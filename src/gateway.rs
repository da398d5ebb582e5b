//! Persistence gateway: remote store of record plus local cache fallback.
//!
//! Reads go to the remote store first. A successful read overwrites the
//! matching cache table; a transient failure (connect error, timeout, HTTP
//! 5xx) marks the gateway offline and serves whatever the cache holds.
//! Writes go to the remote store first and are written through to the cache
//! only once the remote accepted them. Write failures are always returned.
//!
//! Without a configured endpoint the cache is the store of record.

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::api::SqlTransport;
use crate::data_helpers::{value_bool, value_f64, value_i64, value_str};
use crate::db::{self, DbState};
use crate::error::{AppError, Result};
use crate::models::{
    ClientProgress, Expense, ExpenseStatus, LoyaltyConfig, PaymentMethod, StaffMember,
    VehicleType, WashJob, WashStatus,
};

// ---------------------------------------------------------------------------
// Remote schema
// ---------------------------------------------------------------------------

const REMOTE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS washes (
        id TEXT PRIMARY KEY,
        client_name TEXT NOT NULL,
        client_phone TEXT,
        plate TEXT NOT NULL,
        model TEXT,
        service_type TEXT NOT NULL,
        status TEXT NOT NULL,
        assigned_staff TEXT NOT NULL,
        price NUMERIC NOT NULL DEFAULT 0,
        services JSONB NOT NULL DEFAULT '[]'::jsonb,
        vehicle_type TEXT NOT NULL,
        date TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS staff (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        role TEXT NOT NULL,
        photo TEXT,
        queue_position INTEGER NOT NULL,
        daily_rate NUMERIC NOT NULL DEFAULT 0,
        commission NUMERIC NOT NULL DEFAULT 0,
        unpaid NUMERIC NOT NULL DEFAULT 0,
        days_worked INTEGER NOT NULL DEFAULT 0,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS expenses (
        id TEXT PRIMARY KEY,
        category TEXT NOT NULL,
        description TEXT NOT NULL,
        amount NUMERIC NOT NULL,
        date TEXT NOT NULL,
        status TEXT NOT NULL,
        payment_method TEXT NOT NULL,
        installments INTEGER,
        operator TEXT,
        brand TEXT
    )",
    "CREATE TABLE IF NOT EXISTS loyalty_config (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        theme TEXT NOT NULL,
        stamps_required INTEGER NOT NULL,
        reward_description TEXT NOT NULL,
        is_active BOOLEAN NOT NULL,
        company_name TEXT NOT NULL,
        company_subtitle TEXT NOT NULL,
        company_logo TEXT,
        stamp_icon TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS client_progress (
        client_key TEXT PRIMARY KEY,
        stamps INTEGER NOT NULL,
        last_wash_date TEXT NOT NULL,
        phone TEXT NOT NULL DEFAULT ''
    )",
];

const UPSERT_WASH: &str = "INSERT INTO washes (id, client_name, client_phone, plate, model, \
     service_type, status, assigned_staff, price, services, vehicle_type, date) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10::jsonb, $11, $12) \
     ON CONFLICT (id) DO UPDATE SET client_name = EXCLUDED.client_name, \
     client_phone = EXCLUDED.client_phone, plate = EXCLUDED.plate, model = EXCLUDED.model, \
     service_type = EXCLUDED.service_type, status = EXCLUDED.status, \
     assigned_staff = EXCLUDED.assigned_staff, price = EXCLUDED.price, \
     services = EXCLUDED.services, vehicle_type = EXCLUDED.vehicle_type, date = EXCLUDED.date";

const UPSERT_STAFF: &str = "INSERT INTO staff (id, name, role, photo, queue_position, \
     daily_rate, commission, unpaid, days_worked, is_active) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
     ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, role = EXCLUDED.role, \
     photo = EXCLUDED.photo, queue_position = EXCLUDED.queue_position, \
     daily_rate = EXCLUDED.daily_rate, commission = EXCLUDED.commission, \
     unpaid = EXCLUDED.unpaid, days_worked = EXCLUDED.days_worked, \
     is_active = EXCLUDED.is_active";

const UPSERT_EXPENSE: &str = "INSERT INTO expenses (id, category, description, amount, date, \
     status, payment_method, installments, operator, brand) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
     ON CONFLICT (id) DO UPDATE SET category = EXCLUDED.category, \
     description = EXCLUDED.description, amount = EXCLUDED.amount, date = EXCLUDED.date, \
     status = EXCLUDED.status, payment_method = EXCLUDED.payment_method, \
     installments = EXCLUDED.installments, operator = EXCLUDED.operator, brand = EXCLUDED.brand";

const UPSERT_LOYALTY: &str = "INSERT INTO loyalty_config (id, theme, stamps_required, \
     reward_description, is_active, company_name, company_subtitle, company_logo, stamp_icon) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
     ON CONFLICT (id) DO UPDATE SET theme = EXCLUDED.theme, \
     stamps_required = EXCLUDED.stamps_required, \
     reward_description = EXCLUDED.reward_description, is_active = EXCLUDED.is_active, \
     company_name = EXCLUDED.company_name, company_subtitle = EXCLUDED.company_subtitle, \
     company_logo = EXCLUDED.company_logo, stamp_icon = EXCLUDED.stamp_icon";

const SEED_LOYALTY: &str = "INSERT INTO loyalty_config (id, theme, stamps_required, \
     reward_description, is_active, company_name, company_subtitle, company_logo, stamp_icon) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT (id) DO NOTHING";

const UPSERT_PROGRESS: &str = "INSERT INTO client_progress (client_key, stamps, \
     last_wash_date, phone) VALUES ($1, $2, $3, $4) \
     ON CONFLICT (client_key) DO UPDATE SET stamps = EXCLUDED.stamps, \
     last_wash_date = EXCLUDED.last_wash_date, phone = EXCLUDED.phone";

// ---------------------------------------------------------------------------
// Row encoding / decoding
// ---------------------------------------------------------------------------

fn wash_params(job: &WashJob) -> Result<Vec<Value>> {
    Ok(vec![
        json!(job.id),
        json!(job.client_name),
        json!(job.client_phone),
        json!(job.plate),
        json!(job.model),
        json!(job.service_type),
        json!(job.status.as_str()),
        json!(job.assigned_staff),
        json!(job.price),
        json!(serde_json::to_string(&job.services)?),
        json!(job.vehicle_type.as_str()),
        json!(job.date),
    ])
}

fn staff_params(member: &StaffMember) -> Vec<Value> {
    vec![
        json!(member.id),
        json!(member.name),
        json!(member.role),
        json!(member.photo),
        json!(member.queue_position),
        json!(member.daily_rate),
        json!(member.commission),
        json!(member.unpaid),
        json!(member.days_worked),
        json!(member.is_active),
    ]
}

fn expense_params(expense: &Expense) -> Vec<Value> {
    vec![
        json!(expense.id),
        json!(expense.category),
        json!(expense.description),
        json!(expense.amount),
        json!(expense.date),
        json!(expense.status.as_str()),
        json!(expense.payment_method.as_str()),
        json!(expense.installments),
        json!(expense.operator),
        json!(expense.brand),
    ]
}

fn loyalty_params(config: &LoyaltyConfig) -> Vec<Value> {
    vec![
        json!(1),
        json!(config.theme),
        json!(config.stamps_required),
        json!(config.reward_description),
        json!(config.is_active),
        json!(config.company_name),
        json!(config.company_subtitle),
        json!(config.company_logo),
        json!(config.stamp_icon),
    ]
}

fn progress_params(progress: &ClientProgress) -> Vec<Value> {
    vec![
        json!(progress.client_key),
        json!(progress.stamps),
        json!(progress.last_wash_date),
        json!(progress.phone),
    ]
}

/// JSONB comes back as an array; a text column holds the JSON encoding.
fn services_from(row: &Value) -> Vec<String> {
    match row.get("services") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn decode_wash(row: &Value) -> Option<WashJob> {
    Some(WashJob {
        id: value_str(row, &["id"])?,
        client_name: value_str(row, &["client_name", "clientname"]).unwrap_or_default(),
        client_phone: value_str(row, &["client_phone", "clientphone", "phone"]),
        plate: value_str(row, &["plate"]).unwrap_or_default(),
        model: value_str(row, &["model"]),
        service_type: value_str(row, &["service_type", "type"]).unwrap_or_default(),
        status: value_str(row, &["status"])
            .and_then(|s| WashStatus::parse(&s))
            .unwrap_or(WashStatus::Pending),
        assigned_staff: value_str(row, &["assigned_staff", "assignedstaff"]).unwrap_or_default(),
        price: value_f64(row, &["price"]).unwrap_or(0.0),
        services: services_from(row),
        vehicle_type: value_str(row, &["vehicle_type", "vehicletype"])
            .and_then(|s| VehicleType::parse(&s))
            .unwrap_or(VehicleType::Car),
        date: value_str(row, &["date"]).unwrap_or_default(),
    })
}

fn decode_staff(row: &Value) -> Option<StaffMember> {
    Some(StaffMember {
        id: value_str(row, &["id"])?,
        name: value_str(row, &["name"]).unwrap_or_default(),
        role: value_str(row, &["role"]).unwrap_or_default(),
        photo: value_str(row, &["photo"]),
        queue_position: value_i64(row, &["queue_position", "queueposition"]).unwrap_or(0),
        daily_rate: value_f64(row, &["daily_rate", "dailyrate"]).unwrap_or(0.0),
        commission: value_f64(row, &["commission"]).unwrap_or(0.0),
        unpaid: value_f64(row, &["unpaid"]).unwrap_or(0.0),
        days_worked: value_i64(row, &["days_worked", "daysworked"]).unwrap_or(0),
        is_active: value_bool(row, &["is_active", "isactive"]).unwrap_or(true),
    })
}

fn decode_expense(row: &Value) -> Option<Expense> {
    Some(Expense {
        id: value_str(row, &["id"])?,
        category: value_str(row, &["category"]).unwrap_or_default(),
        description: value_str(row, &["description"]).unwrap_or_default(),
        amount: value_f64(row, &["amount"]).unwrap_or(0.0),
        date: value_str(row, &["date"]).unwrap_or_default(),
        status: value_str(row, &["status"])
            .and_then(|s| ExpenseStatus::parse(&s))
            .unwrap_or(ExpenseStatus::Paid),
        payment_method: value_str(row, &["payment_method", "paymentmethod"])
            .and_then(|s| PaymentMethod::parse(&s))
            .unwrap_or(PaymentMethod::Cash),
        installments: value_i64(row, &["installments"]),
        operator: value_str(row, &["operator"]),
        brand: value_str(row, &["brand"]),
    })
}

fn decode_loyalty(row: &Value) -> LoyaltyConfig {
    let defaults = LoyaltyConfig::default();
    LoyaltyConfig {
        theme: value_str(row, &["theme"]).unwrap_or(defaults.theme),
        stamps_required: value_i64(row, &["stamps_required", "stampsrequired"])
            .unwrap_or(defaults.stamps_required),
        reward_description: value_str(row, &["reward_description", "rewarddescription"])
            .unwrap_or(defaults.reward_description),
        is_active: value_bool(row, &["is_active", "isactive"]).unwrap_or(defaults.is_active),
        company_name: value_str(row, &["company_name", "companyname"])
            .unwrap_or(defaults.company_name),
        company_subtitle: value_str(row, &["company_subtitle", "companysubtitle"])
            .unwrap_or(defaults.company_subtitle),
        company_logo: value_str(row, &["company_logo", "companylogo"]),
        stamp_icon: value_str(row, &["stamp_icon", "stampicon"]).unwrap_or(defaults.stamp_icon),
    }
}

fn decode_progress(row: &Value) -> Option<ClientProgress> {
    Some(ClientProgress {
        client_key: value_str(row, &["client_key", "clientkey"])?,
        stamps: value_i64(row, &["stamps"]).unwrap_or(0),
        last_wash_date: value_str(row, &["last_wash_date", "lastwashdate"]).unwrap_or_default(),
        phone: value_str(row, &["phone"]).unwrap_or_default(),
    })
}

fn decode_rows<T>(entity: &str, rows: &[Value], decode: fn(&Value) -> Option<T>) -> Vec<T> {
    let decoded: Vec<T> = rows.iter().filter_map(decode).collect();
    if decoded.len() != rows.len() {
        warn!(
            entity,
            skipped = rows.len() - decoded.len(),
            "skipped remote rows without a primary key"
        );
    }
    decoded
}

// ---------------------------------------------------------------------------
// Sync status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// `false` in local-only mode as well as while the remote is unreachable.
    pub online: bool,
    pub syncing: bool,
    pub local_only: bool,
    pub last_error: Option<String>,
    pub last_sync_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct Gateway {
    remote: Option<Arc<dyn SqlTransport>>,
    cache: Arc<DbState>,
    status: Mutex<SyncStatus>,
}

impl Gateway {
    pub fn new(remote: Option<Arc<dyn SqlTransport>>, cache: Arc<DbState>) -> Self {
        let local_only = remote.is_none();
        Self {
            remote,
            cache,
            status: Mutex::new(SyncStatus {
                online: false,
                syncing: false,
                local_only,
                last_error: None,
                last_sync_at: None,
            }),
        }
    }

    pub fn cache(&self) -> &Arc<DbState> {
        &self.cache
    }

    pub fn status(&self) -> SyncStatus {
        match self.status.lock() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.update_status(|s| s.syncing = syncing);
    }

    fn update_status(&self, f: impl FnOnce(&mut SyncStatus)) {
        match self.status.lock() {
            Ok(mut status) => f(&mut *status),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }

    fn mark_online(&self) {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.update_status(|s| {
            s.online = true;
            s.last_error = None;
            s.last_sync_at = Some(now);
        });
    }

    fn mark_offline(&self, err: &AppError) {
        let message = err.to_string();
        self.update_status(|s| {
            s.online = false;
            s.last_error = Some(message);
        });
    }

    fn with_cache<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.cache.lock()?;
        f(&mut *conn)
    }

    /// Remote read with cache fallback on transient failure.
    async fn read<T>(
        &self,
        entity: &'static str,
        sql: &str,
        decode: fn(&Value) -> Option<T>,
        cache_read: fn(&Connection) -> Result<Vec<T>>,
        cache_replace: fn(&mut Connection, &[T]) -> Result<()>,
    ) -> Result<Vec<T>> {
        let Some(remote) = &self.remote else {
            return self.with_cache(|conn| cache_read(conn));
        };

        match remote.query(sql, Vec::new()).await {
            Ok(rows) => {
                let records = decode_rows(entity, &rows, decode);
                self.mark_online();
                if let Err(e) = self.with_cache(|conn| cache_replace(conn, &records)) {
                    warn!(entity, error = %e, "failed to refresh local cache");
                }
                debug!(entity, count = records.len(), "loaded from remote store");
                Ok(records)
            }
            Err(e) if e.is_transient() => {
                warn!(entity, error = %e, "remote store unreachable, serving local cache");
                self.mark_offline(&e);
                self.with_cache(|conn| cache_read(conn))
            }
            Err(e) => {
                warn!(entity, error = %e, "remote read failed");
                Err(e)
            }
        }
    }

    /// Remote write, then write-through to the cache.
    ///
    /// Once the remote has accepted the record a failed cache write is only
    /// logged; the next read refreshes the cache. In local-only mode the
    /// cache is the store of record and its errors are returned.
    async fn write(
        &self,
        entity: &'static str,
        id: &str,
        sql: &str,
        params: Vec<Value>,
        cache_write: impl FnOnce(&Connection) -> Result<()>,
    ) -> Result<()> {
        let Some(remote) = &self.remote else {
            self.with_cache(|conn| cache_write(conn))?;
            debug!(entity, id, "record saved locally");
            return Ok(());
        };

        if let Err(e) = remote.query(sql, params).await {
            warn!(entity, id, error = %e, "remote write failed");
            if e.is_transient() {
                self.mark_offline(&e);
            }
            return Err(e);
        }
        self.mark_online();
        if let Err(e) = self.with_cache(|conn| cache_write(conn)) {
            warn!(entity, id, error = %e, "record saved remotely but cache write-through failed");
        }
        debug!(entity, id, "record saved");
        Ok(())
    }

    // -- Schema ----------------------------------------------------------

    /// Create the remote tables when missing and seed the default loyalty
    /// config. The cache gets the same seed.
    pub async fn ensure_schema(&self) -> Result<()> {
        let defaults = LoyaltyConfig::default();
        if let Some(remote) = &self.remote {
            for statement in REMOTE_SCHEMA {
                remote.query(statement, Vec::new()).await.map_err(|e| {
                    if e.is_transient() {
                        self.mark_offline(&e);
                    }
                    e
                })?;
            }
            remote.query(SEED_LOYALTY, loyalty_params(&defaults)).await?;
            self.mark_online();
            info!("remote schema verified");
        }
        self.with_cache(|conn| {
            if db::get_loyalty(conn)?.is_none() {
                db::save_loyalty(conn, &defaults)?;
                info!("seeded default loyalty config");
            }
            Ok(())
        })
    }

    // -- Entities --------------------------------------------------------

    pub async fn list_washes(&self) -> Result<Vec<WashJob>> {
        self.read(
            "washes",
            "SELECT * FROM washes ORDER BY date DESC, id DESC",
            decode_wash,
            db::list_washes,
            db::replace_washes,
        )
        .await
    }

    pub async fn upsert_wash(&self, job: &WashJob) -> Result<()> {
        let params = wash_params(job)?;
        self.write("washes", &job.id, UPSERT_WASH, params, |conn| {
            db::upsert_wash(conn, job)
        })
        .await
    }

    pub async fn list_staff(&self) -> Result<Vec<StaffMember>> {
        self.read(
            "staff",
            "SELECT * FROM staff ORDER BY queue_position ASC, id ASC",
            decode_staff,
            db::list_staff,
            db::replace_staff,
        )
        .await
    }

    pub async fn upsert_staff(&self, member: &StaffMember) -> Result<()> {
        self.write("staff", &member.id, UPSERT_STAFF, staff_params(member), |conn| {
            db::upsert_staff(conn, member)
        })
        .await
    }

    pub async fn list_expenses(&self) -> Result<Vec<Expense>> {
        self.read(
            "expenses",
            "SELECT * FROM expenses ORDER BY date DESC, id DESC",
            decode_expense,
            db::list_expenses,
            db::replace_expenses,
        )
        .await
    }

    pub async fn upsert_expense(&self, expense: &Expense) -> Result<()> {
        self.write(
            "expenses",
            &expense.id,
            UPSERT_EXPENSE,
            expense_params(expense),
            |conn| db::upsert_expense(conn, expense),
        )
        .await
    }

    pub async fn list_client_progress(&self) -> Result<Vec<ClientProgress>> {
        self.read(
            "client_progress",
            "SELECT * FROM client_progress ORDER BY client_key",
            decode_progress,
            db::list_client_progress,
            db::replace_client_progress,
        )
        .await
    }

    pub async fn upsert_client_progress(&self, progress: &ClientProgress) -> Result<()> {
        self.write(
            "client_progress",
            &progress.client_key,
            UPSERT_PROGRESS,
            progress_params(progress),
            |conn| db::upsert_client_progress(conn, progress),
        )
        .await
    }

    /// The singleton config. Falls back to the cached copy, then to the
    /// defaults, when the remote has no row or is unreachable.
    pub async fn get_loyalty(&self) -> Result<LoyaltyConfig> {
        let cached = || -> Result<LoyaltyConfig> {
            Ok(self
                .with_cache(|conn| db::get_loyalty(conn))?
                .unwrap_or_default())
        };

        let Some(remote) = &self.remote else {
            return cached();
        };

        match remote
            .query("SELECT * FROM loyalty_config WHERE id = 1", Vec::new())
            .await
        {
            Ok(rows) => {
                self.mark_online();
                match rows.first() {
                    Some(row) => {
                        let config = decode_loyalty(row);
                        if let Err(e) = self.with_cache(|conn| db::save_loyalty(conn, &config)) {
                            warn!(error = %e, "failed to refresh cached loyalty config");
                        }
                        Ok(config)
                    }
                    None => cached(),
                }
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "remote store unreachable, serving cached loyalty config");
                self.mark_offline(&e);
                cached()
            }
            Err(e) => Err(e),
        }
    }

    pub async fn save_loyalty(&self, config: &LoyaltyConfig) -> Result<()> {
        self.write(
            "loyalty_config",
            "1",
            UPSERT_LOYALTY,
            loyalty_params(config),
            |conn| db::save_loyalty(conn, config),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// In-process fake remote store
// ---------------------------------------------------------------------------
