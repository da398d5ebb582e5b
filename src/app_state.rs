//! Application state controller.
//!
//! The controller owns the in-memory collections and is the only place they
//! change. Every action follows the same shape: validate, apply the change
//! tentatively in memory, persist through the gateway, and restore the prior
//! value when the write fails. The HTTP layer holds the controller behind a
//! single `tokio::sync::Mutex`, so actions never interleave.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::auth::AuthState;
use crate::data_helpers::{first_day_of_month, parse_day, today};
use crate::error::{AppError, Result};
use crate::finance::{self, DashboardSummary, EarningsUpdate, ExpenseDraft, PeriodSummary};
use crate::gateway::Gateway;
use crate::jobs::{self, WashIntake};
use crate::loyalty;
use crate::models::{ClientProgress, Expense, LoyaltyConfig, StaffMember, WashJob};
use crate::queue::{self, QueueAction, StaffDraft};

/// Everything the view renders.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    pub washes: Vec<WashJob>,
    pub staff: Vec<StaffMember>,
    pub expenses: Vec<Expense>,
    pub loyalty: LoyaltyConfig,
    pub client_progress: Vec<ClientProgress>,
}

/// Result of finalizing a wash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeOutcome {
    pub job: WashJob,
    /// `false` when the job was already paid and nothing changed.
    pub finalized: bool,
    pub progress: Option<ClientProgress>,
    pub reward_due: bool,
    pub message: String,
    pub whatsapp_link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub member: StaffMember,
    pub amount: f64,
}

/// Raises the `syncing` flag for the lifetime of an action.
struct SyncingGuard<'a>(&'a Gateway);

impl<'a> SyncingGuard<'a> {
    fn begin(gateway: &'a Gateway) -> Self {
        gateway.set_syncing(true);
        Self(gateway)
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.set_syncing(false);
    }
}

pub struct Controller {
    gateway: Arc<Gateway>,
    data: AppData,
}

impl Controller {
    /// Verify the remote schema and rehydrate every collection.
    pub async fn bootstrap(gateway: Arc<Gateway>) -> Result<Self> {
        if let Err(e) = gateway.ensure_schema().await {
            if !e.is_transient() {
                return Err(e);
            }
            warn!(error = %e, "remote store unreachable at startup, starting from local cache");
        }
        let mut controller = Self {
            gateway,
            data: AppData::default(),
        };
        controller.refresh().await?;
        info!(
            washes = controller.data.washes.len(),
            staff = controller.data.staff.len(),
            expenses = controller.data.expenses.len(),
            "application state loaded"
        );
        Ok(controller)
    }

    /// Reload every collection from the gateway.
    pub async fn refresh(&mut self) -> Result<()> {
        let _syncing = SyncingGuard::begin(&self.gateway);
        let washes = self.gateway.list_washes().await?;
        let staff = self.gateway.list_staff().await?;
        let expenses = self.gateway.list_expenses().await?;
        let loyalty = self.gateway.get_loyalty().await?;
        let client_progress = self.gateway.list_client_progress().await?;
        self.data = AppData {
            washes,
            staff: queue::sorted_roster(&staff),
            expenses,
            loyalty,
            client_progress,
        };
        Ok(())
    }

    // -- Reads -------------------------------------------------------------

    pub fn data(&self) -> &AppData {
        &self.data
    }

    pub fn washes(&self) -> &[WashJob] {
        &self.data.washes
    }

    pub fn roster(&self) -> Vec<StaffMember> {
        queue::sorted_roster(&self.data.staff)
    }

    pub fn staff_member(&self, staff_id: &str) -> Option<&StaffMember> {
        self.data.staff.iter().find(|s| s.id == staff_id)
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.data.expenses
    }

    pub fn loyalty(&self) -> &LoyaltyConfig {
        &self.data.loyalty
    }

    pub fn client_progress(&self) -> &[ClientProgress] {
        &self.data.client_progress
    }

    pub fn find_client(&self, query: &str) -> Option<&ClientProgress> {
        loyalty::find_client(&self.data.client_progress, query)
    }

    /// Ledger for `[start, end]`; defaults to the current month to date.
    pub fn period_summary(&self, start: Option<&str>, end: Option<&str>) -> Result<PeriodSummary> {
        let start = match start.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) if parse_day(s).is_some() => s.to_string(),
            Some(_) => return Err(AppError::validation("start", "Date must be YYYY-MM-DD")),
            None => first_day_of_month(),
        };
        let end = match end.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) if parse_day(s).is_some() => s.to_string(),
            Some(_) => return Err(AppError::validation("end", "Date must be YYYY-MM-DD")),
            None => today(),
        };
        if start > end {
            return Err(AppError::validation("start", "Start date is after end date"));
        }
        Ok(finance::period_summary(
            &self.data.washes,
            &self.data.expenses,
            &start,
            &end,
        ))
    }

    pub fn dashboard(&self) -> DashboardSummary {
        finance::dashboard_summary(&self.data.washes, &self.data.expenses, &self.data.staff)
    }

    // -- Wash jobs ---------------------------------------------------------

    /// Intake a new wash. A blank assignee defaults to whoever is next in
    /// line; a named roster member is then sent to the back of the queue.
    ///
    /// The rotation is written before the wash. When the wash write fails
    /// the member's previous position is written back, so a retry never
    /// leaves a duplicate job behind.
    pub async fn add_wash(&mut self, mut intake: WashIntake) -> Result<WashJob> {
        if intake.assigned_staff.trim().is_empty() {
            if let Some(next) = queue::next_in_line(&self.data.staff) {
                intake.assigned_staff = next.name.clone();
            }
        }
        let job = jobs::validate_intake(intake)?;
        let _syncing = SyncingGuard::begin(&self.gateway);

        let previous = self
            .data
            .staff
            .iter()
            .find(|s| s.name == job.assigned_staff)
            .cloned();
        let moved = queue::assign_next_job(&mut self.data.staff, &job.assigned_staff);
        if let Some(moved) = &moved {
            if let Err(e) = self.gateway.upsert_staff(moved).await {
                if let Some(previous) = previous {
                    restore_staff(&mut self.data.staff, previous);
                }
                return Err(e);
            }
        }

        self.data.washes.insert(0, job.clone());
        if let Err(e) = self.gateway.upsert_wash(&job).await {
            self.data.washes.retain(|w| w.id != job.id);
            if let (Some(_), Some(previous)) = (moved, previous) {
                if let Err(undo) = self.gateway.upsert_staff(&previous).await {
                    warn!(staff_id = %previous.id, error = %undo, "could not restore queue position");
                }
                restore_staff(&mut self.data.staff, previous);
            }
            return Err(e);
        }
        info!(wash_id = %job.id, assigned = %job.assigned_staff, "wash job created");
        Ok(job)
    }

    /// Admin correction: flip PENDING/PAID without touching loyalty.
    pub async fn toggle_wash_status(&mut self, wash_id: &str) -> Result<WashJob> {
        let index = self.wash_index(wash_id)?;
        let _syncing = SyncingGuard::begin(&self.gateway);

        let previous = self.data.washes[index].clone();
        jobs::toggle_status(&mut self.data.washes[index]);
        let updated = self.data.washes[index].clone();
        if let Err(e) = self.gateway.upsert_wash(&updated).await {
            self.data.washes[index] = previous;
            return Err(e);
        }
        info!(wash_id, status = updated.status.as_str(), "wash status toggled");
        Ok(updated)
    }

    /// Mark a wash paid and credit the client's loyalty card.
    pub async fn finalize_wash(&mut self, wash_id: &str) -> Result<FinalizeOutcome> {
        let index = self.wash_index(wash_id)?;
        let config = self.data.loyalty.clone();

        let previous = self.data.washes[index].clone();
        if !jobs::finalize(&mut self.data.washes[index]) {
            let key = loyalty::client_key_for_job(&previous);
            let progress = key
                .and_then(|k| self.data.client_progress.iter().find(|p| p.client_key == k))
                .cloned();
            return Ok(self.outcome(previous, false, progress));
        }

        let _syncing = SyncingGuard::begin(&self.gateway);
        let job = self.data.washes[index].clone();
        if let Err(e) = self.gateway.upsert_wash(&job).await {
            self.data.washes[index] = previous;
            return Err(e);
        }
        info!(wash_id, "wash finalized");

        let Some(key) = loyalty::client_key_for_job(&job) else {
            return Ok(self.outcome(job, true, None));
        };
        let existing = self
            .data
            .client_progress
            .iter()
            .position(|p| p.client_key == key);
        let updated = loyalty::record_completion(
            existing.map(|i| &self.data.client_progress[i]),
            &key,
            job.client_phone.as_deref(),
            &job.date,
            &config,
        );
        let Some(updated) = updated else {
            return Ok(self.outcome(job, true, None));
        };

        let prior = match existing {
            Some(i) => Some(std::mem::replace(
                &mut self.data.client_progress[i],
                updated.clone(),
            )),
            None => {
                self.data.client_progress.push(updated.clone());
                None
            }
        };
        if let Err(e) = self.gateway.upsert_client_progress(&updated).await {
            match (existing, prior) {
                (Some(i), Some(prior)) => self.data.client_progress[i] = prior,
                _ => self.data.client_progress.retain(|p| p.client_key != key),
            }
            // Back to PENDING so a retry finalizes and credits again.
            if let Err(undo) = self.gateway.upsert_wash(&previous).await {
                warn!(wash_id, error = %undo, "could not write wash back to pending");
            }
            self.data.washes[index] = previous;
            warn!(wash_id, error = %e, "loyalty stamp not saved, finalize undone");
            return Err(e);
        }
        Ok(self.outcome(job, true, Some(updated)))
    }

    fn outcome(
        &self,
        job: WashJob,
        finalized: bool,
        progress: Option<ClientProgress>,
    ) -> FinalizeOutcome {
        let config = &self.data.loyalty;
        let message = loyalty::completion_message(&job, progress.as_ref(), config);
        FinalizeOutcome {
            whatsapp_link: loyalty::whatsapp_link(&job, &message),
            reward_due: progress
                .as_ref()
                .map(|p| loyalty::is_reward_due(p, config))
                .unwrap_or(false),
            job,
            finalized,
            progress,
            message,
        }
    }

    fn wash_index(&self, wash_id: &str) -> Result<usize> {
        self.data
            .washes
            .iter()
            .position(|w| w.id == wash_id)
            .ok_or_else(|| AppError::NotFound(format!("Wash {wash_id}")))
    }

    // -- Expenses ----------------------------------------------------------

    pub async fn add_expense(&mut self, draft: ExpenseDraft) -> Result<Expense> {
        let expense = finance::validate_expense(draft)?;
        let _syncing = SyncingGuard::begin(&self.gateway);

        self.data.expenses.insert(0, expense.clone());
        if let Err(e) = self.gateway.upsert_expense(&expense).await {
            self.data.expenses.retain(|x| x.id != expense.id);
            return Err(e);
        }
        info!(expense_id = %expense.id, amount = expense.amount, "expense recorded");
        Ok(expense)
    }

    // -- Staff -------------------------------------------------------------

    pub async fn add_staff(&mut self, draft: StaffDraft) -> Result<StaffMember> {
        let member = queue::new_member(draft, &self.data.staff)?;
        let _syncing = SyncingGuard::begin(&self.gateway);

        self.data.staff.push(member.clone());
        if let Err(e) = self.gateway.upsert_staff(&member).await {
            self.data.staff.retain(|s| s.id != member.id);
            return Err(e);
        }
        info!(staff_id = %member.id, position = member.queue_position, "staff member added");
        Ok(member)
    }

    /// Rotation change. Unknown ids are a silent no-op (`Ok(None)`).
    pub async fn update_staff_queue(
        &mut self,
        staff_id: &str,
        action: QueueAction,
    ) -> Result<Option<StaffMember>> {
        let Some(previous) = self.staff_member(staff_id).cloned() else {
            return Ok(None);
        };
        let _syncing = SyncingGuard::begin(&self.gateway);

        let Some(updated) = queue::apply(&mut self.data.staff, staff_id, action) else {
            return Ok(None);
        };
        if let Err(e) = self.gateway.upsert_staff(&updated).await {
            restore_staff(&mut self.data.staff, previous);
            return Err(e);
        }
        Ok(Some(updated))
    }

    pub async fn update_earnings(
        &mut self,
        staff_id: &str,
        update: EarningsUpdate,
    ) -> Result<StaffMember> {
        update.validate()?;
        self.modify_staff(staff_id, |member| finance::set_earnings(member, update))
            .await
    }

    pub async fn pay_staff(&mut self, staff_id: &str) -> Result<Payout> {
        let amount = self
            .staff_member(staff_id)
            .map(|m| m.unpaid)
            .ok_or_else(|| AppError::NotFound(format!("Staff member {staff_id}")))?;
        let member = self
            .modify_staff(staff_id, |member| {
                finance::pay_out(member);
            })
            .await?;
        info!(staff_id, amount, "staff paid out");
        Ok(Payout { member, amount })
    }

    async fn modify_staff(
        &mut self,
        staff_id: &str,
        change: impl FnOnce(&mut StaffMember),
    ) -> Result<StaffMember> {
        let index = self
            .data
            .staff
            .iter()
            .position(|s| s.id == staff_id)
            .ok_or_else(|| AppError::NotFound(format!("Staff member {staff_id}")))?;
        let _syncing = SyncingGuard::begin(&self.gateway);

        let previous = self.data.staff[index].clone();
        change(&mut self.data.staff[index]);
        let updated = self.data.staff[index].clone();
        if let Err(e) = self.gateway.upsert_staff(&updated).await {
            self.data.staff[index] = previous;
            return Err(e);
        }
        Ok(updated)
    }

    // -- Loyalty -----------------------------------------------------------

    /// Replace the loyalty settings wholesale.
    pub async fn save_loyalty(&mut self, config: LoyaltyConfig) -> Result<LoyaltyConfig> {
        loyalty::validate_config(&config)?;
        let _syncing = SyncingGuard::begin(&self.gateway);

        let previous = std::mem::replace(&mut self.data.loyalty, config.clone());
        if let Err(e) = self.gateway.save_loyalty(&config).await {
            self.data.loyalty = previous;
            return Err(e);
        }
        info!(
            stamps_required = config.stamps_required,
            is_active = config.is_active,
            "loyalty settings saved"
        );
        Ok(config)
    }
}

fn restore_staff(staff: &mut [StaffMember], previous: StaffMember) {
    if let Some(slot) = staff.iter_mut().find(|s| s.id == previous.id) {
        *slot = previous;
    }
}

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Mutex<Controller>>,
    pub gateway: Arc<Gateway>,
    pub auth: Arc<AuthState>,
}

impl AppState {
    pub fn new(controller: Controller, auth: AuthState) -> Self {
        let gateway = controller.gateway.clone();
        Self {
            controller: Arc::new(Mutex::new(controller)),
            gateway,
            auth: Arc::new(auth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SqlTransport;
    use crate::db;
    use crate::gateway::testing::FakeSql;
    use crate::models::{VehicleType, WashStatus};
    use std::sync::atomic::Ordering;

    async fn controller_with(fake: &Arc<FakeSql>) -> Controller {
        let cache = Arc::new(db::init_in_memory().unwrap());
        let gateway = Arc::new(Gateway::new(
            Some(fake.clone() as Arc<dyn SqlTransport>),
            cache,
        ));
        Controller::bootstrap(gateway).await.unwrap()
    }

    fn intake(assigned: &str) -> WashIntake {
        WashIntake {
            client_name: "Carla".into(),
            client_phone: Some("(11) 99999-0000".into()),
            plate: "xyz9876".into(),
            service_type: "Exterior".into(),
            vehicle_type: Some(VehicleType::Car),
            assigned_staff: assigned.into(),
            price: Some(45.0),
            date: Some("2026-10-19".into()),
            ..WashIntake::default()
        }
    }

    async fn with_staff(ctl: &mut Controller, names: &[&str]) -> Vec<StaffMember> {
        let mut added = Vec::new();
        for name in names {
            let member = ctl
                .add_staff(StaffDraft {
                    name: name.to_string(),
                    ..StaffDraft::default()
                })
                .await
                .unwrap();
            added.push(member);
        }
        added
    }

    #[tokio::test]
    async fn bootstrap_seeds_loyalty_defaults() {
        let fake = FakeSql::new();
        let ctl = controller_with(&fake).await;
        assert_eq!(ctl.loyalty(), &LoyaltyConfig::default());
        assert_eq!(fake.rows("loyalty_config").len(), 1);
        assert!(!ctl.gateway.status().syncing);
    }

    #[tokio::test]
    async fn add_wash_sends_assigned_member_to_back() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        with_staff(&mut ctl, &["Ana", "Bruno"]).await;

        let job = ctl.add_wash(intake("Ana")).await.unwrap();
        assert_eq!(job.status, WashStatus::Pending);
        assert_eq!(job.plate, "XYZ9876");

        let names: Vec<String> = ctl.roster().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Bruno", "Ana"]);
        assert_eq!(ctl.roster()[1].queue_position, 3);
        assert_eq!(fake.rows("washes").len(), 1);
    }

    #[tokio::test]
    async fn blank_assignee_defaults_to_next_in_line() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        let staff = with_staff(&mut ctl, &["Ana", "Bruno"]).await;
        ctl.update_staff_queue(&staff[0].id, QueueAction::Toggle)
            .await
            .unwrap();

        let job = ctl.add_wash(intake("")).await.unwrap();
        assert_eq!(job.assigned_staff, "Bruno");
    }

    #[tokio::test]
    async fn invalid_intake_persists_nothing() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        let before = fake.statements.load(Ordering::SeqCst);

        let err = ctl
            .add_wash(WashIntake {
                price: None,
                ..intake("")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "price", .. }));
        assert_eq!(fake.statements.load(Ordering::SeqCst), before);
        assert!(ctl.washes().is_empty());
    }

    #[tokio::test]
    async fn failed_write_rolls_back_tentative_change() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        let staff = with_staff(&mut ctl, &["Ana", "Bruno"]).await;

        fake.set_offline(true);
        let err = ctl.add_wash(intake("Ana")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(ctl.washes().is_empty());

        let err = ctl
            .update_staff_queue(&staff[0].id, QueueAction::Bottom)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(ctl.staff_member(&staff[0].id).unwrap().queue_position, 1);
        assert!(!ctl.gateway.status().online);
    }

    #[tokio::test]
    async fn failed_wash_write_restores_queue_and_retry_saves_once() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        let staff = with_staff(&mut ctl, &["Ana", "Bruno"]).await;

        fake.fail_writes_to(Some("washes"));
        let err = ctl.add_wash(intake("Ana")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(ctl.washes().is_empty());
        assert_eq!(ctl.staff_member(&staff[0].id), Some(&staff[0]));
        let remote_ana = fake
            .rows("staff")
            .into_iter()
            .find(|r| r["id"] == staff[0].id.as_str())
            .unwrap();
        assert_eq!(remote_ana["queue_position"], staff[0].queue_position);

        fake.fail_writes_to(None);
        ctl.add_wash(intake("Ana")).await.unwrap();
        assert_eq!(ctl.washes().len(), 1);
        assert_eq!(fake.rows("washes").len(), 1);
        assert_eq!(ctl.roster()[0].name, "Bruno");
    }

    #[tokio::test]
    async fn failed_stamp_write_undoes_finalize_and_retry_credits() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        let job = ctl.add_wash(intake("")).await.unwrap();

        fake.fail_writes_to(Some("client_progress"));
        let err = ctl.finalize_wash(&job.id).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(ctl.washes()[0].status, WashStatus::Pending);
        assert_eq!(fake.rows("washes")[0]["status"], "PENDING");
        assert!(ctl.client_progress().is_empty());

        fake.fail_writes_to(None);
        let outcome = ctl.finalize_wash(&job.id).await.unwrap();
        assert!(outcome.finalized);
        assert_eq!(outcome.progress.map(|p| p.stamps), Some(1));
        assert_eq!(fake.rows("client_progress").len(), 1);
        assert_eq!(fake.rows("washes")[0]["status"], "PAID");
    }

    #[tokio::test]
    async fn staff_queue_scenario_and_unknown_id() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        let staff = with_staff(&mut ctl, &["A", "B"]).await;

        let moved = ctl
            .update_staff_queue(&staff[0].id, QueueAction::Bottom)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.queue_position, 3);
        let names: Vec<String> = ctl.roster().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["B", "A"]);

        assert!(ctl
            .update_staff_queue("ghost", QueueAction::Top)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn finalize_credits_one_stamp_and_wraps_full_card() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        ctl.data.client_progress.push(ClientProgress {
            client_key: "11999990000".into(),
            stamps: 10,
            last_wash_date: "2026-10-01".into(),
            phone: "(11) 99999-0000".into(),
        });

        let job = ctl.add_wash(intake("")).await.unwrap();
        let outcome = ctl.finalize_wash(&job.id).await.unwrap();
        assert!(outcome.finalized);
        assert_eq!(outcome.job.status, WashStatus::Paid);
        assert_eq!(outcome.progress.as_ref().unwrap().stamps, 1);
        assert!(!outcome.reward_due);
        assert!(outcome
            .whatsapp_link
            .unwrap()
            .starts_with("https://wa.me/5511999990000"));
        assert_eq!(ctl.find_client("99999").unwrap().stamps, 1);
        assert_eq!(fake.rows("client_progress").len(), 1);
    }

    #[tokio::test]
    async fn finalizing_twice_credits_once() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        let job = ctl.add_wash(intake("")).await.unwrap();

        ctl.finalize_wash(&job.id).await.unwrap();
        let again = ctl.finalize_wash(&job.id).await.unwrap();
        assert!(!again.finalized);
        assert_eq!(again.progress.unwrap().stamps, 1);
        assert_eq!(ctl.client_progress()[0].stamps, 1);
    }

    #[tokio::test]
    async fn inactive_program_finalizes_without_progress() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        ctl.save_loyalty(LoyaltyConfig {
            is_active: false,
            ..LoyaltyConfig::default()
        })
        .await
        .unwrap();

        let job = ctl.add_wash(intake("")).await.unwrap();
        let outcome = ctl.finalize_wash(&job.id).await.unwrap();
        assert_eq!(outcome.job.status, WashStatus::Paid);
        assert!(outcome.progress.is_none());
        assert!(ctl.client_progress().is_empty());
        assert!(fake.rows("client_progress").is_empty());
    }

    #[tokio::test]
    async fn toggle_twice_restores_status_without_loyalty() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        let job = ctl.add_wash(intake("")).await.unwrap();

        assert_eq!(
            ctl.toggle_wash_status(&job.id).await.unwrap().status,
            WashStatus::Paid
        );
        assert_eq!(
            ctl.toggle_wash_status(&job.id).await.unwrap().status,
            WashStatus::Pending
        );
        assert!(ctl.client_progress().is_empty());
        assert!(matches!(
            ctl.toggle_wash_status("missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn earnings_and_payout_flow() {
        let fake = FakeSql::new();
        let mut ctl = controller_with(&fake).await;
        let staff = with_staff(&mut ctl, &["Ana"]).await;

        let member = ctl
            .update_earnings(
                &staff[0].id,
                EarningsUpdate {
                    days_worked: 3,
                    daily_rate: 45.0,
                    commission: 15.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(member.unpaid, 150.0);
        assert_eq!(ctl.dashboard().unpaid_staff_total, 150.0);

        let payout = ctl.pay_staff(&staff[0].id).await.unwrap();
        assert_eq!(payout.amount, 150.0);
        assert_eq!(payout.member.unpaid, 0.0);
        assert!(matches!(
            ctl.pay_staff("ghost").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn period_summary_validates_bounds() {
        let fake = FakeSql::new();
        let ctl = controller_with(&fake).await;
        assert!(ctl.period_summary(None, None).is_ok());
        assert!(matches!(
            ctl.period_summary(Some("2026-10-19"), Some("2026-10-01")),
            Err(AppError::Validation { field: "start", .. })
        ));
        assert!(ctl.period_summary(Some("bad"), None).is_err());
    }

    #[tokio::test]
    async fn restart_while_offline_serves_cached_state() {
        let fake = FakeSql::new();
        let cache = Arc::new(db::init_in_memory().unwrap());
        let gateway = Arc::new(Gateway::new(
            Some(fake.clone() as Arc<dyn SqlTransport>),
            cache.clone(),
        ));
        let mut ctl = Controller::bootstrap(gateway).await.unwrap();
        ctl.add_wash(intake("")).await.unwrap();
        ctl.refresh().await.unwrap();

        fake.set_offline(true);
        let gateway = Arc::new(Gateway::new(
            Some(fake.clone() as Arc<dyn SqlTransport>),
            cache,
        ));
        let restarted = Controller::bootstrap(gateway).await.unwrap();
        assert_eq!(restarted.washes().len(), 1);
        assert!(!restarted.gateway.status().online);
    }
}
