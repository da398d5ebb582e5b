//! Cash-flow ledger, dashboard figures and staff earnings.
//!
//! Income counts only PAID washes; expenses count regardless of status.
//! Period bounds are inclusive calendar days compared as `YYYY-MM-DD`
//! strings, which sort chronologically.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data_helpers::{parse_day, today};
use crate::error::{AppError, Result};
use crate::models::{
    Expense, ExpenseStatus, PaymentMethod, StaffMember, VehicleType, WashJob, WashStatus,
};

/// Expense form payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDraft {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub amount: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub status: Option<ExpenseStatus>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub installments: Option<i64>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn validate_expense(draft: ExpenseDraft) -> Result<Expense> {
    let description = draft.description.trim().to_string();
    if description.is_empty() {
        return Err(AppError::validation("description", "Description is required"));
    }
    let amount = draft
        .amount
        .ok_or_else(|| AppError::validation("amount", "Amount is required"))?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::validation("amount", "Amount must be greater than zero"));
    }
    let payment_method = draft
        .payment_method
        .ok_or_else(|| AppError::validation("paymentMethod", "Payment method is required"))?;
    let date = match trimmed(draft.date) {
        Some(date) if parse_day(&date).is_some() => date,
        Some(_) => return Err(AppError::validation("date", "Date must be YYYY-MM-DD")),
        None => today(),
    };

    // Installments only mean something for credit card payments.
    let installments = match payment_method {
        PaymentMethod::CreditCard => match draft.installments {
            Some(n) if n < 1 => {
                return Err(AppError::validation(
                    "installments",
                    "Installments must be at least 1",
                ))
            }
            Some(n) => Some(n),
            None => Some(1),
        },
        _ => None,
    };
    let is_card = matches!(
        payment_method,
        PaymentMethod::CreditCard | PaymentMethod::DebitCard
    );

    let category = draft.category.trim();
    Ok(Expense {
        id: Uuid::new_v4().to_string(),
        category: if category.is_empty() {
            "Geral".to_string()
        } else {
            category.to_string()
        },
        description,
        amount,
        date,
        status: draft.status.unwrap_or(ExpenseStatus::Paid),
        payment_method,
        installments,
        operator: trimmed(draft.operator).filter(|_| is_card),
        brand: trimmed(draft.brand).filter(|_| is_card),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub start: String,
    pub end: String,
    pub total_income: f64,
    pub total_spent: f64,
    pub balance: f64,
    pub paid_washes: Vec<WashJob>,
    pub expenses: Vec<Expense>,
}

fn in_period(date: &str, start: &str, end: &str) -> bool {
    date >= start && date <= end
}

pub fn period_summary(
    washes: &[WashJob],
    expenses: &[Expense],
    start: &str,
    end: &str,
) -> PeriodSummary {
    let paid_washes: Vec<WashJob> = washes
        .iter()
        .filter(|w| w.status == WashStatus::Paid && in_period(&w.date, start, end))
        .cloned()
        .collect();
    let expenses: Vec<Expense> = expenses
        .iter()
        .filter(|e| in_period(&e.date, start, end))
        .cloned()
        .collect();

    let total_income: f64 = paid_washes.iter().map(|w| w.price).sum();
    let total_spent: f64 = expenses.iter().map(|e| e.amount).sum();

    PeriodSummary {
        start: start.to_string(),
        end: end.to_string(),
        total_income,
        total_spent,
        balance: total_income - total_spent,
        paid_washes,
        expenses,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleMix {
    pub car: usize,
    pub motorcycle: usize,
    pub truck: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub revenue_total: f64,
    pub expenses_total: f64,
    pub profit: f64,
    pub wash_count: usize,
    pub average_ticket: f64,
    pub vehicle_mix: VehicleMix,
    pub active_staff: usize,
    pub unpaid_staff_total: f64,
}

pub fn dashboard_summary(
    washes: &[WashJob],
    expenses: &[Expense],
    staff: &[StaffMember],
) -> DashboardSummary {
    let revenue_total: f64 = washes.iter().map(|w| w.price).sum();
    let expenses_total: f64 = expenses.iter().map(|e| e.amount).sum();
    let wash_count = washes.len();
    let count = |kind: VehicleType| washes.iter().filter(|w| w.vehicle_type == kind).count();

    DashboardSummary {
        revenue_total,
        expenses_total,
        profit: revenue_total - expenses_total,
        wash_count,
        average_ticket: if wash_count == 0 {
            0.0
        } else {
            revenue_total / wash_count as f64
        },
        vehicle_mix: VehicleMix {
            car: count(VehicleType::Car),
            motorcycle: count(VehicleType::Motorcycle),
            truck: count(VehicleType::Truck),
        },
        active_staff: staff.iter().filter(|s| s.is_active).count(),
        unpaid_staff_total: staff.iter().map(|s| s.unpaid).sum(),
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsUpdate {
    pub days_worked: i64,
    pub daily_rate: f64,
    #[serde(default)]
    pub commission: f64,
}

impl EarningsUpdate {
    pub fn validate(&self) -> Result<()> {
        if self.days_worked < 0 {
            return Err(AppError::validation("daysWorked", "Days worked cannot be negative"));
        }
        if !self.daily_rate.is_finite() || self.daily_rate < 0.0 {
            return Err(AppError::validation("dailyRate", "Daily rate cannot be negative"));
        }
        if !self.commission.is_finite() || self.commission < 0.0 {
            return Err(AppError::validation("commission", "Commission cannot be negative"));
        }
        Ok(())
    }
}

/// Set the worked days, daily rate and commission; the unpaid balance is
/// recomputed from them.
pub fn set_earnings(member: &mut StaffMember, update: EarningsUpdate) {
    member.days_worked = update.days_worked;
    member.daily_rate = update.daily_rate;
    member.commission = update.commission;
    member.unpaid = update.days_worked as f64 * update.daily_rate + update.commission;
}

/// Pay out: unpaid balance, worked days and commission go back to zero.
pub fn pay_out(member: &mut StaffMember) -> f64 {
    let paid = member.unpaid;
    member.unpaid = 0.0;
    member.days_worked = 0;
    member.commission = 0.0;
    paid
}
