//! Plain records shared by the gateway, the controller and the HTTP surface.
//!
//! Field names serialize as camelCase, the shape the view layer already
//! consumes. Enum variants keep the upper-case / Portuguese literals that are
//! stored in the remote tables.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wash jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WashStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PAID")]
    Paid,
}

impl WashStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WashStatus::Pending => "PENDING",
            WashStatus::Paid => "PAID",
        }
    }

    /// Parse a stored status. Legacy `COMPLETED` rows count as paid.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(WashStatus::Pending),
            "PAID" | "COMPLETED" => Some(WashStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    #[serde(rename = "carro", alias = "car")]
    Car,
    #[serde(rename = "moto", alias = "motorcycle")]
    Motorcycle,
    #[serde(rename = "caminhao", alias = "truck")]
    Truck,
}

impl VehicleType {
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleType::Car => "carro",
            VehicleType::Motorcycle => "moto",
            VehicleType::Truck => "caminhao",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "carro" | "car" => Some(VehicleType::Car),
            "moto" | "motorcycle" => Some(VehicleType::Motorcycle),
            "caminhao" | "caminhão" | "truck" => Some(VehicleType::Truck),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WashJob {
    pub id: String,
    pub client_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_phone: Option<String>,
    pub plate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Service type label chosen at intake (e.g. "Interior & exterior").
    #[serde(rename = "type")]
    pub service_type: String,
    pub status: WashStatus,
    pub assigned_staff: String,
    pub price: f64,
    #[serde(default)]
    pub services: Vec<String>,
    pub vehicle_type: VehicleType,
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
}

// ---------------------------------------------------------------------------
// Staff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub queue_position: i64,
    pub daily_rate: f64,
    #[serde(default)]
    pub commission: f64,
    pub unpaid: f64,
    pub days_worked: i64,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseStatus {
    #[serde(rename = "PAID")]
    Paid,
    #[serde(rename = "PENDING")]
    Pending,
}

impl ExpenseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseStatus::Paid => "PAID",
            ExpenseStatus::Pending => "PENDING",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PAID" => Some(ExpenseStatus::Paid),
            "PENDING" => Some(ExpenseStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "Dinheiro", alias = "cash")]
    Cash,
    #[serde(rename = "PIX", alias = "pix")]
    Pix,
    #[serde(rename = "Cartão de Crédito", alias = "credit_card")]
    CreditCard,
    #[serde(rename = "Cartão de Débito", alias = "debit_card")]
    DebitCard,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Dinheiro",
            PaymentMethod::Pix => "PIX",
            PaymentMethod::CreditCard => "Cartão de Crédito",
            PaymentMethod::DebitCard => "Cartão de Débito",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Dinheiro" | "cash" => Some(PaymentMethod::Cash),
            "PIX" | "pix" => Some(PaymentMethod::Pix),
            "Cartão de Crédito" | "credit_card" => Some(PaymentMethod::CreditCard),
            "Cartão de Débito" | "debit_card" => Some(PaymentMethod::DebitCard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub category: String,
    pub description: String,
    pub amount: f64,
    pub date: String,
    pub status: ExpenseStatus,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installments: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

// ---------------------------------------------------------------------------
// Loyalty
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyConfig {
    pub theme: String,
    pub stamps_required: i64,
    pub reward_description: String,
    pub is_active: bool,
    pub company_name: String,
    pub company_subtitle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_logo: Option<String>,
    pub stamp_icon: String,
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            theme: "grad-ocean".into(),
            stamps_required: 10,
            reward_description: "Free premium wash".into(),
            is_active: true,
            company_name: "Lava Jato Pro".into(),
            company_subtitle: "Quality in every detail".into(),
            company_logo: None,
            stamp_icon: "water_drop".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProgress {
    pub client_key: String,
    pub stamps: i64,
    pub last_wash_date: String,
    #[serde(default)]
    pub phone: String,
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    #[serde(rename = "LAVADOR")]
    Washer,
}
