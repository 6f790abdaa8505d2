//! Medical bill model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status, derived from amount paid and total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partially_paid" => PaymentStatus::PartiallyPaid,
            "paid" => PaymentStatus::Paid,
            _ => PaymentStatus::Unpaid,
        }
    }

    /// The only way a status is ever produced.
    ///
    /// Nothing paid is `unpaid` (even for a zero total), anything at or above
    /// the total is `paid`, and everything in between is `partially_paid`.
    pub fn derive(amount_paid: Decimal, total_amount: Decimal) -> Self {
        if amount_paid <= Decimal::ZERO {
            PaymentStatus::Unpaid
        } else if amount_paid >= total_amount {
            PaymentStatus::Paid
        } else {
            PaymentStatus::PartiallyPaid
        }
    }
}

/// Who performed a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub name: String,
    pub role: String,
}

impl Actor {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.role)
    }
}

/// Financial record for one documentation/visit.
///
/// `amount_paid`, `balance` and `payment_status` are a cached projection of
/// the payment ledger and are rebuilt on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MedicalBill {
    pub bill_id: Uuid,
    pub documentation_id: Uuid,
    pub consultation_fee: Decimal,
    pub is_senior_pwd_discount_applied: bool,
    pub discount_rate: Decimal,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub payment_status: String,
    pub notes: Option<String>,
    pub created_by_name: String,
    pub created_by_role: String,
    pub updated_by_name: Option<String>,
    pub updated_by_role: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl MedicalBill {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.payment_status)
    }

    /// Balance as shown to staff: overpayment reads as zero due.
    pub fn display_balance(&self) -> Decimal {
        self.balance.max(Decimal::ZERO)
    }
}
