//! Service catalog model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Clinical category of a billable service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Consultation,
    Laboratory,
    Imaging,
    Procedure,
    Vaccination,
    Medication,
    Dental,
    Other,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Consultation => "consultation",
            ServiceCategory::Laboratory => "laboratory",
            ServiceCategory::Imaging => "imaging",
            ServiceCategory::Procedure => "procedure",
            ServiceCategory::Vaccination => "vaccination",
            ServiceCategory::Medication => "medication",
            ServiceCategory::Dental => "dental",
            ServiceCategory::Other => "other",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "consultation" => ServiceCategory::Consultation,
            "laboratory" => ServiceCategory::Laboratory,
            "imaging" => ServiceCategory::Imaging,
            "procedure" => ServiceCategory::Procedure,
            "vaccination" => ServiceCategory::Vaccination,
            "medication" => ServiceCategory::Medication,
            "dental" => ServiceCategory::Dental,
            _ => ServiceCategory::Other,
        }
    }
}

/// Catalog entry. Billed line items snapshot name, category and price, so
/// later edits here never reach existing bills.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub service_id: Uuid,
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub is_activated: bool,
    pub is_available: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Service {
    pub fn category(&self) -> ServiceCategory {
        ServiceCategory::from_string(&self.category)
    }
}
