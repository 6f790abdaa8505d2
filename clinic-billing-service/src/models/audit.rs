//! Audit log models for bills and billed services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Audit action tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Added,
    Removed,
    QuantityUpdated,
    PaymentRecorded,
    ColdArchived,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Added => "added",
            AuditAction::Removed => "removed",
            AuditAction::QuantityUpdated => "quantity_updated",
            AuditAction::PaymentRecorded => "payment_recorded",
            AuditAction::ColdArchived => "cold_archived",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "created" => AuditAction::Created,
            "added" => AuditAction::Added,
            "removed" => AuditAction::Removed,
            "quantity_updated" => AuditAction::QuantityUpdated,
            "payment_recorded" => AuditAction::PaymentRecorded,
            "cold_archived" => AuditAction::ColdArchived,
            _ => AuditAction::Updated,
        }
    }
}

/// Bill-level audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BillAuditLog {
    pub audit_id: Uuid,
    pub bill_id: Uuid,
    pub action: String,
    /// Comma-joined field names.
    pub fields_changed: String,
    pub previous_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub actor_name: String,
    pub actor_role: String,
    pub created_utc: DateTime<Utc>,
}

/// Line-item audit entry. Outlives the line it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BilledServiceAuditLog {
    pub audit_id: Uuid,
    pub billed_service_id: Uuid,
    pub bill_id: Uuid,
    pub action: String,
    pub fields_changed: String,
    pub previous_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub actor_name: String,
    pub actor_role: String,
    pub created_utc: DateTime<Utc>,
}

impl BillAuditLog {
    pub fn action(&self) -> AuditAction {
        AuditAction::from_string(&self.action)
    }

    pub fn fields(&self) -> Vec<&str> {
        split_fields(&self.fields_changed)
    }
}

impl BilledServiceAuditLog {
    pub fn action(&self) -> AuditAction {
        AuditAction::from_string(&self.action)
    }

    pub fn fields(&self) -> Vec<&str> {
        split_fields(&self.fields_changed)
    }
}

fn split_fields(joined: &str) -> Vec<&str> {
    joined.split(',').filter(|f| !f.is_empty()).collect()
}
