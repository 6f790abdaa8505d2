//! Read-only views of the clinical documentation and patient records that
//! bills attach to. Both are owned by the documentation workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Documentation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentationStatus {
    Draft,
    Finalized,
}

impl DocumentationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentationStatus::Draft => "draft",
            DocumentationStatus::Finalized => "finalized",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "draft" => DocumentationStatus::Draft,
            _ => DocumentationStatus::Finalized,
        }
    }
}

/// Medical documentation (assessment/diagnosis) for one visit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MedicalDocumentation {
    pub documentation_id: Uuid,
    pub patient_id: Uuid,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

impl MedicalDocumentation {
    pub fn status(&self) -> DocumentationStatus {
        DocumentationStatus::from_string(&self.status)
    }
}

/// Patient fields the billing core needs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub patient_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub senior_pwd_id: Option<String>,
}

impl Patient {
    /// True when a senior citizen / PWD identifier is on file.
    pub fn has_senior_pwd_id(&self) -> bool {
        self.senior_pwd_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }
}
