//! Error taxonomy for the billing core.

use service_core::error::AppError;
use thiserror::Error;

/// Every failure the billing core can report.
///
/// Business-rule violations abort the enclosing unit of work; storage errors
/// are classified into this taxonomy before they leave the store.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("storage failure: {0}")]
    StorageFailure(#[source] anyhow::Error),
}

impl BillingError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        BillingError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        BillingError::Conflict(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        BillingError::InvalidState(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        BillingError::InvalidInput(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        BillingError::Unavailable(msg.into())
    }

    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        BillingError::StorageFailure(err.into())
    }

    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::NotFound(_) => "not_found",
            BillingError::Conflict(_) => "conflict",
            BillingError::InvalidState(_) => "invalid_state",
            BillingError::InvalidInput(_) => "invalid_input",
            BillingError::Unavailable(_) => "unavailable",
            BillingError::StorageFailure(_) => "storage_failure",
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            BillingError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            BillingError::InvalidState(msg) => AppError::Unprocessable(anyhow::anyhow!(msg)),
            BillingError::Unavailable(msg) => AppError::Unprocessable(anyhow::anyhow!(msg)),
            BillingError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            BillingError::StorageFailure(e) => AppError::DatabaseError(e),
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
