//! Billing core.
//!
//! [`BillingEngine`] owns every bill mutation. Each operation runs in one
//! unit of work opened on the configured [`BillingStore`].

pub mod analytics;
pub mod audit;
pub mod catalog;
pub mod financials;

mod archive;
mod create;
mod payment;
mod queries;
mod update;

use crate::error::{BillingError, BillingResult};
use crate::models::{
    Actor, AnalyticsDelta, BillAuditLog, BilledService, BilledServiceAuditLog,
    CategorySalesAnalytics, DailySalesAnalytics, MedicalBill, PaymentHistory, PaymentMethod,
    QuantityUpdateInput, ServiceLineInput, ServiceSalesAnalytics,
};
use crate::services::{record_analytics_failure, record_error, BillingStore, BillingTx};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

pub use analytics::DayBoundary;
pub use financials::{BillBreakdown, DiscountPolicy, DiscountType};

/// Input for creating a bill.
#[derive(Debug, Clone)]
pub struct CreateBill {
    pub documentation_id: Uuid,
    pub services: Vec<ServiceLineInput>,
    pub notes: Option<String>,
    pub initial_payment_amount: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub consultation_fee: Option<Decimal>,
    pub is_senior_pwd_discount_applied: Option<bool>,
    pub discount_rate: Option<Decimal>,
    /// Delete the documentation if creation fails after it was looked up.
    pub cleanup_documentation_on_failure: bool,
    pub actor: Actor,
}

/// Input for revising a bill.
#[derive(Debug, Clone)]
pub struct UpdateBill {
    pub bill_id: Uuid,
    pub services_to_add: Vec<ServiceLineInput>,
    pub services_to_remove: Vec<Uuid>,
    pub services_to_update: Vec<QuantityUpdateInput>,
    pub is_senior_pwd_discount_applied: Option<bool>,
    pub discount_rate: Option<Decimal>,
    pub notes: Option<String>,
    /// New cumulative amount paid to date.
    pub amount_paid: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_notes: Option<String>,
    pub actor: Actor,
}

impl UpdateBill {
    pub fn new(bill_id: Uuid, actor: Actor) -> Self {
        Self {
            bill_id,
            services_to_add: Vec::new(),
            services_to_remove: Vec::new(),
            services_to_update: Vec::new(),
            is_senior_pwd_discount_applied: None,
            discount_rate: None,
            notes: None,
            amount_paid: None,
            payment_method: None,
            payment_notes: None,
            actor,
        }
    }
}

/// Input for a standalone payment.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub bill_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub actor: Actor,
}

/// Input for cold archival of one bill.
#[derive(Debug, Clone)]
pub struct ArchiveBill {
    pub bill_id: Uuid,
    pub export_path: String,
    pub actor: Actor,
}

/// A bill with everything needed to display it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillDetails {
    pub bill: MedicalBill,
    pub services: Vec<BilledService>,
    pub payments: Vec<PaymentHistory>,
    pub breakdown: BillBreakdown,
    pub display_balance: Decimal,
}

/// What an update touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    pub services_added: usize,
    pub services_removed: usize,
    pub services_updated: usize,
    pub discount_changed: bool,
    pub notes_changed: bool,
    pub payment_changed: bool,
    pub payment_status_changed: bool,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        *self == ChangeSummary::default()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedBill {
    #[serde(flatten)]
    pub details: BillDetails,
    pub changes: ChangeSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedPayment {
    pub payment: PaymentHistory,
    #[serde(flatten)]
    pub details: BillDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedBill {
    pub bill_id: Uuid,
    pub export_path: String,
    pub services_removed: usize,
    pub payments_removed: u64,
}

/// Bill-level and line-level audit entries for one bill.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    pub bill_id: Uuid,
    pub bill_entries: Vec<BillAuditLog>,
    pub service_entries: Vec<BilledServiceAuditLog>,
}

/// One day of rollups.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAnalyticsReport {
    #[serde(flatten)]
    pub summary: DailySalesAnalytics,
    pub services: Vec<ServiceSalesAnalytics>,
    pub categories: Vec<CategorySalesAnalytics>,
}

/// Clinic billing engine.
#[derive(Clone)]
pub struct BillingEngine {
    store: Arc<dyn BillingStore>,
    day_boundary: DayBoundary,
    archive_timeout: Duration,
}

impl BillingEngine {
    pub fn new(
        store: Arc<dyn BillingStore>,
        day_boundary: DayBoundary,
        archive_timeout: Duration,
    ) -> Self {
        Self {
            store,
            day_boundary,
            archive_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn BillingStore> {
        &self.store
    }

    pub fn day_boundary(&self) -> DayBoundary {
        self.day_boundary
    }

    /// Apply an analytics delta in its own unit of work. Failures are
    /// logged and counted, never returned.
    async fn apply_analytics_best_effort(
        &self,
        operation: &'static str,
        bill_id: Uuid,
        date: NaiveDate,
        delta: &AnalyticsDelta,
    ) {
        if delta.is_empty() {
            return;
        }

        let result: BillingResult<()> = async {
            let mut tx = self.store.begin().await?;
            analytics::apply_delta(tx.as_mut(), date, delta).await?;
            tx.commit().await
        }
        .await;

        if let Err(e) = result {
            record_analytics_failure(operation);
            error!(
                bill_id = %bill_id,
                sales_date = %date,
                operation = operation,
                error = %e,
                "Analytics adjustment failed; rollups lag the bill until reconciled"
            );
        }
    }
}

/// Log and count a failed operation. The caller's span carries the bill,
/// documentation and actor fields.
fn log_failure(operation: &'static str, err: &BillingError) {
    record_error(err.kind(), operation);
    match err {
        BillingError::StorageFailure(source) => {
            error!(operation = operation, error = %source, "Billing operation failed")
        }
        other => warn!(
            operation = operation,
            kind = other.kind(),
            error = %other,
            "Billing operation rejected"
        ),
    }
}

/// Senior/PWD pricing needs an identifier on the patient's record.
async fn ensure_senior_pwd_id(
    tx: &mut dyn BillingTx,
    documentation_id: Uuid,
) -> BillingResult<()> {
    let documentation = tx
        .get_documentation(documentation_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Documentation for bill not found"))?;
    let patient = tx.get_patient(documentation.patient_id).await?;

    if !patient.is_some_and(|p| p.has_senior_pwd_id()) {
        return Err(BillingError::invalid_state(
            "Senior/PWD discount requires a valid ID on the patient record",
        ));
    }
    Ok(())
}

/// Build the display view of a bill.
fn bill_details(
    bill: MedicalBill,
    services: Vec<BilledService>,
    payments: Vec<PaymentHistory>,
) -> BillingResult<BillDetails> {
    let breakdown = financials::compute_breakdown(
        services.iter().map(|l| l.subtotal),
        &DiscountPolicy::new(bill.is_senior_pwd_discount_applied, Some(bill.discount_rate)),
        bill.consultation_fee,
    )?;
    let display_balance = bill.display_balance();
    Ok(BillDetails {
        bill,
        services,
        payments,
        breakdown,
        display_balance,
    })
}
