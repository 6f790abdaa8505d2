//! Storage seam for the billing core.
//!
//! Every mutating billing operation runs inside exactly one [`BillingTx`] and
//! finishes with [`BillingTx::commit`]. Dropping an uncommitted unit of work
//! rolls it back, so a business-rule failure midway through a batch leaves no
//! partial rows behind.

use crate::error::BillingResult;
use crate::models::{
    BillAuditLog, BilledService, BilledServiceAuditLog, CategorySalesAnalytics,
    DailySalesAnalytics, MedicalBill, MedicalDocumentation, Patient, PaymentHistory, Service,
    ServiceDelta, ServiceSalesAnalytics,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// A bill awaiting payment, joined with what the reconciliation screen shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsettledBill {
    pub bill: MedicalBill,
    pub documentation: MedicalDocumentation,
    pub patient: Patient,
}

/// Entry point to persistent state.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Open a unit of work.
    async fn begin(&self) -> BillingResult<Box<dyn BillingTx>>;

    async fn health_check(&self) -> BillingResult<()>;

    /// Bills whose status is not `paid`, oldest first.
    async fn list_unsettled_bills(&self) -> BillingResult<Vec<UnsettledBill>>;

    async fn list_bill_audit_logs(&self, bill_id: Uuid) -> BillingResult<Vec<BillAuditLog>>;

    async fn list_billed_service_audit_logs(
        &self,
        bill_id: Uuid,
    ) -> BillingResult<Vec<BilledServiceAuditLog>>;

    async fn list_daily_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<DailySalesAnalytics>>;

    async fn list_service_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<ServiceSalesAnalytics>>;

    async fn list_category_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<CategorySalesAnalytics>>;
}

/// One atomic unit of work.
#[async_trait]
pub trait BillingTx: Send {
    /// Bound how long any single statement may run.
    async fn set_statement_timeout(&mut self, timeout: Duration) -> BillingResult<()>;

    // Documentation workflow collaborators.
    async fn get_documentation(
        &mut self,
        documentation_id: Uuid,
    ) -> BillingResult<Option<MedicalDocumentation>>;
    async fn delete_documentation(&mut self, documentation_id: Uuid) -> BillingResult<bool>;
    async fn get_patient(&mut self, patient_id: Uuid) -> BillingResult<Option<Patient>>;

    // Catalog.
    async fn get_service(&mut self, service_id: Uuid) -> BillingResult<Option<Service>>;

    // Bills.
    async fn find_bill_by_documentation(
        &mut self,
        documentation_id: Uuid,
    ) -> BillingResult<Option<MedicalBill>>;
    async fn get_bill(&mut self, bill_id: Uuid) -> BillingResult<Option<MedicalBill>>;
    /// Read a bill and hold it against concurrent mutation until commit.
    async fn lock_bill(&mut self, bill_id: Uuid) -> BillingResult<Option<MedicalBill>>;
    async fn insert_bill(&mut self, bill: &MedicalBill) -> BillingResult<()>;
    async fn update_bill(&mut self, bill: &MedicalBill) -> BillingResult<()>;
    async fn delete_bill(&mut self, bill_id: Uuid) -> BillingResult<()>;

    // Line items.
    async fn list_billed_services(&mut self, bill_id: Uuid) -> BillingResult<Vec<BilledService>>;
    async fn insert_billed_service(&mut self, line: &BilledService) -> BillingResult<()>;
    async fn update_billed_service(&mut self, line: &BilledService) -> BillingResult<()>;
    async fn delete_billed_service(&mut self, billed_service_id: Uuid) -> BillingResult<()>;

    // Payment ledger.
    async fn insert_payment(&mut self, payment: &PaymentHistory) -> BillingResult<()>;
    async fn list_payments(&mut self, bill_id: Uuid) -> BillingResult<Vec<PaymentHistory>>;
    async fn sum_payments(&mut self, bill_id: Uuid) -> BillingResult<Decimal>;
    async fn delete_payments(&mut self, bill_id: Uuid) -> BillingResult<u64>;

    // Audit trail.
    async fn insert_bill_audit(&mut self, entry: &BillAuditLog) -> BillingResult<()>;
    async fn insert_billed_service_audit(
        &mut self,
        entry: &BilledServiceAuditLog,
    ) -> BillingResult<()>;

    // Analytics rollups. `lock_*` returns the row (zeroed if new) and holds
    // it until commit so concurrent deltas to the same day serialize.
    async fn lock_daily_analytics(&mut self, date: NaiveDate)
        -> BillingResult<DailySalesAnalytics>;
    async fn save_daily_analytics(&mut self, row: &DailySalesAnalytics) -> BillingResult<()>;
    async fn lock_service_analytics(
        &mut self,
        date: NaiveDate,
        service: &ServiceDelta,
    ) -> BillingResult<ServiceSalesAnalytics>;
    async fn save_service_analytics(&mut self, row: &ServiceSalesAnalytics) -> BillingResult<()>;
    async fn lock_category_analytics(
        &mut self,
        date: NaiveDate,
        service_category: &str,
    ) -> BillingResult<CategorySalesAnalytics>;
    async fn save_category_analytics(&mut self, row: &CategorySalesAnalytics)
        -> BillingResult<()>;

    async fn commit(self: Box<Self>) -> BillingResult<()>;
}
