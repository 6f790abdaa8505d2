use super::analytics::{apply_delta, contribution};
use super::audit::{snapshot, AuditRecorder};
use super::{log_failure, ArchiveBill, ArchivedBill, BillingEngine};
use crate::error::{BillingError, BillingResult};
use crate::models::AuditAction;
use crate::services::record_bill_update;
use serde_json::json;
use tracing::{info, instrument};

impl BillingEngine {
    /// Remove an exported bill from hot storage.
    ///
    /// The negative analytics contribution, the `cold_archived` audit entry
    /// and the deletions share one unit of work, so rollups never diverge
    /// from what is left in storage.
    #[instrument(
        skip(self, input),
        fields(bill_id = %input.bill_id, export_path = %input.export_path, actor = %input.actor)
    )]
    pub async fn archive_bill(&self, input: ArchiveBill) -> BillingResult<ArchivedBill> {
        let result = self.archive_bill_inner(&input).await;
        if let Err(e) = &result {
            log_failure("archive_bill", e);
        }
        result
    }

    async fn archive_bill_inner(&self, input: &ArchiveBill) -> BillingResult<ArchivedBill> {
        if input.export_path.trim().is_empty() {
            return Err(BillingError::invalid_input("Export path is required"));
        }

        let mut tx = self.store.begin().await?;
        tx.set_statement_timeout(self.archive_timeout).await?;

        let bill_id = input.bill_id;
        let bill = tx
            .lock_bill(bill_id)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("Bill {} not found", bill_id)))?;
        let lines = tx.list_billed_services(bill_id).await?;
        let payments = tx.list_payments(bill_id).await?;

        let sales_date = self.day_boundary.day_of(bill.created_utc);
        apply_delta(
            tx.as_mut(),
            sales_date,
            &contribution(&bill, &lines).negate(),
        )
        .await?;

        AuditRecorder::new(&input.actor)
            .record_bill(
                tx.as_mut(),
                bill_id,
                AuditAction::ColdArchived,
                &["bill", "services", "payments"],
                Some(json!({
                    "bill": snapshot(&bill),
                    "services": snapshot(&lines),
                    "payments": snapshot(&payments),
                })),
                Some(json!({ "exportPath": input.export_path })),
            )
            .await?;

        let payments_removed = tx.delete_payments(bill_id).await?;
        for line in &lines {
            tx.delete_billed_service(line.billed_service_id).await?;
        }
        tx.delete_bill(bill_id).await?;
        tx.commit().await?;

        record_bill_update(AuditAction::ColdArchived.as_str());
        info!(
            bill_id = %bill_id,
            sales_date = %sales_date,
            services_removed = lines.len(),
            payments_removed = payments_removed,
            "Bill archived"
        );

        Ok(ArchivedBill {
            bill_id,
            export_path: input.export_path.clone(),
            services_removed: lines.len(),
            payments_removed,
        })
    }
}
