use super::{bill_details, log_failure, AuditTrail, BillDetails, BillingEngine, DailyAnalyticsReport};
use crate::error::{BillingError, BillingResult};
use crate::models::PaymentHistory;
use crate::services::UnsettledBill;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Longest range the daily analytics query serves.
pub const MAX_ANALYTICS_RANGE_DAYS: i64 = 366;

impl BillingEngine {
    /// Bill with line items, ledger and display balance.
    #[instrument(skip(self), fields(bill_id = %bill_id))]
    pub async fn get_bill(&self, bill_id: Uuid) -> BillingResult<BillDetails> {
        let result: BillingResult<BillDetails> = async {
            let mut tx = self.store.begin().await?;
            let bill = tx
                .get_bill(bill_id)
                .await?
                .ok_or_else(|| BillingError::not_found(format!("Bill {} not found", bill_id)))?;
            let lines = tx.list_billed_services(bill_id).await?;
            let payments = tx.list_payments(bill_id).await?;
            bill_details(bill, lines, payments)
        }
        .await;

        if let Err(e) = &result {
            log_failure("get_bill", e);
        }
        result
    }

    /// Ledger entries of a bill, oldest first.
    #[instrument(skip(self), fields(bill_id = %bill_id))]
    pub async fn payment_history(&self, bill_id: Uuid) -> BillingResult<Vec<PaymentHistory>> {
        let result: BillingResult<Vec<PaymentHistory>> = async {
            let mut tx = self.store.begin().await?;
            if tx.get_bill(bill_id).await?.is_none() {
                return Err(BillingError::not_found(format!("Bill {} not found", bill_id)));
            }
            let mut payments = tx.list_payments(bill_id).await?;
            payments.sort_by_key(|p| p.created_utc);
            Ok(payments)
        }
        .await;

        if let Err(e) = &result {
            log_failure("payment_history", e);
        }
        result
    }

    /// Audit entries survive archival, so an unknown bill yields an empty trail.
    #[instrument(skip(self), fields(bill_id = %bill_id))]
    pub async fn audit_trail(&self, bill_id: Uuid) -> BillingResult<AuditTrail> {
        let bill_entries = self.store.list_bill_audit_logs(bill_id).await;
        let service_entries = self.store.list_billed_service_audit_logs(bill_id).await;

        match (bill_entries, service_entries) {
            (Ok(bill_entries), Ok(service_entries)) => Ok(AuditTrail {
                bill_id,
                bill_entries,
                service_entries,
            }),
            (Err(e), _) | (_, Err(e)) => {
                log_failure("audit_trail", &e);
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn unsettled_bills(&self) -> BillingResult<Vec<UnsettledBill>> {
        self.store.list_unsettled_bills().await.inspect_err(|e| {
            log_failure("unsettled_bills", e);
        })
    }

    /// Daily rollups for an inclusive date range, each with its per-service
    /// and per-category rows.
    #[instrument(skip(self), fields(start = %start, end = %end))]
    pub async fn daily_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<DailyAnalyticsReport>> {
        let result = self.daily_analytics_inner(start, end).await;
        if let Err(e) = &result {
            log_failure("daily_analytics", e);
        }
        result
    }

    async fn daily_analytics_inner(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<DailyAnalyticsReport>> {
        if start > end {
            return Err(BillingError::invalid_input("Start date must not be after end date"));
        }
        if (end - start).num_days() >= MAX_ANALYTICS_RANGE_DAYS {
            return Err(BillingError::invalid_input(format!(
                "Date range cannot exceed {} days",
                MAX_ANALYTICS_RANGE_DAYS
            )));
        }

        let days = self.store.list_daily_analytics(start, end).await?;
        let mut services: HashMap<NaiveDate, Vec<_>> = HashMap::new();
        for row in self.store.list_service_analytics(start, end).await? {
            services.entry(row.sales_date).or_default().push(row);
        }
        let mut categories: HashMap<NaiveDate, Vec<_>> = HashMap::new();
        for row in self.store.list_category_analytics(start, end).await? {
            categories.entry(row.sales_date).or_default().push(row);
        }

        Ok(days
            .into_iter()
            .map(|summary| DailyAnalyticsReport {
                services: services.remove(&summary.sales_date).unwrap_or_default(),
                categories: categories.remove(&summary.sales_date).unwrap_or_default(),
                summary,
            })
            .collect())
    }
}
