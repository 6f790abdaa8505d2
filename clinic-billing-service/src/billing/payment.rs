use super::audit::{snapshot, AuditRecorder, ChangeSet};
use super::financials::{settle, validate_amount};
use super::{bill_details, log_failure, BillingEngine, RecordPayment, RecordedPayment};
use crate::error::{BillingError, BillingResult};
use crate::models::{AnalyticsDelta, AuditAction, MedicalBill, PaymentHistory, StatusBucketDeltas};
use crate::services::{record_bill_update, record_payment};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

impl BillingEngine {
    /// Append a payment to a bill's ledger and rebuild its settlement.
    #[instrument(
        skip(self, input),
        fields(bill_id = %input.bill_id, amount = %input.amount, actor = %input.actor)
    )]
    pub async fn record_payment(&self, input: RecordPayment) -> BillingResult<RecordedPayment> {
        let result = self.record_payment_inner(&input).await;
        if let Err(e) = &result {
            log_failure("record_payment", e);
        }
        result
    }

    async fn record_payment_inner(&self, input: &RecordPayment) -> BillingResult<RecordedPayment> {
        if input.amount <= Decimal::ZERO {
            return Err(BillingError::invalid_input(
                "Payment amount must be greater than zero",
            ));
        }
        validate_amount("Payment amount", input.amount)?;

        let mut tx = self.store.begin().await?;
        let bill_id = input.bill_id;
        let before = tx
            .lock_bill(bill_id)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("Bill {} not found", bill_id)))?;

        let recorded = tx.sum_payments(bill_id).await?;
        let outstanding = before.total_amount - recorded;
        if input.amount > outstanding {
            return Err(BillingError::invalid_input(format!(
                "Payment {} exceeds outstanding balance {}",
                input.amount,
                outstanding.max(Decimal::ZERO)
            )));
        }

        let now = Utc::now();
        let payment = PaymentHistory {
            payment_id: Uuid::new_v4(),
            bill_id,
            amount: input.amount,
            payment_method: input.payment_method.as_str().to_string(),
            notes: input.notes.clone(),
            recorded_by_name: input.actor.name.clone(),
            recorded_by_role: input.actor.role.clone(),
            created_utc: now,
        };
        tx.insert_payment(&payment).await?;

        let settlement = settle(before.total_amount, tx.sum_payments(bill_id).await?);
        let after = MedicalBill {
            amount_paid: settlement.amount_paid,
            balance: settlement.balance,
            payment_status: settlement.payment_status.as_str().to_string(),
            updated_by_name: Some(input.actor.name.clone()),
            updated_by_role: Some(input.actor.role.clone()),
            updated_utc: now,
            ..before.clone()
        };
        tx.update_bill(&after).await?;

        let mut changes = ChangeSet::new();
        changes.record("amountPaid", snapshot(&before.amount_paid), snapshot(&after.amount_paid));
        changes.record("balance", snapshot(&before.balance), snapshot(&after.balance));
        changes.record(
            "paymentStatus",
            snapshot(&before.payment_status),
            snapshot(&after.payment_status),
        );
        changes.record("payment", serde_json::Value::Null, snapshot(&payment));
        AuditRecorder::new(&input.actor)
            .record_bill_changes(tx.as_mut(), bill_id, AuditAction::PaymentRecorded, changes)
            .await?;

        let lines = tx.list_billed_services(bill_id).await?;
        let payments = tx.list_payments(bill_id).await?;
        tx.commit().await?;

        record_bill_update(AuditAction::PaymentRecorded.as_str());
        record_payment(&payment.payment_method, payment.amount.to_f64().unwrap_or(0.0));
        info!(
            bill_id = %bill_id,
            payment_id = %payment.payment_id,
            amount_paid = %after.amount_paid,
            payment_status = %after.payment_status,
            "Payment recorded"
        );

        // Only the status bucket can move; revenue is unchanged by a payment.
        let delta = AnalyticsDelta {
            status: StatusBucketDeltas::transition(before.status(), after.status()),
            ..Default::default()
        };
        self.apply_analytics_best_effort(
            "record_payment",
            bill_id,
            self.day_boundary.day_of(before.created_utc),
            &delta,
        )
        .await;

        Ok(RecordedPayment {
            payment,
            details: bill_details(after, lines, payments)?,
        })
    }
}
