use super::analytics::{apply_delta, contribution};
use super::audit::{snapshot, AuditRecorder};
use super::catalog::price_lines;
use super::financials::{
    compute_breakdown, normalize_consultation_fee, settle, validate_amount, validate_discount_rate,
    DiscountPolicy,
};
use super::{
    bill_details, ensure_senior_pwd_id, log_failure, BillDetails, BillingEngine, CreateBill,
};
use crate::error::{BillingError, BillingResult};
use crate::models::{
    AuditAction, DocumentationStatus, MedicalBill, MedicalDocumentation, PaymentHistory,
    PaymentMethod,
};
use crate::services::{record_bill_created, record_payment, BillingTx};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

impl BillingEngine {
    /// Create the bill for a finalized documentation.
    ///
    /// Line items, the optional initial payment, audit entries and the
    /// analytics contribution commit together or not at all.
    #[instrument(
        skip(self, input),
        fields(documentation_id = %input.documentation_id, actor = %input.actor)
    )]
    pub async fn create_bill(&self, input: CreateBill) -> BillingResult<BillDetails> {
        let result = self.create_bill_inner(&input).await;
        if let Err(e) = &result {
            log_failure("create_bill", e);
        }
        result
    }

    async fn create_bill_inner(&self, input: &CreateBill) -> BillingResult<BillDetails> {
        let mut tx = self.store.begin().await?;
        load_finalized_documentation(tx.as_mut(), input.documentation_id).await?;

        match self.persist_new_bill(tx, input).await {
            Ok(details) => Ok(details),
            Err(err) => {
                if input.cleanup_documentation_on_failure {
                    self.discard_documentation(input.documentation_id).await;
                }
                Err(err)
            }
        }
    }

    async fn persist_new_bill(
        &self,
        mut tx: Box<dyn BillingTx>,
        input: &CreateBill,
    ) -> BillingResult<BillDetails> {
        if tx
            .find_bill_by_documentation(input.documentation_id)
            .await?
            .is_some()
        {
            return Err(BillingError::conflict(
                "A bill already exists for this documentation",
            ));
        }

        if let Some(rate) = input.discount_rate {
            validate_discount_rate(rate)?;
        }
        let initial_payment = input.initial_payment_amount.unwrap_or(Decimal::ZERO);
        if initial_payment < Decimal::ZERO {
            return Err(BillingError::invalid_input(
                "Initial payment amount cannot be negative",
            ));
        }
        validate_amount("Initial payment amount", initial_payment)?;

        if input.is_senior_pwd_discount_applied == Some(true) {
            ensure_senior_pwd_id(tx.as_mut(), input.documentation_id).await?;
        }

        let now = Utc::now();
        let bill_id = Uuid::new_v4();
        let lines = price_lines(tx.as_mut(), bill_id, &input.services, now).await?;

        let policy = DiscountPolicy::new(
            input.is_senior_pwd_discount_applied.unwrap_or(false),
            input.discount_rate,
        );
        let breakdown = compute_breakdown(
            lines.iter().map(|l| l.subtotal),
            &policy,
            normalize_consultation_fee(input.consultation_fee),
        )?;
        if policy.is_requested() && breakdown.services_subtotal.is_zero() {
            info!("Discount ignored for consultation-only bill");
        }

        if initial_payment > breakdown.total_amount {
            return Err(BillingError::invalid_input(format!(
                "Initial payment {} exceeds total amount {}",
                initial_payment, breakdown.total_amount
            )));
        }

        let (senior_pwd, discount_rate) = policy.stored();
        let unpaid = settle(breakdown.total_amount, Decimal::ZERO);
        let mut bill = MedicalBill {
            bill_id,
            documentation_id: input.documentation_id,
            consultation_fee: breakdown.consultation_fee,
            is_senior_pwd_discount_applied: senior_pwd,
            discount_rate,
            total_amount: breakdown.total_amount,
            amount_paid: unpaid.amount_paid,
            balance: unpaid.balance,
            payment_status: unpaid.payment_status.as_str().to_string(),
            notes: input.notes.clone(),
            created_by_name: input.actor.name.clone(),
            created_by_role: input.actor.role.clone(),
            updated_by_name: None,
            updated_by_role: None,
            created_utc: now,
            updated_utc: now,
        };
        tx.insert_bill(&bill).await?;

        let recorder = AuditRecorder::new(&input.actor);
        for line in &lines {
            tx.insert_billed_service(line).await?;
            recorder.line_added(tx.as_mut(), line).await?;
        }

        let method = input.payment_method.unwrap_or(PaymentMethod::Cash);
        if initial_payment > Decimal::ZERO {
            let payment = PaymentHistory {
                payment_id: Uuid::new_v4(),
                bill_id,
                amount: initial_payment,
                payment_method: method.as_str().to_string(),
                notes: Some("Initial payment".to_string()),
                recorded_by_name: input.actor.name.clone(),
                recorded_by_role: input.actor.role.clone(),
                created_utc: now,
            };
            tx.insert_payment(&payment).await?;
        }

        // Re-read the ledger rather than trusting the requested amount.
        let settlement = settle(bill.total_amount, tx.sum_payments(bill_id).await?);
        if settlement != unpaid {
            bill.amount_paid = settlement.amount_paid;
            bill.balance = settlement.balance;
            bill.payment_status = settlement.payment_status.as_str().to_string();
            tx.update_bill(&bill).await?;
        }

        recorder
            .record_bill(
                tx.as_mut(),
                bill_id,
                AuditAction::Created,
                &[
                    "servicesSubtotal",
                    "discountType",
                    "discountAmount",
                    "consultationFee",
                    "totalAmount",
                    "amountPaid",
                    "balance",
                    "paymentStatus",
                ],
                None,
                Some(json!({
                    "breakdown": snapshot(&breakdown),
                    "amountPaid": bill.amount_paid,
                    "balance": bill.balance,
                    "paymentStatus": bill.payment_status,
                    "serviceCount": lines.len(),
                })),
            )
            .await?;

        let sales_date = self.day_boundary.day_of(bill.created_utc);
        apply_delta(tx.as_mut(), sales_date, &contribution(&bill, &lines)).await?;

        let payments = tx.list_payments(bill_id).await?;
        tx.commit().await?;

        record_bill_created(&bill.payment_status);
        if initial_payment > Decimal::ZERO {
            record_payment(method.as_str(), initial_payment.to_f64().unwrap_or(0.0));
        }
        info!(
            bill_id = %bill_id,
            total_amount = %bill.total_amount,
            payment_status = %bill.payment_status,
            services = lines.len(),
            "Bill created"
        );

        bill_details(bill, lines, payments)
    }

    /// Delete a documentation whose bill could not be created.
    async fn discard_documentation(&self, documentation_id: Uuid) {
        let result: BillingResult<bool> = async {
            let mut tx = self.store.begin().await?;
            let deleted = tx.delete_documentation(documentation_id).await?;
            tx.commit().await?;
            Ok(deleted)
        }
        .await;

        match result {
            Ok(true) => warn!(
                documentation_id = %documentation_id,
                "Documentation removed after failed bill creation"
            ),
            Ok(false) => {}
            Err(e) => error!(
                documentation_id = %documentation_id,
                error = %e,
                "Failed to remove documentation after failed bill creation"
            ),
        }
    }
}

async fn load_finalized_documentation(
    tx: &mut dyn BillingTx,
    documentation_id: Uuid,
) -> BillingResult<MedicalDocumentation> {
    let documentation = tx
        .get_documentation(documentation_id)
        .await?
        .ok_or_else(|| {
            BillingError::not_found(format!("Documentation {} not found", documentation_id))
        })?;

    if documentation.status() == DocumentationStatus::Draft {
        return Err(BillingError::invalid_state(
            "Documentation must be finalized before billing",
        ));
    }

    Ok(documentation)
}
