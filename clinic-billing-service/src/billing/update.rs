use super::analytics::{contribution, revision};
use super::audit::{snapshot, AuditRecorder, ChangeSet};
use super::catalog::price_lines;
use super::financials::{
    compute_breakdown, line_subtotal, round2, settle, validate_amount, validate_discount_rate,
    validate_quantity, DiscountPolicy,
};
use super::{
    bill_details, ensure_senior_pwd_id, log_failure, BillingEngine, ChangeSummary, UpdateBill,
    UpdatedBill,
};
use crate::error::{BillingError, BillingResult};
use crate::models::{AuditAction, BilledService, MedicalBill, PaymentHistory, PaymentMethod};
use crate::services::{record_bill_update, record_payment};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, instrument};
use uuid::Uuid;

impl BillingEngine {
    /// Revise a bill: remove, re-quantify and add line items, change the
    /// discount or notes, and assert a new cumulative amount paid.
    ///
    /// The analytics revision is applied after commit and may lag.
    #[instrument(skip(self, input), fields(bill_id = %input.bill_id, actor = %input.actor))]
    pub async fn update_bill(&self, input: UpdateBill) -> BillingResult<UpdatedBill> {
        let result = self.update_bill_inner(&input).await;
        if let Err(e) = &result {
            log_failure("update_bill", e);
        }
        result
    }

    async fn update_bill_inner(&self, input: &UpdateBill) -> BillingResult<UpdatedBill> {
        if let Some(rate) = input.discount_rate {
            validate_discount_rate(rate)?;
        }
        if let Some(amount_paid) = input.amount_paid {
            if amount_paid < Decimal::ZERO {
                return Err(BillingError::invalid_input("Amount paid cannot be negative"));
            }
            validate_amount("Amount paid", amount_paid)?;
        }

        let mut tx = self.store.begin().await?;
        let bill_id = input.bill_id;
        let before = tx
            .lock_bill(bill_id)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("Bill {} not found", bill_id)))?;
        let lines_before = tx.list_billed_services(bill_id).await?;

        let senior_pwd = input
            .is_senior_pwd_discount_applied
            .unwrap_or(before.is_senior_pwd_discount_applied);
        if senior_pwd {
            ensure_senior_pwd_id(tx.as_mut(), before.documentation_id).await?;
        }

        let recorder = AuditRecorder::new(&input.actor);
        let mut summary = ChangeSummary::default();
        let mut working: HashMap<Uuid, BilledService> = lines_before
            .iter()
            .map(|l| (l.billed_service_id, l.clone()))
            .collect();

        if !input.services_to_remove.is_empty() {
            let requested: BTreeSet<Uuid> = input.services_to_remove.iter().copied().collect();
            let matched: Vec<BilledService> = lines_before
                .iter()
                .filter(|l| requested.contains(&l.billed_service_id))
                .cloned()
                .collect();
            if matched.len() != requested.len() {
                return Err(BillingError::invalid_input(format!(
                    "{} of {} services to remove do not belong to this bill",
                    requested.len() - matched.len(),
                    requested.len()
                )));
            }
            for line in &matched {
                recorder.line_removed(tx.as_mut(), line).await?;
                tx.delete_billed_service(line.billed_service_id).await?;
                working.remove(&line.billed_service_id);
            }
            summary.services_removed = matched.len();
        }

        for change in &input.services_to_update {
            let current = working.get(&change.billed_service_id).cloned().ok_or_else(|| {
                BillingError::not_found(format!(
                    "Billed service {} not found on this bill",
                    change.billed_service_id
                ))
            })?;
            validate_quantity(change.new_quantity)?;
            if current.quantity == change.new_quantity {
                continue;
            }

            let updated = BilledService {
                quantity: change.new_quantity,
                subtotal: line_subtotal(current.service_price_at_time, change.new_quantity)?,
                ..current.clone()
            };
            tx.update_billed_service(&updated).await?;
            recorder
                .line_quantity_updated(tx.as_mut(), &current, &updated)
                .await?;
            working.insert(updated.billed_service_id, updated);
            summary.services_updated += 1;
        }

        let now = Utc::now();
        if !input.services_to_add.is_empty() {
            let added = price_lines(tx.as_mut(), bill_id, &input.services_to_add, now).await?;
            for line in &added {
                tx.insert_billed_service(line).await?;
                recorder.line_added(tx.as_mut(), line).await?;
            }
            summary.services_added = added.len();
        }

        // Price from what storage now holds, not from the deltas above.
        let lines_after = tx.list_billed_services(bill_id).await?;
        let policy = DiscountPolicy::new(
            senior_pwd,
            Some(input.discount_rate.unwrap_or(before.discount_rate)),
        );
        let breakdown = compute_breakdown(
            lines_after.iter().map(|l| l.subtotal),
            &policy,
            before.consultation_fee,
        )?;

        let method = input.payment_method.unwrap_or(PaymentMethod::Cash);
        let mut new_payment: Option<PaymentHistory> = None;
        if let Some(target) = input.amount_paid {
            let recorded = tx.sum_payments(bill_id).await?;
            let delta = round2(target - recorded);
            if delta < Decimal::ZERO {
                return Err(BillingError::invalid_input(format!(
                    "Amount paid {} is below payments already recorded ({})",
                    target, recorded
                )));
            }
            if delta > Decimal::ZERO && target > breakdown.total_amount {
                return Err(BillingError::invalid_input(format!(
                    "Amount paid {} exceeds total amount {}",
                    target, breakdown.total_amount
                )));
            }
            if delta > Decimal::ZERO {
                let payment = PaymentHistory {
                    payment_id: Uuid::new_v4(),
                    bill_id,
                    amount: delta,
                    payment_method: method.as_str().to_string(),
                    notes: input.payment_notes.clone(),
                    recorded_by_name: input.actor.name.clone(),
                    recorded_by_role: input.actor.role.clone(),
                    created_utc: now,
                };
                tx.insert_payment(&payment).await?;
                new_payment = Some(payment);
            }
        }
        let settlement = settle(breakdown.total_amount, tx.sum_payments(bill_id).await?);

        let (stored_senior_pwd, stored_rate) = policy.stored();
        let mut after = MedicalBill {
            is_senior_pwd_discount_applied: stored_senior_pwd,
            discount_rate: stored_rate,
            total_amount: breakdown.total_amount,
            amount_paid: settlement.amount_paid,
            balance: settlement.balance,
            payment_status: settlement.payment_status.as_str().to_string(),
            ..before.clone()
        };
        if let Some(notes) = &input.notes {
            after.notes = Some(notes.clone());
        }

        let mut changes = ChangeSet::new();
        if summary.services_added + summary.services_removed + summary.services_updated > 0 {
            changes.record("services", snapshot(&lines_before), snapshot(&lines_after));
        }
        summary.discount_changed = changes.record_if_changed(
            "discount",
            &DiscountSnapshot::of(&before),
            &DiscountSnapshot::of(&after),
        );
        changes.record_if_changed("totalAmount", &before.total_amount, &after.total_amount);
        changes.record_if_changed("balance", &before.balance, &after.balance);
        summary.payment_status_changed =
            changes.record_if_changed("paymentStatus", &before.payment_status, &after.payment_status);
        changes.record_if_changed("amountPaid", &before.amount_paid, &after.amount_paid);
        summary.payment_changed = new_payment.is_some();
        summary.notes_changed = changes.record_if_changed("notes", &before.notes, &after.notes);

        if changes.is_empty() {
            debug!("Update left the bill unchanged");
            let payments = tx.list_payments(bill_id).await?;
            return Ok(UpdatedBill {
                details: bill_details(before, lines_after, payments)?,
                changes: ChangeSummary::default(),
            });
        }

        after.updated_by_name = Some(input.actor.name.clone());
        after.updated_by_role = Some(input.actor.role.clone());
        after.updated_utc = now;
        tx.update_bill(&after).await?;

        let action = if summary.payment_changed {
            AuditAction::PaymentRecorded
        } else {
            AuditAction::Updated
        };
        recorder
            .record_bill_changes(tx.as_mut(), bill_id, action, changes)
            .await?;

        let payments = tx.list_payments(bill_id).await?;
        tx.commit().await?;

        record_bill_update(action.as_str());
        if let Some(payment) = &new_payment {
            record_payment(&payment.payment_method, payment.amount.to_f64().unwrap_or(0.0));
        }
        info!(
            bill_id = %bill_id,
            total_amount = %after.total_amount,
            amount_paid = %after.amount_paid,
            payment_status = %after.payment_status,
            added = summary.services_added,
            removed = summary.services_removed,
            updated = summary.services_updated,
            "Bill updated"
        );

        let delta = revision(
            &contribution(&before, &lines_before),
            contribution(&after, &lines_after),
        );
        self.apply_analytics_best_effort(
            "update_bill",
            bill_id,
            self.day_boundary.day_of(before.created_utc),
            &delta,
        )
        .await;

        Ok(UpdatedBill {
            details: bill_details(after, lines_after, payments)?,
            changes: summary,
        })
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiscountSnapshot {
    is_senior_pwd_discount_applied: bool,
    discount_rate: Decimal,
}

impl DiscountSnapshot {
    fn of(bill: &MedicalBill) -> Self {
        Self {
            is_senior_pwd_discount_applied: bill.is_senior_pwd_discount_applied,
            discount_rate: bill.discount_rate,
        }
    }
}
