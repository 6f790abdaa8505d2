//! Audit trail recorder.
//!
//! Each mutation site writes its own entry through [`AuditRecorder`] in the
//! same unit of work as the change it describes. Batched line-item changes
//! get one entry per item.

use crate::error::BillingResult;
use crate::models::{Actor, AuditAction, BillAuditLog, BilledService, BilledServiceAuditLog};
use crate::services::BillingTx;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Serialize a snapshot; unserializable values degrade to `null`.
pub fn snapshot<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Field names plus matching previous/new fragments for one audit entry.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    fields: Vec<&'static str>,
    previous: Map<String, Value>,
    new: Map<String, Value>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, field: &'static str, previous: Value, new: Value) {
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
        self.previous.insert(field.to_string(), previous);
        self.new.insert(field.to_string(), new);
    }

    /// Record only when the two values differ.
    pub fn record_if_changed<T: Serialize + PartialEq>(
        &mut self,
        field: &'static str,
        previous: &T,
        new: &T,
    ) -> bool {
        if previous == new {
            return false;
        }
        self.record(field, snapshot(previous), snapshot(new));
        true
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| *f == field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    pub fn into_parts(self) -> (Vec<&'static str>, Value, Value) {
        (
            self.fields,
            Value::Object(self.previous),
            Value::Object(self.new),
        )
    }
}

/// Writes audit rows on behalf of one actor.
pub struct AuditRecorder<'a> {
    actor: &'a Actor,
}

impl<'a> AuditRecorder<'a> {
    pub fn new(actor: &'a Actor) -> Self {
        Self { actor }
    }

    pub async fn record_bill(
        &self,
        tx: &mut dyn BillingTx,
        bill_id: Uuid,
        action: AuditAction,
        fields: &[&str],
        previous: Option<Value>,
        new: Option<Value>,
    ) -> BillingResult<BillAuditLog> {
        let entry = BillAuditLog {
            audit_id: Uuid::new_v4(),
            bill_id,
            action: action.as_str().to_string(),
            fields_changed: fields.join(","),
            previous_data: previous,
            new_data: new,
            actor_name: self.actor.name.clone(),
            actor_role: self.actor.role.clone(),
            created_utc: Utc::now(),
        };
        tx.insert_bill_audit(&entry).await?;
        Ok(entry)
    }

    /// Consolidated bill entry from a [`ChangeSet`].
    pub async fn record_bill_changes(
        &self,
        tx: &mut dyn BillingTx,
        bill_id: Uuid,
        action: AuditAction,
        changes: ChangeSet,
    ) -> BillingResult<BillAuditLog> {
        let (fields, previous, new) = changes.into_parts();
        self.record_bill(tx, bill_id, action, &fields, Some(previous), Some(new))
            .await
    }

    pub async fn record_line(
        &self,
        tx: &mut dyn BillingTx,
        line: &BilledService,
        action: AuditAction,
        fields: &[&str],
        previous: Option<Value>,
        new: Option<Value>,
    ) -> BillingResult<BilledServiceAuditLog> {
        let entry = BilledServiceAuditLog {
            audit_id: Uuid::new_v4(),
            billed_service_id: line.billed_service_id,
            bill_id: line.bill_id,
            action: action.as_str().to_string(),
            fields_changed: fields.join(","),
            previous_data: previous,
            new_data: new,
            actor_name: self.actor.name.clone(),
            actor_role: self.actor.role.clone(),
            created_utc: Utc::now(),
        };
        tx.insert_billed_service_audit(&entry).await?;
        Ok(entry)
    }

    /// A line was put on the bill; the full row is the new data.
    pub async fn line_added(
        &self,
        tx: &mut dyn BillingTx,
        line: &BilledService,
    ) -> BillingResult<BilledServiceAuditLog> {
        self.record_line(
            tx,
            line,
            AuditAction::Added,
            &LINE_FIELDS,
            None,
            Some(snapshot(line)),
        )
        .await
    }

    /// A line is about to be deleted; the full row is the previous data.
    pub async fn line_removed(
        &self,
        tx: &mut dyn BillingTx,
        line: &BilledService,
    ) -> BillingResult<BilledServiceAuditLog> {
        self.record_line(
            tx,
            line,
            AuditAction::Removed,
            &LINE_FIELDS,
            Some(snapshot(line)),
            None,
        )
        .await
    }

    pub async fn line_quantity_updated(
        &self,
        tx: &mut dyn BillingTx,
        before: &BilledService,
        after: &BilledService,
    ) -> BillingResult<BilledServiceAuditLog> {
        let previous = serde_json::json!({
            "quantity": before.quantity,
            "subtotal": before.subtotal,
        });
        let new = serde_json::json!({
            "quantity": after.quantity,
            "subtotal": after.subtotal,
        });
        self.record_line(
            tx,
            after,
            AuditAction::QuantityUpdated,
            &["quantity", "subtotal"],
            Some(previous),
            Some(new),
        )
        .await
    }
}

const LINE_FIELDS: [&str; 5] = [
    "serviceId",
    "serviceName",
    "servicePriceAtTime",
    "quantity",
    "subtotal",
];
