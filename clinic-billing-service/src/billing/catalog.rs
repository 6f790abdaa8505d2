//! Catalog lookups and line-item snapshots.

use crate::billing::financials::{line_subtotal, validate_quantity};
use crate::error::{BillingError, BillingResult};
use crate::models::{BilledService, Service, ServiceLineInput};
use crate::services::BillingTx;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A service can be billed only while it is both activated and available.
pub fn ensure_billable(service: &Service) -> BillingResult<()> {
    if !service.is_activated {
        return Err(BillingError::unavailable(format!(
            "Service '{}' is deactivated",
            service.name
        )));
    }
    if !service.is_available {
        return Err(BillingError::unavailable(format!(
            "Service '{}' is currently unavailable",
            service.name
        )));
    }
    Ok(())
}

/// Look up a service and check that it can be billed.
pub async fn resolve_service(tx: &mut dyn BillingTx, service_id: Uuid) -> BillingResult<Service> {
    let service = tx
        .get_service(service_id)
        .await?
        .ok_or_else(|| BillingError::not_found(format!("Service {} not found", service_id)))?;
    ensure_billable(&service)?;
    Ok(service)
}

/// Freeze the service's current name, category and price onto a new line.
pub fn snapshot_line(
    bill_id: Uuid,
    service: &Service,
    quantity: Decimal,
    now: DateTime<Utc>,
) -> BillingResult<BilledService> {
    Ok(BilledService {
        billed_service_id: Uuid::new_v4(),
        bill_id,
        service_id: service.service_id,
        service_name: service.name.clone(),
        service_category: service.category.clone(),
        service_price_at_time: service.price,
        quantity,
        subtotal: line_subtotal(service.price, quantity)?,
        created_utc: now,
    })
}

/// Validate and price a batch of requested lines. Any failure rejects the
/// whole batch.
pub async fn price_lines(
    tx: &mut dyn BillingTx,
    bill_id: Uuid,
    requested: &[ServiceLineInput],
    now: DateTime<Utc>,
) -> BillingResult<Vec<BilledService>> {
    let mut lines = Vec::with_capacity(requested.len());
    for input in requested {
        validate_quantity(input.quantity)?;
        let service = resolve_service(tx, input.service_id).await?;
        lines.push(snapshot_line(bill_id, &service, input.quantity, now)?);
    }
    Ok(lines)
}
