//! Analytics aggregator: builds per-bill contributions and applies relative
//! deltas to the daily rollups.

use crate::error::{BillingError, BillingResult};
use crate::models::{
    AnalyticsDelta, BilledService, CategoryDelta, MedicalBill, ServiceDelta, StatusBucketDeltas,
};
use crate::services::BillingTx;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

/// Calendar-day policy for bucketing bills into daily rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl DayBoundary {
    pub fn from_offset_minutes(minutes: i32) -> BillingResult<Self> {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                BillingError::invalid_input(format!("Invalid UTC offset: {} minutes", minutes))
            })?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }
}

/// What one bill contributes to its creation day.
pub fn contribution(bill: &MedicalBill, lines: &[BilledService]) -> AnalyticsDelta {
    let mut services: BTreeMap<Uuid, ServiceDelta> = BTreeMap::new();
    let mut categories: BTreeMap<String, CategoryDelta> = BTreeMap::new();

    for line in lines {
        let service = services
            .entry(line.service_id)
            .or_insert_with(|| ServiceDelta {
                service_id: line.service_id,
                service_name: line.service_name.clone(),
                service_category: line.service_category.clone(),
                revenue: Decimal::ZERO,
                quantity: Decimal::ZERO,
            });
        service.revenue += line.subtotal;
        service.quantity += line.quantity;

        let category = categories
            .entry(line.service_category.clone())
            .or_insert_with(|| CategoryDelta {
                service_category: line.service_category.clone(),
                revenue: Decimal::ZERO,
                quantity: Decimal::ZERO,
            });
        category.revenue += line.subtotal;
        category.quantity += line.quantity;
    }

    AnalyticsDelta {
        revenue: bill.total_amount,
        bill_count: 1,
        service_count: lines.len() as i64,
        status: StatusBucketDeltas::single(bill.status()),
        services: services.into_values().collect(),
        categories: categories.into_values().collect(),
    }
}

/// Delta that moves a day from the old contribution of a bill to its new one.
pub fn revision(before: &AnalyticsDelta, after: AnalyticsDelta) -> AnalyticsDelta {
    after.minus(before)
}

/// Apply a delta to one day's rollups inside `tx`.
///
/// Rows are locked before they are read so concurrent contributions to the
/// same day serialize. Returns true if any counter hit the zero floor.
pub async fn apply_delta(
    tx: &mut dyn BillingTx,
    date: NaiveDate,
    delta: &AnalyticsDelta,
) -> BillingResult<bool> {
    if delta.is_empty() {
        return Ok(false);
    }

    let mut clamped = false;

    let mut daily = tx.lock_daily_analytics(date).await?;
    clamped |= daily.apply(delta);
    tx.save_daily_analytics(&daily).await?;

    for service in &delta.services {
        let mut row = tx.lock_service_analytics(date, service).await?;
        clamped |= row.apply(service);
        tx.save_service_analytics(&row).await?;
    }

    for category in &delta.categories {
        let mut row = tx
            .lock_category_analytics(date, &category.service_category)
            .await?;
        clamped |= row.apply(category);
        tx.save_category_analytics(&row).await?;
    }

    if clamped {
        warn!(sales_date = %date, "Analytics counters clamped at zero");
    }

    Ok(clamped)
}
