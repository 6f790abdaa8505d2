//! Daily sales rollups and the deltas that move them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::PaymentStatus;

/// Per-day aggregate of billing activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailySalesAnalytics {
    pub sales_date: NaiveDate,
    pub total_revenue: Decimal,
    pub total_bills: i64,
    pub paid_bills: i64,
    pub partially_paid_bills: i64,
    pub unpaid_bills: i64,
    pub total_services: i64,
    pub average_bill_amount: Decimal,
    pub updated_utc: DateTime<Utc>,
}

/// Per-day, per-service rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSalesAnalytics {
    pub sales_date: NaiveDate,
    pub service_id: Uuid,
    pub service_name: String,
    pub service_category: String,
    pub total_revenue: Decimal,
    pub total_quantity: Decimal,
    pub updated_utc: DateTime<Utc>,
}

/// Per-day, per-category rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategorySalesAnalytics {
    pub sales_date: NaiveDate,
    pub service_category: String,
    pub total_revenue: Decimal,
    pub total_quantity: Decimal,
    pub updated_utc: DateTime<Utc>,
}

/// Signed bill counts per payment status bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBucketDeltas {
    pub unpaid: i64,
    pub partially_paid: i64,
    pub paid: i64,
}

impl StatusBucketDeltas {
    pub fn single(status: PaymentStatus) -> Self {
        let mut deltas = Self::default();
        match status {
            PaymentStatus::Unpaid => deltas.unpaid = 1,
            PaymentStatus::PartiallyPaid => deltas.partially_paid = 1,
            PaymentStatus::Paid => deltas.paid = 1,
        }
        deltas
    }

    /// Moving one bill from `from` to `to`.
    pub fn transition(from: PaymentStatus, to: PaymentStatus) -> Self {
        Self::single(to).minus(&Self::single(from))
    }

    pub fn minus(&self, other: &Self) -> Self {
        Self {
            unpaid: self.unpaid - other.unpaid,
            partially_paid: self.partially_paid - other.partially_paid,
            paid: self.paid - other.paid,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.unpaid == 0 && self.partially_paid == 0 && self.paid == 0
    }
}

/// Signed revenue/quantity for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDelta {
    pub service_id: Uuid,
    pub service_name: String,
    pub service_category: String,
    pub revenue: Decimal,
    pub quantity: Decimal,
}

/// Signed revenue/quantity for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDelta {
    pub service_category: String,
    pub revenue: Decimal,
    pub quantity: Decimal,
}

/// Relative adjustment to one day's rollups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsDelta {
    pub revenue: Decimal,
    pub bill_count: i64,
    pub service_count: i64,
    pub status: StatusBucketDeltas,
    pub services: Vec<ServiceDelta>,
    pub categories: Vec<CategoryDelta>,
}

impl AnalyticsDelta {
    pub fn is_empty(&self) -> bool {
        self.revenue.is_zero()
            && self.bill_count == 0
            && self.service_count == 0
            && self.status.is_zero()
            && self.services.is_empty()
            && self.categories.is_empty()
    }

    pub fn negate(self) -> Self {
        AnalyticsDelta::default().minus(&self)
    }

    /// `self - other`, merging per-service and per-category entries by key and
    /// dropping entries that net to zero.
    pub fn minus(self, other: &AnalyticsDelta) -> Self {
        let mut services: BTreeMap<Uuid, ServiceDelta> = BTreeMap::new();
        for s in self.services {
            merge_service(&mut services, s, Decimal::ONE);
        }
        for s in &other.services {
            merge_service(&mut services, s.clone(), Decimal::NEGATIVE_ONE);
        }

        let mut categories: BTreeMap<String, CategoryDelta> = BTreeMap::new();
        for c in self.categories {
            merge_category(&mut categories, c, Decimal::ONE);
        }
        for c in &other.categories {
            merge_category(&mut categories, c.clone(), Decimal::NEGATIVE_ONE);
        }

        Self {
            revenue: self.revenue - other.revenue,
            bill_count: self.bill_count - other.bill_count,
            service_count: self.service_count - other.service_count,
            status: self.status.minus(&other.status),
            services: services
                .into_values()
                .filter(|s| !(s.revenue.is_zero() && s.quantity.is_zero()))
                .collect(),
            categories: categories
                .into_values()
                .filter(|c| !(c.revenue.is_zero() && c.quantity.is_zero()))
                .collect(),
        }
    }
}

fn merge_service(acc: &mut BTreeMap<Uuid, ServiceDelta>, delta: ServiceDelta, sign: Decimal) {
    let entry = acc.entry(delta.service_id).or_insert_with(|| ServiceDelta {
        revenue: Decimal::ZERO,
        quantity: Decimal::ZERO,
        ..delta.clone()
    });
    entry.revenue += delta.revenue * sign;
    entry.quantity += delta.quantity * sign;
}

fn merge_category(acc: &mut BTreeMap<String, CategoryDelta>, delta: CategoryDelta, sign: Decimal) {
    let entry = acc
        .entry(delta.service_category.clone())
        .or_insert_with(|| CategoryDelta {
            service_category: delta.service_category.clone(),
            revenue: Decimal::ZERO,
            quantity: Decimal::ZERO,
        });
    entry.revenue += delta.revenue * sign;
    entry.quantity += delta.quantity * sign;
}

fn floor_i64(value: i64, clamped: &mut bool) -> i64 {
    if value < 0 {
        *clamped = true;
        0
    } else {
        value
    }
}

fn floor_decimal(value: Decimal, clamped: &mut bool) -> Decimal {
    if value < Decimal::ZERO {
        *clamped = true;
        Decimal::ZERO
    } else {
        value
    }
}

impl DailySalesAnalytics {
    pub fn empty(sales_date: NaiveDate) -> Self {
        Self {
            sales_date,
            total_revenue: Decimal::ZERO,
            total_bills: 0,
            paid_bills: 0,
            partially_paid_bills: 0,
            unpaid_bills: 0,
            total_services: 0,
            average_bill_amount: Decimal::ZERO,
            updated_utc: Utc::now(),
        }
    }

    /// Apply a relative delta. Every counter is floored at zero; the return
    /// value reports whether any floor was hit.
    pub fn apply(&mut self, delta: &AnalyticsDelta) -> bool {
        let mut clamped = false;
        self.total_revenue = floor_decimal(self.total_revenue + delta.revenue, &mut clamped);
        self.total_bills = floor_i64(self.total_bills + delta.bill_count, &mut clamped);
        self.total_services = floor_i64(self.total_services + delta.service_count, &mut clamped);
        self.unpaid_bills = floor_i64(self.unpaid_bills + delta.status.unpaid, &mut clamped);
        self.partially_paid_bills = floor_i64(
            self.partially_paid_bills + delta.status.partially_paid,
            &mut clamped,
        );
        self.paid_bills = floor_i64(self.paid_bills + delta.status.paid, &mut clamped);
        self.average_bill_amount = if self.total_bills > 0 {
            (self.total_revenue / Decimal::from(self.total_bills)).round_dp(2)
        } else {
            Decimal::ZERO
        };
        self.updated_utc = Utc::now();
        clamped
    }
}

impl ServiceSalesAnalytics {
    pub fn empty(sales_date: NaiveDate, delta: &ServiceDelta) -> Self {
        Self {
            sales_date,
            service_id: delta.service_id,
            service_name: delta.service_name.clone(),
            service_category: delta.service_category.clone(),
            total_revenue: Decimal::ZERO,
            total_quantity: Decimal::ZERO,
            updated_utc: Utc::now(),
        }
    }

    pub fn apply(&mut self, delta: &ServiceDelta) -> bool {
        let mut clamped = false;
        self.total_revenue = floor_decimal(self.total_revenue + delta.revenue, &mut clamped);
        self.total_quantity = floor_decimal(self.total_quantity + delta.quantity, &mut clamped);
        self.updated_utc = Utc::now();
        clamped
    }
}

impl CategorySalesAnalytics {
    pub fn empty(sales_date: NaiveDate, service_category: &str) -> Self {
        Self {
            sales_date,
            service_category: service_category.to_string(),
            total_revenue: Decimal::ZERO,
            total_quantity: Decimal::ZERO,
            updated_utc: Utc::now(),
        }
    }

    pub fn apply(&mut self, delta: &CategoryDelta) -> bool {
        let mut clamped = false;
        self.total_revenue = floor_decimal(self.total_revenue + delta.revenue, &mut clamped);
        self.total_quantity = floor_decimal(self.total_quantity + delta.quantity, &mut clamped);
        self.updated_utc = Utc::now();
        clamped
    }
}
