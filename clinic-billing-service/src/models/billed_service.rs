//! Billed service (line item) model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One priced service instance on a bill.
///
/// `service_id` is kept for traceability only; name, category and price are
/// frozen at billing time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BilledService {
    pub billed_service_id: Uuid,
    pub bill_id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub service_category: String,
    pub service_price_at_time: Decimal,
    pub quantity: Decimal,
    pub subtotal: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// A requested `{serviceId, quantity}` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLineInput {
    pub service_id: Uuid,
    pub quantity: Decimal,
}

/// A requested quantity change for an existing line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityUpdateInput {
    pub billed_service_id: Uuid,
    pub new_quantity: Decimal,
}
