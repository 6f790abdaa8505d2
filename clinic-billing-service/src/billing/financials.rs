//! Money math for bills: line subtotals, discount policy, consultation fee
//! and settlement. Everything here is pure.

use crate::error::{BillingError, BillingResult};
use crate::models::PaymentStatus;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Standard consultation fee.
pub const DEFAULT_CONSULTATION_FEE: Decimal = Decimal::from_parts(250, 0, 0, false, 0);

/// Follow-up consultation fee.
pub const FOLLOW_UP_CONSULTATION_FEE: Decimal = Decimal::from_parts(350, 0, 0, false, 0);

/// Senior citizen / PWD discount, in percent.
pub const SENIOR_PWD_DISCOUNT_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

const HUNDRED: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Largest value a `NUMERIC(12, 2)` money or quantity column holds:
/// 9,999,999,999.99.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Money and quantities are stored to the cent.
const MONEY_SCALE: u32 = 2;

/// Round to two decimal places, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn line_subtotal(price: Decimal, quantity: Decimal) -> BillingResult<Decimal> {
    let subtotal = price
        .checked_mul(quantity)
        .map(round2)
        .ok_or_else(|| out_of_range("Line subtotal"))?;
    ensure_within_limit("Line subtotal", subtotal)?;
    Ok(subtotal)
}

fn out_of_range(what: &str) -> BillingError {
    BillingError::invalid_input(format!("{} exceeds the maximum of {}", what, MAX_AMOUNT))
}

fn ensure_within_limit(what: &str, value: Decimal) -> BillingResult<()> {
    if value.abs() > MAX_AMOUNT {
        return Err(out_of_range(what));
    }
    Ok(())
}

fn ensure_cents(what: &str, value: Decimal) -> BillingResult<()> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(BillingError::invalid_input(format!(
            "{} allows at most two decimal places, got {}",
            what, value
        )));
    }
    Ok(())
}

/// Only the two fee tiers exist; anything else falls back to the default.
pub fn normalize_consultation_fee(requested: Option<Decimal>) -> Decimal {
    match requested {
        Some(fee) if fee == FOLLOW_UP_CONSULTATION_FEE => FOLLOW_UP_CONSULTATION_FEE,
        _ => DEFAULT_CONSULTATION_FEE,
    }
}

pub fn validate_quantity(quantity: Decimal) -> BillingResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(BillingError::invalid_input(format!(
            "Quantity must be positive, got {}",
            quantity
        )));
    }
    ensure_cents("Quantity", quantity)?;
    ensure_within_limit("Quantity", quantity)
}

/// Check a money input (payment, cumulative amount paid) against what the
/// ledger columns can hold. Sign rules stay with the caller.
pub fn validate_amount(what: &str, amount: Decimal) -> BillingResult<()> {
    ensure_cents(what, amount)?;
    ensure_within_limit(what, amount)
}

pub fn validate_discount_rate(rate: Decimal) -> BillingResult<()> {
    if rate < Decimal::ZERO || rate > HUNDRED {
        return Err(BillingError::invalid_input(format!(
            "Discount rate must be between 0 and 100, got {}",
            rate
        )));
    }
    ensure_cents("Discount rate", rate)
}

/// Which discount ended up on the bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    None,
    SeniorPwd,
    Custom,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::None => "none",
            DiscountType::SeniorPwd => "senior_pwd",
            DiscountType::Custom => "custom",
        }
    }
}

/// Discount asked for by the caller. Senior/PWD wins over a custom rate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiscountPolicy {
    pub senior_pwd: bool,
    pub rate: Option<Decimal>,
}

impl DiscountPolicy {
    pub fn new(senior_pwd: bool, rate: Option<Decimal>) -> Self {
        Self { senior_pwd, rate }
    }

    /// True when the caller asked for any discount at all.
    pub fn is_requested(&self) -> bool {
        self.senior_pwd || self.rate.is_some_and(|r| r > Decimal::ZERO)
    }

    /// Flag and custom rate as persisted on the bill. The policy is kept even
    /// while the bill has no services to discount.
    pub fn stored(&self) -> (bool, Decimal) {
        if self.senior_pwd {
            (true, Decimal::ZERO)
        } else {
            (false, self.rate.unwrap_or(Decimal::ZERO))
        }
    }

    /// Resolve against a services subtotal into the applied type and rate.
    pub fn resolve(&self, services_subtotal: Decimal) -> (DiscountType, Decimal) {
        if services_subtotal <= Decimal::ZERO {
            return (DiscountType::None, Decimal::ZERO);
        }
        if self.senior_pwd {
            return (DiscountType::SeniorPwd, SENIOR_PWD_DISCOUNT_RATE);
        }
        match self.rate {
            Some(rate) => {
                let rate = rate.clamp(Decimal::ZERO, HUNDRED);
                if rate.is_zero() {
                    (DiscountType::None, Decimal::ZERO)
                } else {
                    (DiscountType::Custom, rate)
                }
            }
            None => (DiscountType::None, Decimal::ZERO),
        }
    }
}

/// Computed financial model of a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillBreakdown {
    pub services_subtotal: Decimal,
    pub discount_type: DiscountType,
    pub discount_rate: Decimal,
    pub discount_amount: Decimal,
    pub services_total: Decimal,
    pub consultation_fee: Decimal,
    pub total_amount: Decimal,
}

/// Price a bill from its line subtotals.
///
/// The discount only ever touches services; the consultation fee is added
/// after it.
pub fn compute_breakdown<I>(
    line_subtotals: I,
    policy: &DiscountPolicy,
    consultation_fee: Decimal,
) -> BillingResult<BillBreakdown>
where
    I: IntoIterator<Item = Decimal>,
{
    let services_subtotal = line_subtotals
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, subtotal| acc.checked_add(subtotal))
        .ok_or_else(|| out_of_range("Services subtotal"))?;
    ensure_within_limit("Services subtotal", services_subtotal)?;

    let (discount_type, discount_rate) = policy.resolve(services_subtotal);
    let discount_amount = round2(services_subtotal * discount_rate / HUNDRED);
    let services_total = services_subtotal - discount_amount;
    let total_amount = round2(services_total + consultation_fee);
    ensure_within_limit("Total amount", total_amount)?;

    Ok(BillBreakdown {
        services_subtotal,
        discount_type,
        discount_rate,
        discount_amount,
        services_total,
        consultation_fee,
        total_amount,
    })
}

/// Payment projection of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub payment_status: PaymentStatus,
}

/// Derive balance and status from the ledger sum. The balance may go
/// negative when a bill is revised below what was already paid.
pub fn settle(total_amount: Decimal, amount_paid: Decimal) -> Settlement {
    Settlement {
        amount_paid,
        balance: round2(total_amount - amount_paid),
        payment_status: PaymentStatus::derive(amount_paid, total_amount),
    }
}
