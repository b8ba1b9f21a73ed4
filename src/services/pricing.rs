use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Derived pricing view of a set of line items plus an optional percentage
/// discount. Never persisted for carts; orders freeze one at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub total_quantity: i32,
}

/// Rounds a monetary amount to 2 decimal places, half to even.
pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Computes subtotal, discount and total for `(unit_price, quantity)` lines.
///
/// Pure and deterministic. Rounding happens once, on the final outputs, so
/// per-line rounding error cannot compound; `total` is derived from the
/// rounded subtotal and discount, keeping `total = subtotal - discount`
/// exact on the returned values.
pub fn price_lines(
    lines: &[(Decimal, i32)],
    discount_percent: Option<Decimal>,
) -> Result<PricingBreakdown, ServiceError> {
    let mut subtotal = Decimal::ZERO;
    let mut total_quantity: i32 = 0;

    for (unit_price, quantity) in lines {
        if unit_price.is_sign_negative() {
            return Err(ServiceError::InvalidInput(format!(
                "negative unit price: {}",
                unit_price
            )));
        }
        if *quantity < 0 {
            return Err(ServiceError::InvalidInput(format!(
                "negative quantity: {}",
                quantity
            )));
        }
        subtotal += *unit_price * Decimal::from(*quantity);
        total_quantity += quantity;
    }

    let percent = discount_percent.unwrap_or(Decimal::ZERO);
    if percent.is_sign_negative() || percent > Decimal::from(100) {
        return Err(ServiceError::InvalidInput(format!(
            "discount percentage out of range: {}",
            percent
        )));
    }

    let discount = subtotal * percent / Decimal::from(100);

    let subtotal = round_money(subtotal);
    let discount = round_money(discount);
    let total = subtotal - discount;

    Ok(PricingBreakdown {
        subtotal,
        discount,
        total,
        total_quantity,
    })
}
