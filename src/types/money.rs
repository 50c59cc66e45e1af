//! Currency minor-unit rules
//!
//! Amounts and balances are `Decimal` values held at exactly the scale of
//! the currency's minor unit. Amounts finer than the minor unit are
//! rejected rather than rounded.

use rust_decimal::Decimal;

/// Number of decimal places of a currency's minor unit
///
/// Unknown codes default to two decimal places.
pub fn minor_units(currency: &str) -> u32 {
    match currency {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
        _ => 2,
    }
}

/// Express `amount` at the currency's scale without losing precision
///
/// Returns `None` when the amount carries significant digits below the
/// minor unit (e.g. `1.005` for a two-decimal currency), or is too large to
/// be held at that scale.
pub fn to_currency_scale(amount: Decimal, currency: &str) -> Option<Decimal> {
    let scale = minor_units(currency);
    if amount.normalize().scale() > scale {
        return None;
    }
    let mut scaled = amount;
    // `rescale` settles for a smaller scale when the mantissa would overflow
    scaled.rescale(scale);
    (scaled.scale() == scale).then_some(scaled)
}

/// Add `amount` to a balance held at currency scale
///
/// Returns `None` on overflow, including sums that `Decimal` could only
/// represent by dropping below the balance's scale.
pub fn checked_credit(balance: Decimal, amount: Decimal) -> Option<Decimal> {
    balance
        .checked_add(amount)
        .filter(|sum| sum.scale() == balance.scale())
}
