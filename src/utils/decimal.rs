//! Decimal arithmetic utilities for price and volume calculations.

use rust_decimal::Decimal;

/// Round a decimal to a specific number of decimal places.
///
/// Uses banker's rounding (midpoint to even), the same convention brokers
/// apply when quoting to instrument precision.
pub fn round_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp(decimals)
}

/// Round to the nearest multiple of `tick_size` (price tick or volume step).
pub fn round_to_tick(value: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size == Decimal::ZERO {
        return value;
    }
    (value / tick_size).round() * tick_size
}

/// Whether `value` is an exact multiple of `step`.
pub fn is_multiple_of(value: Decimal, step: Decimal) -> bool {
    if step == Decimal::ZERO {
        return true;
    }
    (value % step).is_zero()
}

/// Convert a price distance into pips.
pub fn to_pips(distance: Decimal, pip_size: Decimal) -> Decimal {
    safe_div(distance, pip_size)
}

/// Convert a pip count into a price distance.
pub fn from_pips(pips: Decimal, pip_size: Decimal) -> Decimal {
    pips * pip_size
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Calculate weighted average of `(value, weight)` pairs.
///
/// Returns zero when the total weight is zero.
pub fn weighted_average<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, Decimal)>,
{
    let (sum, weight_sum) = values.into_iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(sum, weight_sum), (val, weight)| (sum + val * weight, weight_sum + weight),
    );

    safe_div(sum, weight_sum)
}
