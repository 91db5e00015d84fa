//! Volume-weighted average entry price of a ladder.

use rust_decimal::Decimal;

use super::ladder::Ladder;
use crate::utils::decimal::{round_to_precision, weighted_average};

/// Computes the blended entry price of a ladder at instrument precision.
#[derive(Debug, Clone, Copy)]
pub struct AveragePriceCalculator {
    price_digits: u32,
}

impl AveragePriceCalculator {
    pub fn new(price_digits: u32) -> Self {
        Self { price_digits }
    }

    /// Σ(entry·volume) / Σ(volume), rounded to instrument precision.
    ///
    /// Returns `Decimal::ZERO` when the ladder holds no volume. Zero is a
    /// sentinel for "undefined", never a price.
    pub fn average_entry(&self, ladder: &Ladder<'_>) -> Decimal {
        if ladder.total_volume() <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let average = weighted_average(
            ladder
                .positions()
                .iter()
                .map(|p| (p.entry_price, p.volume)),
        );

        round_to_precision(average, self.price_digits)
    }
}
