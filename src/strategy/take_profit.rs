//! Keeps every layer's take-profit on the ladder's averaged target.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::average::AveragePriceCalculator;
use super::ladder::Ladder;
use crate::error::GridError;
use crate::exchange::{ExecutionService, InstrumentSpec, ModifyRequest};

/// Result of one take-profit pass over a ladder.
#[derive(Debug, Default)]
pub struct TakeProfitRefresh {
    /// Target the ladder was aligned to, if it had any volume
    pub target: Option<Decimal>,
    /// Modifications sent to the broker
    pub requests: Vec<ModifyRequest>,
    /// Modifications the broker refused
    pub failures: Vec<GridError>,
}

/// Moves each position's take-profit to `average ± average_tp_pips`.
///
/// Runs every tick and is stateless: a refused modification is simply
/// recomputed and resent on the next tick.
#[derive(Debug, Clone)]
pub struct TrailingTakeProfitManager {
    average_tp_pips: Decimal,
    instrument: InstrumentSpec,
    calculator: AveragePriceCalculator,
}

impl TrailingTakeProfitManager {
    pub fn new(average_tp_pips: u32, instrument: InstrumentSpec) -> Self {
        let calculator = AveragePriceCalculator::new(instrument.price_digits);
        Self {
            average_tp_pips: Decimal::from(average_tp_pips),
            instrument,
            calculator,
        }
    }

    /// Blended entry of the ladder at instrument precision; zero when empty.
    pub fn average_entry(&self, ladder: &Ladder<'_>) -> Decimal {
        self.calculator.average_entry(ladder)
    }

    /// Shared take-profit for the ladder, or `None` when the average is undefined.
    pub fn target(&self, ladder: &Ladder<'_>) -> Option<Decimal> {
        let average = self.calculator.average_entry(ladder);
        if average.is_zero() {
            return None;
        }

        let distance = self.instrument.pips(self.average_tp_pips);
        Some(
            self.instrument
                .round_price(ladder.direction().favourable_offset(average, distance)),
        )
    }

    /// Modifications needed to bring every position onto the target.
    ///
    /// Stop-losses are carried over unchanged.
    pub fn pending_updates(&self, ladder: &Ladder<'_>) -> (Option<Decimal>, Vec<ModifyRequest>) {
        let Some(target) = self.target(ladder) else {
            return (None, Vec::new());
        };

        let requests = ladder
            .positions()
            .iter()
            .filter(|p| p.take_profit != Some(target))
            .map(|p| ModifyRequest {
                position_id: p.id,
                direction: p.direction,
                stop_loss: p.stop_loss,
                take_profit: Some(target),
            })
            .collect();

        (Some(target), requests)
    }

    /// Send every pending modification through `execution`.
    pub fn refresh<E>(&self, ladder: &Ladder<'_>, execution: &mut E) -> TakeProfitRefresh
    where
        E: ExecutionService + ?Sized,
    {
        let (target, requests) = self.pending_updates(ladder);
        let mut failures = Vec::new();

        for request in &requests {
            match execution.modify_position(request) {
                Ok(()) => debug!(
                    position_id = request.position_id,
                    direction = %request.direction,
                    take_profit = ?request.take_profit,
                    "Take-profit moved to ladder target"
                ),
                Err(e) => {
                    warn!(
                        position_id = request.position_id,
                        direction = %request.direction,
                        error = %e,
                        "Take-profit update rejected"
                    );
                    failures.push(GridError::ModifyRejected {
                        position_id: request.position_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        TakeProfitRefresh {
            target,
            requests,
            failures,
        }
    }
}
