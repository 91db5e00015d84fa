//! Per-direction view over the position ledger.

use rust_decimal::Decimal;

use crate::exchange::{Direction, InstrumentSpec, Position};

/// The open positions of one direction that belong to this engine.
///
/// Positions with another label or instrument are invisible here.
#[derive(Debug, Clone)]
pub struct Ladder<'a> {
    direction: Direction,
    positions: Vec<&'a Position>,
}

impl<'a> Ladder<'a> {
    /// Select the positions of `direction` matching `label` and `instrument_code`.
    pub fn collect(
        positions: &'a [Position],
        direction: Direction,
        label: &str,
        instrument_code: &str,
    ) -> Self {
        let positions = positions
            .iter()
            .filter(|p| {
                p.direction == direction && p.label == label && p.instrument_code == instrument_code
            })
            .collect();

        Self {
            direction,
            positions,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[&'a Position] {
        &self.positions
    }

    /// Sum of volumes across the ladder.
    pub fn total_volume(&self) -> Decimal {
        self.positions.iter().map(|p| p.volume).sum()
    }

    /// Most adverse entry price: lowest for Long, highest for Short.
    pub fn worst_entry(&self) -> Option<Decimal> {
        self.positions
            .iter()
            .map(|p| p.entry_price)
            .reduce(|a, b| self.direction.worse_of(a, b))
    }

    /// Most recently opened position; ties on open time go to the lowest id.
    pub fn latest(&self) -> Option<&'a Position> {
        self.positions
            .iter()
            .copied()
            .reduce(|best, p| {
                if p.opened_at > best.opened_at || (p.opened_at == best.opened_at && p.id < best.id)
                {
                    p
                } else {
                    best
                }
            })
    }

    /// Number of positions whose entry is at or beyond `reference` in the
    /// adverse sense, compared at instrument precision.
    pub fn covered_layers(&self, reference: Decimal, instrument: &InstrumentSpec) -> usize {
        let reference = instrument.round_price(reference);
        self.positions
            .iter()
            .filter(|p| {
                self.direction
                    .is_at_or_beyond(instrument.round_price(p.entry_price), reference)
            })
            .count()
    }
}
