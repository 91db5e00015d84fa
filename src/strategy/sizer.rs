//! Geometric layer sizing.

use rust_decimal::Decimal;
use tracing::debug;

use super::ladder::Ladder;
use crate::error::GridError;
use crate::exchange::{Direction, InstrumentSpec};

/// Sizes new layers as `last_volume * exponent^layer_index`, normalized to
/// the volume step and clamped to the instrument's volume limits.
#[derive(Debug, Clone)]
pub struct VolumeSizer {
    exponent: Decimal,
    instrument: InstrumentSpec,
}

impl VolumeSizer {
    pub fn new(exponent: Decimal, instrument: InstrumentSpec) -> Self {
        Self {
            exponent,
            instrument,
        }
    }

    /// Volume of the first layer of an empty ladder.
    pub fn initial_volume(
        &self,
        direction: Direction,
        first_volume: Decimal,
    ) -> Result<Decimal, GridError> {
        self.finalize(direction, first_volume)
    }

    /// Volume of the next layer of `ladder`.
    ///
    /// The layer index counts positions at or beyond the most recently
    /// opened entry, and the base volume is that position's volume.
    pub fn next_volume(&self, ladder: &Ladder<'_>) -> Result<Decimal, GridError> {
        let direction = ladder.direction();
        let latest = ladder.latest().ok_or(GridError::InvalidVolume {
            direction,
            volume: Decimal::ZERO,
        })?;

        let layer_index = ladder.covered_layers(latest.entry_price, &self.instrument);
        let volume = self.size_layer(direction, latest.volume, layer_index)?;

        debug!(
            %direction,
            last_volume = %latest.volume,
            layer_index,
            exponent = %self.exponent,
            next_volume = %volume,
            "Sized next layer"
        );

        Ok(volume)
    }

    /// `last_volume * exponent^layer_index`, normalized and clamped.
    pub fn size_layer(
        &self,
        direction: Direction,
        last_volume: Decimal,
        layer_index: usize,
    ) -> Result<Decimal, GridError> {
        if last_volume <= Decimal::ZERO {
            return Err(GridError::InvalidVolume {
                direction,
                volume: last_volume,
            });
        }

        self.finalize(direction, self.grow(last_volume, layer_index))
    }

    fn grow(&self, last_volume: Decimal, layer_index: usize) -> Decimal {
        let mut volume = last_volume;
        for _ in 0..layer_index {
            // Past the cap with a growing factor, or collapsed to zero: done.
            if (volume > self.instrument.volume_max && self.exponent >= Decimal::ONE)
                || volume.is_zero()
            {
                break;
            }
            volume = match volume.checked_mul(self.exponent) {
                Some(next) => next,
                None => return self.instrument.volume_max,
            };
        }
        volume
    }

    fn finalize(&self, direction: Direction, volume: Decimal) -> Result<Decimal, GridError> {
        let normalized = self.instrument.normalize_volume(volume);
        let clamped = self.instrument.clamp_volume(normalized);
        if clamped <= Decimal::ZERO {
            return Err(GridError::InvalidVolume {
                direction,
                volume: clamped,
            });
        }
        Ok(clamped)
    }
}
