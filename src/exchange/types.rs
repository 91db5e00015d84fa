//! Market, position and order types shared by the engine and the venues.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::decimal::{from_pips, round_to_precision, round_to_tick, to_pips};

/// Broker-assigned position identifier (monotonic).
pub type PositionId = u64;

/// Trade direction of a grid ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Both directions, in evaluation order.
    pub const ALL: [Direction; 2] = [Direction::Long, Direction::Short];

    /// Price at which a new layer in this direction would be filled.
    ///
    /// Longs buy at the ask, shorts sell at the bid.
    pub fn entry_side(&self, bid: Decimal, ask: Decimal) -> Decimal {
        match self {
            Direction::Long => ask,
            Direction::Short => bid,
        }
    }

    /// Price at which a position in this direction would be closed.
    pub fn exit_side(&self, bid: Decimal, ask: Decimal) -> Decimal {
        match self {
            Direction::Long => bid,
            Direction::Short => ask,
        }
    }

    /// Whether `price` is at or beyond `reference` in the adverse sense
    /// (lower for Long, higher for Short).
    pub fn is_at_or_beyond(&self, price: Decimal, reference: Decimal) -> bool {
        match self {
            Direction::Long => price <= reference,
            Direction::Short => price >= reference,
        }
    }

    /// Whether `price` has reached `target` in the favourable sense
    /// (higher for Long, lower for Short).
    pub fn has_reached(&self, price: Decimal, target: Decimal) -> bool {
        match self {
            Direction::Long => price >= target,
            Direction::Short => price <= target,
        }
    }

    /// The more adverse of two entry prices.
    pub fn worse_of(&self, a: Decimal, b: Decimal) -> Decimal {
        match self {
            Direction::Long => a.min(b),
            Direction::Short => a.max(b),
        }
    }

    /// Move `price` by `distance` against this direction
    /// (down for Long, up for Short).
    pub fn adverse_offset(&self, price: Decimal, distance: Decimal) -> Decimal {
        match self {
            Direction::Long => price - distance,
            Direction::Short => price + distance,
        }
    }

    /// Move `price` by `distance` in favour of this direction
    /// (up for Long, down for Short).
    pub fn favourable_offset(&self, price: Decimal, distance: Decimal) -> Decimal {
        match self {
            Direction::Long => price + distance,
            Direction::Short => price - distance,
        }
    }

    /// Profit of moving from `entry` to `exit` with `volume` units.
    pub fn pnl(&self, entry: Decimal, exit: Decimal, volume: Decimal) -> Decimal {
        match self {
            Direction::Long => (exit - entry) * volume,
            Direction::Short => (entry - exit) * volume,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "Long"),
            Direction::Short => write!(f, "Short"),
        }
    }
}

/// Static trading facts of an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Instrument code (e.g., "EURUSD")
    pub code: String,
    /// Size of one pip in price units
    pub pip_size: Decimal,
    /// Number of decimal places prices are quoted with
    pub price_digits: u32,
    /// Smallest tradable volume
    pub volume_min: Decimal,
    /// Largest tradable volume
    pub volume_max: Decimal,
    /// Volume increment
    pub volume_step: Decimal,
}

impl InstrumentSpec {
    /// Round a price to the instrument's quoting precision.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        round_to_precision(price, self.price_digits)
    }

    /// Round a volume to the nearest volume step.
    pub fn normalize_volume(&self, volume: Decimal) -> Decimal {
        round_to_tick(volume, self.volume_step)
    }

    /// Clamp a volume into `[volume_min, volume_max]`.
    pub fn clamp_volume(&self, volume: Decimal) -> Decimal {
        volume.max(self.volume_min).min(self.volume_max)
    }

    /// Convert a pip count into a price distance.
    pub fn pips(&self, pips: Decimal) -> Decimal {
        from_pips(pips, self.pip_size)
    }
}

/// A price update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub time: DateTime<Utc>,
    /// Open time of the bar this tick belongs to
    pub bar_open_time: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
}

/// A closed bar, delivered once the next bar begins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub close: Decimal,
}

/// Per-tick view of the market combined with instrument facts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketSnapshot {
    pub bid: Decimal,
    pub ask: Decimal,
    pub pip_size: Decimal,
    pub price_digits: u32,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
}

impl MarketSnapshot {
    /// Build a snapshot from the latest tick.
    pub fn new(tick: &Tick, instrument: &InstrumentSpec) -> Self {
        Self {
            bid: tick.bid,
            ask: tick.ask,
            pip_size: instrument.pip_size,
            price_digits: instrument.price_digits,
            volume_min: instrument.volume_min,
            volume_max: instrument.volume_max,
        }
    }

    /// Current spread in pips.
    pub fn spread_pips(&self) -> Decimal {
        to_pips(self.ask - self.bid, self.pip_size)
    }
}

/// An open position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub volume: Decimal,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub label: String,
    pub instrument_code: String,
    pub opened_at: DateTime<Utc>,
}

/// Request to open a new layer at market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub direction: Direction,
    pub volume: Decimal,
    pub label: String,
    pub instrument_code: String,
}

/// Request to change the protective levels of an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub position_id: PositionId,
    pub direction: Direction,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Broker confirmation of an executed market order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub position_id: PositionId,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub volume: Decimal,
    pub time: DateTime<Utc>,
}
