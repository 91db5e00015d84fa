//! Decision-engine error taxonomy.
//!
//! None of these are fatal to the process. Each is logged, reported in the
//! tick outcome, and the engine is ready for the next tick.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::exchange::{Direction, PositionId};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GridError {
    /// Generic broker rejection of a new layer; retried on a later tick.
    #[error("{direction} order rejected: {reason}")]
    OrderRejected { direction: Direction, reason: String },

    /// The account cannot fund a new layer; trips the funds latch.
    #[error("{direction} order refused: insufficient funds")]
    InsufficientFunds { direction: Direction },

    /// Sizing produced a non-positive volume; nothing was submitted.
    #[error("{direction} layer sizing produced invalid volume {volume}")]
    InvalidVolume { direction: Direction, volume: Decimal },

    /// A take-profit update failed; recomputed and retried next tick.
    #[error("take-profit update for position {position_id} rejected: {reason}")]
    ModifyRejected {
        position_id: PositionId,
        reason: String,
    },
}
