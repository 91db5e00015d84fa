//! Narrow interfaces to the broker.
//!
//! The engine never talks to a venue directly; it reads a ledger snapshot
//! and sends requests through an [`ExecutionService`]. Both calls are
//! synchronous: the result is known before the tick handler returns.

use thiserror::Error;

use super::types::{Fill, ModifyRequest, OpenRequest, Position, PositionId};

/// Failure reported by the execution venue.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    /// Account cannot carry the requested exposure
    #[error("not enough money")]
    InsufficientFunds,
    /// Generic broker rejection
    #[error("rejected: {reason}")]
    Rejected { reason: String },
    /// The position to modify no longer exists
    #[error("position {0} not found")]
    PositionNotFound(PositionId),
    /// No price has been seen yet
    #[error("no quote available")]
    NoQuote,
}

impl ExecutionError {
    /// Create a generic rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Order submission and position modification.
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionService {
    /// Open a new market position.
    fn submit_order(&mut self, request: &OpenRequest) -> Result<Fill, ExecutionError>;

    /// Replace the stop-loss and take-profit of an open position.
    fn modify_position(&mut self, request: &ModifyRequest) -> Result<(), ExecutionError>;
}

/// Read access to the currently open positions.
pub trait PositionLedger {
    /// Immutable copy of the open positions at this instant.
    fn snapshot(&self) -> Vec<Position>;
}
