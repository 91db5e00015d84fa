//! Broker-facing boundary of the engine.
//!
//! - `types`: directions, quotes, positions and order requests
//! - `traits`: the execution and ledger interfaces the engine depends on
//! - `paper`: an in-process simulated broker for replay and paper trading

pub mod paper;
mod traits;
mod types;

pub use paper::{ClosedTrade, ExitReason, PaperAccount, PaperBroker};
pub use traits::{ExecutionError, ExecutionService, PositionLedger};
#[cfg(test)]
pub use traits::MockExecutionService;
pub use types::*;
