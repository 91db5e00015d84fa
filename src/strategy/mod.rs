//! Grid position-management logic.
//!
//! The [`GridEngine`] owns all decision making. The other modules are its
//! building blocks:
//! - `ladder`: per-direction view over the position ledger
//! - `average`: volume-weighted average entry
//! - `sizer`: geometric layer sizing
//! - `take_profit`: shared take-profit alignment
//! - `status`: status text and chart annotations

mod average;
mod engine;
mod ladder;
mod sizer;
mod status;
mod take_profit;

pub use average::AveragePriceCalculator;
pub use engine::{Action, DirectionState, GridEngine, Suppression, TickOutcome};
pub use ladder::Ladder;
pub use sizer::VolumeSizer;
pub use status::{ChartAnnotation, LadderStatus, StatusReport};
pub use take_profit::{TakeProfitRefresh, TrailingTakeProfitManager};
