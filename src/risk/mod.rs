//! Entry guards.
//!
//! - `spread_guard`: suppresses new layers while the spread is too wide
//! - `funds_guard`: session latch set by an insufficient-funds rejection

mod funds_guard;
mod spread_guard;

pub use funds_guard::FundsGuard;
pub use spread_guard::SpreadGuard;
