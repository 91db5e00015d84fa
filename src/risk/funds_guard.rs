//! Insufficient-funds latch.

use chrono::{DateTime, Utc};
use tracing::error;

/// One-way latch that disables new entries for the rest of the session.
///
/// There is no way to clear it short of constructing a new engine.
#[derive(Debug, Clone, Default)]
pub struct FundsGuard {
    halted: bool,
    tripped_at: Option<DateTime<Utc>>,
}

impl FundsGuard {
    /// Create an open (not halted) guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether new entries are disabled.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// When the latch tripped, if it has.
    pub fn tripped_at(&self) -> Option<DateTime<Utc>> {
        self.tripped_at
    }

    /// Set the latch. Returns `true` only on the first call.
    pub fn trip(&mut self, at: DateTime<Utc>) -> bool {
        if self.halted {
            return false;
        }
        self.halted = true;
        self.tripped_at = Some(at);
        error!(tripped_at = %at, "Opening stopped: not enough money");
        true
    }
}
