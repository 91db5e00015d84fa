//! Spread circuit breaker.

use rust_decimal::Decimal;
use tracing::debug;

use crate::exchange::MarketSnapshot;

/// Suppresses new entries while the spread is wider than allowed.
///
/// Stateless: every tick is judged on its own quote, so the guard re-opens
/// as soon as the spread narrows again.
#[derive(Debug, Clone)]
pub struct SpreadGuard {
    max_spread_pips: Decimal,
}

impl SpreadGuard {
    /// Create a new spread guard.
    pub fn new(max_spread_pips: Decimal) -> Self {
        Self { max_spread_pips }
    }

    /// Configured maximum spread in pips.
    pub fn max_spread_pips(&self) -> Decimal {
        self.max_spread_pips
    }

    /// Whether new entries are allowed at this quote.
    pub fn allows(&self, snapshot: &MarketSnapshot) -> bool {
        let spread = snapshot.spread_pips();
        let allowed = spread <= self.max_spread_pips;
        if !allowed {
            debug!(
                spread_pips = %spread,
                max_spread_pips = %self.max_spread_pips,
                "Spread too wide, entries suppressed"
            );
        }
        allowed
    }
}
