//! Performance metrics for replay runs.
//!
//! Provides return, drawdown and ladder-depth analysis.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A point on the equity curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub balance: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_equity: Decimal,
    pub drawdown: Decimal,
    pub long_layers: usize,
    pub short_layers: usize,
}

impl EquityPoint {
    /// Create a new equity point.
    pub fn new(
        timestamp: DateTime<Utc>,
        balance: Decimal,
        unrealized_pnl: Decimal,
        (long_layers, short_layers): (usize, usize),
        peak_equity: Decimal,
    ) -> Self {
        let total_equity = balance + unrealized_pnl;
        let drawdown = if peak_equity > Decimal::ZERO {
            (peak_equity - total_equity) / peak_equity
        } else {
            Decimal::ZERO
        };

        Self {
            timestamp,
            balance,
            unrealized_pnl,
            total_equity,
            drawdown,
            long_layers,
            short_layers,
        }
    }
}

/// Counters accumulated by the replay loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityStats {
    pub ticks_processed: u64,
    pub layers_opened: u64,
    pub trades_closed: u64,
    pub winning_trades: u64,
    pub spread_suppressed_ticks: u64,
    pub order_failures: u64,
    pub funds_halted_at: Option<DateTime<Utc>>,
}

/// Replay performance metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayMetrics {
    // Returns
    /// Net profit including open positions (final equity - initial)
    pub net_profit: Decimal,
    /// Net profit as percentage of initial balance
    pub return_pct: Decimal,
    /// Realized profit from closed trades
    pub realized_profit: Decimal,

    // Risk
    /// Maximum peak-to-trough equity drawdown (fraction)
    pub max_drawdown: Decimal,
    /// Longest stretch spent below a previous equity peak, in hours
    pub max_drawdown_duration_hours: i64,
    /// Deepest long ladder seen
    pub max_long_layers: usize,
    /// Deepest short ladder seen
    pub max_short_layers: usize,

    // Activity
    pub layers_opened: u64,
    pub trades_closed: u64,
    /// Win rate (profitable closed trades / total), percent
    pub win_rate: Decimal,
    pub spread_suppressed_ticks: u64,
    pub order_failures: u64,
    /// Whether the insufficient-funds latch tripped
    pub funds_halted: bool,

    // Time
    /// Replay duration in days
    pub duration_days: f64,
}

impl ReplayMetrics {
    /// Calculate metrics from equity curve and replay counters.
    pub fn calculate(
        equity_curve: &[EquityPoint],
        initial_balance: Decimal,
        realized_profit: Decimal,
        stats: &ActivityStats,
    ) -> Self {
        let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
            return Self::empty();
        };

        let duration = last.timestamp - first.timestamp;
        let duration_days = duration.num_seconds() as f64 / 86400.0;

        let net_profit = last.total_equity - initial_balance;
        let return_pct = if initial_balance > Decimal::ZERO {
            net_profit / initial_balance * dec!(100)
        } else {
            Decimal::ZERO
        };

        let (max_drawdown, max_drawdown_duration_hours) = calculate_max_drawdown(equity_curve);

        let win_rate = if stats.trades_closed > 0 {
            Decimal::from(stats.winning_trades) / Decimal::from(stats.trades_closed) * dec!(100)
        } else {
            Decimal::ZERO
        };

        Self {
            net_profit,
            return_pct,
            realized_profit,
            max_drawdown,
            max_drawdown_duration_hours,
            max_long_layers: equity_curve.iter().map(|p| p.long_layers).max().unwrap_or(0),
            max_short_layers: equity_curve.iter().map(|p| p.short_layers).max().unwrap_or(0),
            layers_opened: stats.layers_opened,
            trades_closed: stats.trades_closed,
            win_rate,
            spread_suppressed_ticks: stats.spread_suppressed_ticks,
            order_failures: stats.order_failures,
            funds_halted: stats.funds_halted_at.is_some(),
            duration_days,
        }
    }

    /// Create empty metrics (for error cases).
    pub fn empty() -> Self {
        Self {
            net_profit: Decimal::ZERO,
            return_pct: Decimal::ZERO,
            realized_profit: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            max_drawdown_duration_hours: 0,
            max_long_layers: 0,
            max_short_layers: 0,
            layers_opened: 0,
            trades_closed: 0,
            win_rate: Decimal::ZERO,
            spread_suppressed_ticks: 0,
            order_failures: 0,
            funds_halted: false,
            duration_days: 0.0,
        }
    }

    /// Format metrics as a summary string.
    pub fn summary(&self) -> String {
        format!(
            r#"═══════════════════════════════════════════════
REPLAY RESULTS ({:.1} days)
═══════════════════════════════════════════════
RETURNS
  Net Profit:        ${:.2} ({:.2}%)
  Realized:          ${:.2}

RISK
  Max Drawdown:      {:.2}% ({}h)
  Deepest Long:      {} layers
  Deepest Short:     {} layers

ACTIVITY
  Layers Opened:     {}
  Trades Closed:     {}
  Win Rate:          {:.1}%
  Spread Blocked:    {} ticks
  Order Failures:    {}
  Funds Halted:      {}
═══════════════════════════════════════════════"#,
            self.duration_days,
            self.net_profit,
            self.return_pct,
            self.realized_profit,
            self.max_drawdown * dec!(100),
            self.max_drawdown_duration_hours,
            self.max_long_layers,
            self.max_short_layers,
            self.layers_opened,
            self.trades_closed,
            self.win_rate,
            self.spread_suppressed_ticks,
            self.order_failures,
            if self.funds_halted { "yes" } else { "no" },
        )
    }
}

/// Calculate maximum drawdown and the longest underwater stretch.
fn calculate_max_drawdown(equity_curve: &[EquityPoint]) -> (Decimal, i64) {
    let Some(first) = equity_curve.first() else {
        return (Decimal::ZERO, 0);
    };

    let mut peak = first.total_equity;
    let mut max_dd = Decimal::ZERO;
    let mut max_dd_duration: i64 = 0;
    let mut current_dd_start: Option<DateTime<Utc>> = None;

    for point in equity_curve {
        if point.total_equity >= peak {
            peak = point.total_equity;
            current_dd_start = None;
            continue;
        }

        let start = *current_dd_start.get_or_insert(point.timestamp);
        if peak > Decimal::ZERO {
            let dd = (peak - point.total_equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
        max_dd_duration = max_dd_duration.max((point.timestamp - start).num_hours());
    }

    (max_dd, max_dd_duration)
}
