//! Replay engine.
//!
//! Replays historical quotes through the grid engine against a paper broker.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::backtest::data::{BarBuilder, CsvTickLoader, Quote};
use crate::backtest::metrics::{ActivityStats, EquityPoint, ReplayMetrics};
use crate::config::Config;
use crate::exchange::{
    Bar, ClosedTrade, Direction, PaperBroker, PositionLedger, Tick,
};
use crate::strategy::{GridEngine, StatusReport, Suppression, TickOutcome};

/// Result of a single replayed quote.
#[derive(Debug)]
pub struct StepResult {
    pub tick: Tick,
    /// Bar completed by this quote, delivered before the tick
    pub completed_bar: Option<Bar>,
    /// Positions the broker closed on this quote
    pub closed: Vec<ClosedTrade>,
    pub outcome: TickOutcome,
    pub equity: Decimal,
}

/// Complete result of a replay run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    pub config: Config,
    pub metrics: ReplayMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub closed_trades: Vec<ClosedTrade>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub ticks_processed: u64,
}

impl ReplayResult {
    /// Export equity curve to CSV.
    pub fn equity_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        let path = path.as_ref();
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writeln!(
            file,
            "timestamp,balance,unrealized_pnl,total_equity,drawdown,long_layers,short_layers"
        )?;

        for point in &self.equity_curve {
            writeln!(
                file,
                "{},{},{},{},{},{},{}",
                point.timestamp.to_rfc3339(),
                point.balance,
                point.unrealized_pnl,
                point.total_equity,
                point.drawdown,
                point.long_layers,
                point.short_layers,
            )?;
        }

        Ok(())
    }

    /// Export the full result as pretty JSON.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Write `result.json` and `equity.csv` into `dir`.
    pub fn write_outputs<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        self.to_json(dir.join("result.json"))?;
        self.equity_to_csv(dir.join("equity.csv"))?;
        info!(dir = %dir.display(), "Replay results written");
        Ok(())
    }

    /// Get a summary string.
    pub fn summary(&self) -> String {
        format!(
            "{}\n\nReplay Period: {} to {}\nTicks: {}",
            self.metrics.summary(),
            self.start_time.format("%Y-%m-%d %H:%M"),
            self.end_time.format("%Y-%m-%d %H:%M"),
            self.ticks_processed,
        )
    }
}

/// Drives quotes through bar aggregation, the paper broker and the grid engine.
pub struct ReplayEngine {
    config: Config,
    engine: GridEngine,
    broker: PaperBroker,
    bars: BarBuilder,

    // Tracking for metrics
    equity_curve: Vec<EquityPoint>,
    peak_equity: Decimal,
    stats: ActivityStats,
    last_tick: Option<Tick>,
}

impl ReplayEngine {
    /// Create a new replay engine from a validated configuration.
    pub fn new(config: Config) -> Self {
        let instrument = config.instrument.spec();
        let engine = GridEngine::new(config.grid.clone(), instrument.clone());
        let broker = PaperBroker::new(
            instrument,
            config.paper.initial_balance,
            config.paper.leverage,
        );
        let bars = BarBuilder::new(config.paper.bar_minutes);
        let peak_equity = config.paper.initial_balance;

        Self {
            config,
            engine,
            broker,
            bars,
            equity_curve: Vec::new(),
            peak_equity,
            stats: ActivityStats::default(),
            last_tick: None,
        }
    }

    pub fn engine(&self) -> &GridEngine {
        &self.engine
    }

    pub fn broker(&self) -> &PaperBroker {
        &self.broker
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn stats(&self) -> &ActivityStats {
        &self.stats
    }

    /// Status of the engine at the last replayed quote.
    pub fn status(&self) -> Option<StatusReport> {
        let tick = self.last_tick?;
        Some(self.engine.status(&tick, &self.broker.snapshot()))
    }

    /// Replay one quote.
    pub fn step(&mut self, quote: &Quote) -> Result<StepResult> {
        let (tick, completed_bar) = self.bars.push(quote)?;

        if let Some(bar) = &completed_bar {
            self.engine.on_bar_close(bar);
        }

        let closed = self.broker.on_tick(&tick);
        let positions = self.broker.snapshot();
        let outcome = self.engine.on_tick(&tick, &positions, &mut self.broker);

        self.record(&tick, &closed, &outcome);

        let equity = self.broker.equity();
        Ok(StepResult {
            tick,
            completed_bar,
            closed,
            outcome,
            equity,
        })
    }

    fn record(&mut self, tick: &Tick, closed: &[ClosedTrade], outcome: &TickOutcome) {
        self.last_tick = Some(*tick);
        self.stats.ticks_processed += 1;
        self.stats.layers_opened += outcome.fills.len() as u64;
        self.stats.order_failures += outcome.failures.len() as u64;
        self.stats.trades_closed += closed.len() as u64;
        self.stats.winning_trades += closed.iter().filter(|t| t.pnl > Decimal::ZERO).count() as u64;
        if outcome.suppressed == Some(Suppression::Spread) {
            self.stats.spread_suppressed_ticks += 1;
        }
        if self.stats.funds_halted_at.is_none() {
            self.stats.funds_halted_at = self.engine.funds_guard().tripped_at();
        }

        let positions = self.broker.snapshot();
        let layers = (
            self.engine.ladder(&positions, Direction::Long).len(),
            self.engine.ladder(&positions, Direction::Short).len(),
        );

        let point = EquityPoint::new(
            tick.time,
            self.broker.account().balance,
            self.broker.unrealized_pnl(),
            layers,
            self.peak_equity,
        );
        if point.total_equity > self.peak_equity {
            self.peak_equity = point.total_equity;
        }
        self.equity_curve.push(point);
    }

    /// Replay every quote of `loader`.
    pub fn run(&mut self, loader: &CsvTickLoader) -> Result<ReplayResult> {
        let Some((start, end)) = loader.available_range() else {
            anyhow::bail!("No data available for replay");
        };

        info!(
            "Starting replay from {} to {} ({} quotes)",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M"),
            loader.len()
        );

        let total = loader.len();
        for (i, quote) in loader.quotes().iter().enumerate() {
            let step = self.step(quote)?;

            // Progress logging
            if i % 10_000 == 0 {
                debug!(
                    "Progress: {}/{} ({:.1}%), Equity: ${:.2}",
                    i,
                    total,
                    (i as f64 / total as f64) * 100.0,
                    step.equity
                );
            }
        }

        Ok(self.finish(start, end))
    }

    /// Build the result from everything replayed so far.
    pub fn finish(&self, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> ReplayResult {
        let account = self.broker.account();
        let realized_profit = account.balance - account.initial_balance;

        let metrics = ReplayMetrics::calculate(
            &self.equity_curve,
            account.initial_balance,
            realized_profit,
            &self.stats,
        );

        info!(
            "Replay complete. Final equity: ${:.2}",
            self.broker.equity()
        );

        ReplayResult {
            config: self.config.clone(),
            metrics,
            equity_curve: self.equity_curve.clone(),
            closed_trades: account.closed_trades.clone(),
            start_time,
            end_time,
            ticks_processed: self.stats.ticks_processed,
        }
    }
}
