//! Historical replay of the grid engine.
//!
//! This module provides:
//! - Tick loading from CSV and aggregation into bars
//! - A replay loop driving the engine against the paper broker
//! - Performance metrics and result export
//!
//! # Example
//!
//! ```rust,ignore
//! use piprunner::backtest::{CsvTickLoader, ReplayEngine};
//!
//! let loader = CsvTickLoader::new("data/eurusd_ticks.csv")?;
//! let mut replay = ReplayEngine::new(config);
//!
//! let result = replay.run(&loader)?;
//! println!("Return: {:.2}%", result.metrics.return_pct);
//! ```

mod data;
mod engine;
mod metrics;

pub use data::{BarBuilder, CsvTickLoader, Quote};
pub use engine::{ReplayEngine, ReplayResult, StepResult};
pub use metrics::{ActivityStats, EquityPoint, ReplayMetrics};
