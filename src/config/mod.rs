//! Configuration management for the grid engine.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::exchange::InstrumentSpec;
use crate::utils::decimal::is_multiple_of;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Grid strategy parameters
    #[serde(default)]
    pub grid: GridConfig,
    /// Traded instrument facts
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Paper broker and replay settings
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Allow long ladders
    #[serde(default = "default_enabled")]
    pub enable_long: bool,
    /// Allow short ladders
    #[serde(default = "default_enabled")]
    pub enable_short: bool,
    /// Adverse distance in pips between layers
    #[serde(default = "default_pip_step")]
    pub pip_step: u32,
    /// Volume of the first layer (>= 1000, step 1000)
    #[serde(default = "default_first_volume")]
    pub first_volume: Decimal,
    /// Maximum spread in pips that still allows new entries
    #[serde(default = "default_max_spread_pips")]
    pub max_spread_pips: Decimal,
    /// Take-profit distance in pips from the ladder's average entry
    #[serde(default = "default_average_tp_pips")]
    pub average_tp_pips: u32,
    /// Geometric growth factor for layer volumes (0.1-5.0)
    #[serde(default = "default_volume_exponent")]
    pub volume_exponent: Decimal,
    /// Label stamped on every position this engine opens
    #[serde(default = "default_label")]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Instrument code
    #[serde(default = "default_instrument_code")]
    pub code: String,
    /// Pip size in price units
    #[serde(default = "default_pip_size")]
    pub pip_size: Decimal,
    /// Quoting precision
    #[serde(default = "default_price_digits")]
    pub price_digits: u32,
    /// Minimum order volume
    #[serde(default = "default_volume_min")]
    pub volume_min: Decimal,
    /// Maximum order volume
    #[serde(default = "default_volume_max")]
    pub volume_max: Decimal,
    /// Volume increment
    #[serde(default = "default_volume_step")]
    pub volume_step: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Starting balance of the simulated account
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    /// Account leverage used for margin checks
    #[serde(default = "default_leverage")]
    pub leverage: Decimal,
    /// Bar length in minutes used to aggregate replayed ticks
    #[serde(default = "default_bar_minutes")]
    pub bar_minutes: u32,
}

// Default value functions
fn default_enabled() -> bool {
    true
}

fn default_pip_step() -> u32 {
    10
}

fn default_first_volume() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_max_spread_pips() -> Decimal {
    Decimal::new(30, 1) // 3.0 pips
}

fn default_average_tp_pips() -> u32 {
    3
}

fn default_volume_exponent() -> Decimal {
    Decimal::ONE
}

fn default_label() -> String {
    "piprunner".to_string()
}

fn default_instrument_code() -> String {
    "EURUSD".to_string()
}

fn default_pip_size() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_price_digits() -> u32 {
    5
}

fn default_volume_min() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_volume_max() -> Decimal {
    Decimal::new(10_000_000, 0)
}

fn default_volume_step() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_initial_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_leverage() -> Decimal {
    Decimal::new(100, 0) // 1:100
}

fn default_bar_minutes() -> u32 {
    60
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("PIPRUNNER"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Load configuration from an explicit file, still honouring env overrides.
    pub fn load_from(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::default().separator("__").prefix("PIPRUNNER"))
            .build()
            .with_context(|| format!("Failed to build configuration from {path}"))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let grid = &self.grid;
        let instrument = &self.instrument;
        let thousand = Decimal::new(1000, 0);

        anyhow::ensure!(grid.pip_step >= 1, "pip_step must be at least 1");

        anyhow::ensure!(
            grid.first_volume >= thousand && is_multiple_of(grid.first_volume, thousand),
            "first_volume must be >= 1000 and a multiple of 1000"
        );

        anyhow::ensure!(
            grid.max_spread_pips >= Decimal::ZERO,
            "max_spread_pips must not be negative"
        );

        anyhow::ensure!(grid.average_tp_pips >= 1, "average_tp_pips must be at least 1");

        anyhow::ensure!(
            grid.volume_exponent >= Decimal::new(1, 1) && grid.volume_exponent <= Decimal::new(5, 0),
            "volume_exponent must be between 0.1 and 5.0"
        );

        anyhow::ensure!(!grid.label.trim().is_empty(), "label must not be empty");

        anyhow::ensure!(!instrument.code.trim().is_empty(), "instrument code must not be empty");

        anyhow::ensure!(instrument.pip_size > Decimal::ZERO, "pip_size must be positive");

        anyhow::ensure!(instrument.volume_step > Decimal::ZERO, "volume_step must be positive");

        anyhow::ensure!(
            instrument.volume_min > Decimal::ZERO && instrument.volume_min <= instrument.volume_max,
            "volume_min must be positive and <= volume_max"
        );

        anyhow::ensure!(
            is_multiple_of(instrument.volume_min, instrument.volume_step)
                && is_multiple_of(instrument.volume_max, instrument.volume_step),
            "volume_min and volume_max must be multiples of volume_step"
        );

        anyhow::ensure!(self.paper.leverage >= Decimal::ONE, "leverage must be >= 1");

        anyhow::ensure!(self.paper.bar_minutes >= 1, "bar_minutes must be at least 1");

        Ok(())
    }
}

impl InstrumentConfig {
    /// Instrument facts in the form the engine consumes.
    pub fn spec(&self) -> InstrumentSpec {
        InstrumentSpec {
            code: self.code.clone(),
            pip_size: self.pip_size,
            price_digits: self.price_digits,
            volume_min: self.volume_min,
            volume_max: self.volume_max,
            volume_step: self.volume_step,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            enable_long: default_enabled(),
            enable_short: default_enabled(),
            pip_step: default_pip_step(),
            first_volume: default_first_volume(),
            max_spread_pips: default_max_spread_pips(),
            average_tp_pips: default_average_tp_pips(),
            volume_exponent: default_volume_exponent(),
            label: default_label(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            code: default_instrument_code(),
            pip_size: default_pip_size(),
            price_digits: default_price_digits(),
            volume_min: default_volume_min(),
            volume_max: default_volume_max(),
            volume_step: default_volume_step(),
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            leverage: default_leverage(),
            bar_minutes: default_bar_minutes(),
        }
    }
}
