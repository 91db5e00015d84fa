//! # PipRunner
//!
//! A tick-driven grid/martingale position-management engine for a single
//! instrument, with a paper broker and historical replay.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Broker boundary (types, execution traits, paper broker)
//! - `strategy`: Ladder analytics, sizing, take-profit alignment and the engine
//! - `risk`: Spread guard and insufficient-funds latch
//! - `backtest`: Historical replay and performance metrics
//! - `error`: Recoverable decision errors
//! - `utils`: Shared utilities and decimal arithmetic

pub mod backtest;
pub mod config;
pub mod error;
pub mod exchange;
pub mod risk;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::GridError;
pub use strategy::GridEngine;
