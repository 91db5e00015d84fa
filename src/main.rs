//! PipRunner - Main Entry Point
//!
//! Replays historical quotes through the grid engine, either as fast as
//! possible (backtest) or paced in wall-clock time (paper).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use piprunner::backtest::{CsvTickLoader, ReplayEngine};
use piprunner::config::Config;
use piprunner::exchange::PositionLedger;
use std::time::Duration;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// PipRunner CLI
#[derive(Parser)]
#[command(name = "piprunner")]
#[command(version, about = "Grid/martingale position management engine")]
struct Cli {
    /// Configuration file (defaults to ./config.* if present)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a tick file as fast as possible and print the results
    Backtest {
        /// Path to CSV tick file (timestamp,bid,ask)
        #[arg(short, long)]
        data: String,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Replay a tick file paced by its timestamps
    Paper {
        /// Path to CSV tick file (timestamp,bid,ask)
        #[arg(short, long)]
        data: String,

        /// Replay speed multiplier
        #[arg(short, long, default_value = "60")]
        speed: f64,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.validate()?;

    match cli.command {
        Commands::Backtest { data, output } => run_backtest(config, &data, output.as_deref()),
        Commands::Paper { data, speed } => run_paper(config, &data, speed).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "piprunner.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("piprunner=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    let grid = &config.grid;
    info!("📋 Configuration:");
    info!("   Instrument: {} (pip {})", config.instrument.code, config.instrument.pip_size);
    info!("   Directions: long={} short={}", grid.enable_long, grid.enable_short);
    info!("   Pip Step: {} pips", grid.pip_step);
    info!("   First Volume: {}", grid.first_volume);
    info!("   Volume Exponent: {}", grid.volume_exponent);
    info!("   Average TP: {} pips", grid.average_tp_pips);
    info!("   Max Spread: {} pips", grid.max_spread_pips);
    info!(
        "   Paper Account: ${} at {}x, {}m bars",
        config.paper.initial_balance, config.paper.leverage, config.paper.bar_minutes
    );
}

fn load_ticks(data_path: &str) -> Result<CsvTickLoader> {
    info!("📊 Loading ticks from: {}", data_path);
    let loader = CsvTickLoader::new(data_path)?;

    if let Some((start, end)) = loader.available_range() {
        info!(
            "   Data range: {} to {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        );
    }
    info!("   Quotes: {}", loader.len());

    Ok(loader)
}

/// Replay the whole file synchronously.
fn run_backtest(config: Config, data_path: &str, output_dir: Option<&str>) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║              BACKTEST MODE                                 ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    log_config(&config);
    let loader = load_ticks(data_path)?;

    let mut replay = ReplayEngine::new(config);
    let result = replay.run(&loader)?;

    println!("\n{}", result.summary());

    if let Some(dir) = output_dir {
        result.write_outputs(dir)?;
        info!("📁 Results saved to: {}", dir);
    }

    Ok(())
}

/// Wall-clock wait for a quote gap at the given replay speed.
fn pacing_delay(gap: Duration, speed: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(gap.as_secs_f64() / speed)
        .with_context(|| format!("Replay delay out of range for a {gap:?} gap at speed {speed}"))
}

/// Replay the file paced by quote timestamps until done or Ctrl-C.
async fn run_paper(config: Config, data_path: &str, speed: f64) -> Result<()> {
    anyhow::ensure!(speed > 0.0, "speed must be positive");

    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║              PAPER MODE (x{:<6})                          ║", speed);
    info!("╚════════════════════════════════════════════════════════════╝");

    log_config(&config);
    let loader = load_ticks(data_path)?;
    let Some((start, _)) = loader.available_range() else {
        anyhow::bail!("No data available for replay");
    };

    let mut replay = ReplayEngine::new(config);
    let mut last = start;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    for quote in loader.quotes() {
        let gap = (quote.time - last).to_std().unwrap_or_default();
        let delay = pacing_delay(gap, speed)?;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => {
                warn!("Shutdown signal received, stopping replay");
                break;
            }
        }

        let step = replay.step(quote)?;
        last = quote.time;

        for trade in &step.closed {
            debug!(position_id = trade.position_id, pnl = %trade.pnl, "Trade closed");
        }

        if step.completed_bar.is_some() {
            if let Some(status) = replay.status() {
                info!("\n{}", status);
            }
            let positions = replay.broker().snapshot();
            for annotation in replay.engine().annotations(&positions) {
                debug!(?annotation, "Chart annotation");
            }
        }
    }

    let result = replay.finish(start, last);
    println!("\n{}", result.summary());

    info!("👋 PipRunner shutdown complete");
    Ok(())
}
