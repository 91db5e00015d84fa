//! Historical tick loading and bar aggregation for replay.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, DurationRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::exchange::{Bar, Tick};

/// A raw quote as read from the data file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub time: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
}

/// CSV tick loader for historical replay.
///
/// Expected CSV format:
/// ```csv
/// timestamp,bid,ask
/// 2024-01-01T00:00:00Z,1.10590,1.10600
/// ```
#[derive(Debug, Clone)]
pub struct CsvTickLoader {
    /// Quotes sorted by time
    quotes: Vec<Quote>,
}

impl CsvTickLoader {
    /// Load quotes from a CSV file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;

        Self::from_csv_content(&content)
    }

    /// Load quotes from CSV content string.
    pub fn from_csv_content(content: &str) -> Result<Self> {
        let mut quotes = Vec::new();

        for (line_num, line) in content.lines().enumerate() {
            // Skip header
            if line_num == 0 && line.starts_with("timestamp") {
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            let quote = parse_quote(line)
                .with_context(|| format!("Failed to parse line {}: {}", line_num + 1, line))?;
            quotes.push(quote);
        }

        if quotes.is_empty() {
            anyhow::bail!("CSV file contains no data rows");
        }

        Ok(Self::from_quotes(quotes))
    }

    /// Create a loader from in-memory quotes.
    pub fn from_quotes(mut quotes: Vec<Quote>) -> Self {
        // Stable, so quotes sharing a timestamp keep file order
        quotes.sort_by_key(|q| q.time);
        Self { quotes }
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// First and last quote times.
    pub fn available_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.quotes.first()?.time, self.quotes.last()?.time))
    }
}

fn parse_quote(line: &str) -> Result<Quote> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 3 {
        anyhow::bail!(
            "Expected 3 columns (timestamp,bid,ask), got {}",
            parts.len()
        );
    }

    let quote = Quote {
        time: parts[0]
            .trim()
            .parse()
            .with_context(|| format!("Invalid timestamp: {}", parts[0]))?,
        bid: parts[1]
            .trim()
            .parse()
            .with_context(|| format!("Invalid bid: {}", parts[1]))?,
        ask: parts[2]
            .trim()
            .parse()
            .with_context(|| format!("Invalid ask: {}", parts[2]))?,
    };

    anyhow::ensure!(
        quote.bid > Decimal::ZERO && quote.ask >= quote.bid,
        "Invalid quote: bid {} ask {}",
        quote.bid,
        quote.ask
    );

    Ok(quote)
}

/// Aggregates quotes into fixed-length bars.
///
/// Each quote is stamped with the open time of its bar. When a quote falls
/// into a later bar, the previous bar is emitted with its last bid as close.
#[derive(Debug, Clone)]
pub struct BarBuilder {
    bar_length: Duration,
    current_open: Option<DateTime<Utc>>,
    last_bid: Decimal,
}

impl BarBuilder {
    pub fn new(bar_minutes: u32) -> Self {
        Self {
            bar_length: Duration::minutes(i64::from(bar_minutes.max(1))),
            current_open: None,
            last_bid: Decimal::ZERO,
        }
    }

    /// Open time of the bar containing `time`.
    pub fn bar_open_time(&self, time: DateTime<Utc>) -> Result<DateTime<Utc>> {
        time.duration_trunc(self.bar_length)
            .with_context(|| format!("Cannot align {time} to bar length"))
    }

    /// Stamp `quote` with its bar, returning the bar it completed, if any.
    pub fn push(&mut self, quote: &Quote) -> Result<(Tick, Option<Bar>)> {
        let bar_open_time = self.bar_open_time(quote.time)?;

        let completed = match self.current_open {
            Some(open_time) if bar_open_time > open_time => Some(Bar {
                open_time,
                close: self.last_bid,
            }),
            _ => None,
        };

        if completed.is_some() || self.current_open.is_none() {
            self.current_open = Some(bar_open_time);
        }
        self.last_bid = quote.bid;

        let tick = Tick {
            time: quote.time,
            bar_open_time: self.current_open.unwrap_or(bar_open_time),
            bid: quote.bid,
            ask: quote.ask,
        };

        Ok((tick, completed))
    }
}
