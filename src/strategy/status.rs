//! Operator-facing status text and chart annotation requests.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::exchange::Direction;

/// Summary of one direction's ladder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LadderStatus {
    pub count: usize,
    pub average_entry: Decimal,
    /// Distance from the current exit-side price back to the average, in pips
    pub target_away_pips: Decimal,
}

/// Snapshot of the engine's view of the market and its ladders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub spread_pips: Decimal,
    pub spread_exceeded: bool,
    pub halted: bool,
    pub long: Option<LadderStatus>,
    pub short: Option<LadderStatus>,
}

impl StatusReport {
    pub fn ladder(&self, direction: Direction) -> Option<&LadderStatus> {
        match direction {
            Direction::Long => self.long.as_ref(),
            Direction::Short => self.short.as_ref(),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.spread_exceeded {
            return write!(f, "MAX SPREAD EXCEEDED");
        }

        writeln!(f, "PipRunner")?;
        for direction in Direction::ALL {
            if let Some(ladder) = self.ladder(direction) {
                writeln!(f, "{direction} Positions: {}", ladder.count)?;
            }
        }
        write!(f, "Spread: {:.1}", self.spread_pips)?;
        for direction in Direction::ALL {
            if let Some(ladder) = self.ladder(direction) {
                write!(
                    f,
                    "\n{direction} Target Away: {:.1}",
                    ladder.target_away_pips
                )?;
            }
        }
        if self.halted {
            write!(f, "\nOpening stopped: not enough money")?;
        }
        Ok(())
    }
}

/// Request to draw or remove a ladder's average-price line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartAnnotation {
    /// Horizontal line at the ladder's average entry (more than one layer)
    AverageLine { direction: Direction, price: Decimal },
    /// Remove any line for this direction
    Clear { direction: Direction },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn report() -> StatusReport {
        StatusReport {
            spread_pips: dec!(1.23),
            spread_exceeded: false,
            halted: false,
            long: Some(LadderStatus {
                count: 2,
                average_entry: dec!(1.10527),
                target_away_pips: dec!(2.7),
            }),
            short: None,
        }
    }

    #[test]
    fn test_display_lists_ladders() {
        let text = report().to_string();
        assert_eq!(
            text,
            "PipRunner\nLong Positions: 2\nSpread: 1.2\nLong Target Away: 2.7"
        );
    }

    #[test]
    fn test_display_spread_exceeded() {
        let mut report = report();
        report.spread_exceeded = true;
        assert_eq!(report.to_string(), "MAX SPREAD EXCEEDED");
    }

    #[test]
    fn test_display_halt_line() {
        let mut report = report();
        report.halted = true;
        assert!(report
            .to_string()
            .ends_with("Opening stopped: not enough money"));
    }

    #[test]
    fn test_annotation_serializes_with_kind() {
        let line = ChartAnnotation::AverageLine {
            direction: Direction::Long,
            price: dec!(1.10527),
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["kind"], "average_line");
        assert_eq!(json["direction"], "LONG");
    }
}
