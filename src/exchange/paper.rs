//! Simulated broker for paper trading and historical replay.

use super::traits::{ExecutionError, ExecutionService, PositionLedger};
use super::types::*;
use crate::utils::decimal::is_multiple_of;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Why a simulated position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
}

/// A position closed by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position_id: PositionId,
    pub direction: Direction,
    pub volume: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub pnl: Decimal,
    pub reason: ExitReason,
}

/// Simulated account state.
#[derive(Debug, Clone)]
pub struct PaperAccount {
    pub initial_balance: Decimal,
    pub balance: Decimal,
    pub positions: Vec<Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub order_count: u64,
}

/// Paper broker that fills market orders at the last seen quote.
///
/// Positions are closed when a tick touches their take-profit or stop-loss.
pub struct PaperBroker {
    instrument: InstrumentSpec,
    leverage: Decimal,
    account: PaperAccount,
    next_position_id: PositionId,
    last_tick: Option<Tick>,
}

impl PaperBroker {
    /// Create a new paper broker with initial balance.
    pub fn new(instrument: InstrumentSpec, initial_balance: Decimal, leverage: Decimal) -> Self {
        Self {
            instrument,
            leverage,
            account: PaperAccount {
                initial_balance,
                balance: initial_balance,
                positions: Vec::new(),
                closed_trades: Vec::new(),
                order_count: 0,
            },
            next_position_id: 1,
            last_tick: None,
        }
    }

    /// Current account state.
    pub fn account(&self) -> &PaperAccount {
        &self.account
    }

    /// Instrument traded by this broker.
    pub fn instrument(&self) -> &InstrumentSpec {
        &self.instrument
    }

    /// Feed a new quote, closing any position whose protective level is touched.
    ///
    /// Returns the trades closed on this tick.
    pub fn on_tick(&mut self, tick: &Tick) -> Vec<ClosedTrade> {
        self.last_tick = Some(*tick);

        let mut closed = Vec::new();
        let mut still_open = Vec::with_capacity(self.account.positions.len());

        for position in self.account.positions.drain(..) {
            let exit = position.direction.exit_side(tick.bid, tick.ask);
            let reason = match (position.take_profit, position.stop_loss) {
                (Some(tp), _) if position.direction.has_reached(exit, tp) => {
                    Some((ExitReason::TakeProfit, tp))
                }
                (_, Some(sl)) if position.direction.is_at_or_beyond(exit, sl) => {
                    Some((ExitReason::StopLoss, sl))
                }
                _ => None,
            };

            match reason {
                Some((reason, level)) => {
                    let pnl = position.direction.pnl(position.entry_price, level, position.volume);
                    closed.push(ClosedTrade {
                        position_id: position.id,
                        direction: position.direction,
                        volume: position.volume,
                        entry_price: position.entry_price,
                        exit_price: level,
                        opened_at: position.opened_at,
                        closed_at: tick.time,
                        pnl,
                        reason,
                    });
                }
                None => still_open.push(position),
            }
        }

        self.account.positions = still_open;

        for trade in &closed {
            self.account.balance += trade.pnl;
            info!(
                position_id = trade.position_id,
                direction = %trade.direction,
                volume = %trade.volume,
                entry = %trade.entry_price,
                exit = %trade.exit_price,
                pnl = %trade.pnl,
                reason = ?trade.reason,
                "Paper position closed"
            );
        }
        self.account.closed_trades.extend(closed.iter().cloned());

        closed
    }

    /// Unrealized profit of all open positions at the last quote.
    pub fn unrealized_pnl(&self) -> Decimal {
        let Some(tick) = self.last_tick else {
            return Decimal::ZERO;
        };

        self.account
            .positions
            .iter()
            .map(|p| {
                let exit = p.direction.exit_side(tick.bid, tick.ask);
                p.direction.pnl(p.entry_price, exit, p.volume)
            })
            .sum()
    }

    /// Balance plus unrealized profit.
    pub fn equity(&self) -> Decimal {
        self.account.balance + self.unrealized_pnl()
    }

    /// Margin locked by open positions.
    pub fn used_margin(&self) -> Decimal {
        self.account
            .positions
            .iter()
            .map(|p| self.margin_for(p.entry_price, p.volume))
            .sum()
    }

    /// Equity not locked as margin.
    pub fn free_margin(&self) -> Decimal {
        self.equity() - self.used_margin()
    }

    fn margin_for(&self, price: Decimal, volume: Decimal) -> Decimal {
        if self.leverage <= Decimal::ZERO {
            return price * volume;
        }
        price * volume / self.leverage
    }

    fn next_position_id(&mut self) -> PositionId {
        let id = self.next_position_id;
        self.next_position_id += 1;
        id
    }

    fn validate_volume(&self, volume: Decimal) -> Result<(), ExecutionError> {
        if volume <= Decimal::ZERO {
            return Err(ExecutionError::rejected(format!("invalid volume {volume}")));
        }
        if !is_multiple_of(volume, self.instrument.volume_step) {
            return Err(ExecutionError::rejected(format!(
                "volume {volume} is not a multiple of step {}",
                self.instrument.volume_step
            )));
        }
        if volume < self.instrument.volume_min || volume > self.instrument.volume_max {
            return Err(ExecutionError::rejected(format!(
                "volume {volume} outside [{}, {}]",
                self.instrument.volume_min, self.instrument.volume_max
            )));
        }
        Ok(())
    }
}

impl ExecutionService for PaperBroker {
    fn submit_order(&mut self, request: &OpenRequest) -> Result<Fill, ExecutionError> {
        let tick = self.last_tick.ok_or(ExecutionError::NoQuote)?;

        if request.instrument_code != self.instrument.code {
            return Err(ExecutionError::rejected(format!(
                "unknown instrument {}",
                request.instrument_code
            )));
        }
        self.validate_volume(request.volume)?;

        let price = request.direction.entry_side(tick.bid, tick.ask);
        let required = self.margin_for(price, request.volume);
        let free = self.free_margin();
        if required > free {
            warn!(
                direction = %request.direction,
                volume = %request.volume,
                required_margin = %required,
                free_margin = %free,
                "Paper order refused: insufficient funds"
            );
            return Err(ExecutionError::InsufficientFunds);
        }

        let position_id = self.next_position_id();
        self.account.positions.push(Position {
            id: position_id,
            direction: request.direction,
            entry_price: price,
            volume: request.volume,
            take_profit: None,
            stop_loss: None,
            label: request.label.clone(),
            instrument_code: request.instrument_code.clone(),
            opened_at: tick.time,
        });
        self.account.order_count += 1;

        debug!(
            position_id,
            direction = %request.direction,
            volume = %request.volume,
            price = %price,
            "Paper order executed"
        );

        Ok(Fill {
            position_id,
            direction: request.direction,
            entry_price: price,
            volume: request.volume,
            time: tick.time,
        })
    }

    fn modify_position(&mut self, request: &ModifyRequest) -> Result<(), ExecutionError> {
        let position = self
            .account
            .positions
            .iter_mut()
            .find(|p| p.id == request.position_id)
            .ok_or(ExecutionError::PositionNotFound(request.position_id))?;

        if request.take_profit.is_some_and(|tp| tp <= Decimal::ZERO) {
            return Err(ExecutionError::rejected("take-profit must be positive"));
        }

        position.take_profit = request.take_profit;
        position.stop_loss = request.stop_loss;
        Ok(())
    }
}

impl PositionLedger for PaperBroker {
    fn snapshot(&self) -> Vec<Position> {
        self.account.positions.clone()
    }
}
