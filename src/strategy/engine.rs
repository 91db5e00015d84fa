//! Tick-driven grid decision engine.
//!
//! Each tick the engine:
//! 1. Aligns every ladder's take-profit with its average entry (always).
//! 2. Unless the funds latch is set or the spread is too wide:
//!    - opens a first layer for an empty, enabled direction when the last
//!      two bar closes show momentum in its favour;
//!    - adds a layer to any non-empty direction, enabled or not, once price
//!      has moved `pip_step` pips beyond its worst entry, at most once per bar.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::ladder::Ladder;
use super::sizer::VolumeSizer;
use super::status::{ChartAnnotation, LadderStatus, StatusReport};
use super::take_profit::{TakeProfitRefresh, TrailingTakeProfitManager};
use crate::config::GridConfig;
use crate::error::GridError;
use crate::exchange::{
    Bar, Direction, ExecutionError, ExecutionService, Fill, InstrumentSpec, MarketSnapshot,
    ModifyRequest, OpenRequest, Position, Tick,
};
use crate::risk::{FundsGuard, SpreadGuard};
use crate::utils::decimal::to_pips;

/// Per-direction bookkeeping owned by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectionState {
    /// Open time of the bar in which the last layer was opened
    pub last_layer_open_bar: Option<DateTime<Utc>>,
}

impl DirectionState {
    /// Whether a layer was already opened in the bar starting at `bar_open_time`.
    pub fn opened_in(&self, bar_open_time: DateTime<Utc>) -> bool {
        self.last_layer_open_bar == Some(bar_open_time)
    }
}

/// A request the engine sent to the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Open(OpenRequest),
    Modify(ModifyRequest),
}

/// Why new entries were not evaluated on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Spread wider than `max_spread_pips`
    Spread,
    /// The insufficient-funds latch is set
    FundsHalted,
}

/// Everything the engine did on one tick.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Requests sent, in order
    pub actions: Vec<Action>,
    /// Successful order executions
    pub fills: Vec<Fill>,
    /// Failures, all recoverable
    pub failures: Vec<GridError>,
    /// Set when the entry rules were skipped
    pub suppressed: Option<Suppression>,
}

impl TickOutcome {
    /// Order submissions sent this tick.
    pub fn open_requests(&self) -> impl Iterator<Item = &OpenRequest> {
        self.actions.iter().filter_map(|a| match a {
            Action::Open(request) => Some(request),
            Action::Modify(_) => None,
        })
    }

    /// Take-profit modifications sent this tick.
    pub fn modify_requests(&self) -> impl Iterator<Item = &ModifyRequest> {
        self.actions.iter().filter_map(|a| match a {
            Action::Modify(request) => Some(request),
            Action::Open(_) => None,
        })
    }

    fn absorb(&mut self, refresh: TakeProfitRefresh) {
        self.actions
            .extend(refresh.requests.into_iter().map(Action::Modify));
        self.failures.extend(refresh.failures);
    }
}

/// Grid/martingale decision engine for one instrument and label.
///
/// Ticks and bar closes must be delivered one at a time, in order.
pub struct GridEngine {
    config: GridConfig,
    instrument: InstrumentSpec,
    sizer: VolumeSizer,
    take_profit: TrailingTakeProfitManager,
    spread_guard: SpreadGuard,
    funds_guard: FundsGuard,
    long_state: DirectionState,
    short_state: DirectionState,
    /// Last two bar closes, oldest first
    closes: VecDeque<Decimal>,
}

impl GridEngine {
    /// Create a new engine.
    pub fn new(config: GridConfig, instrument: InstrumentSpec) -> Self {
        let sizer = VolumeSizer::new(config.volume_exponent, instrument.clone());
        let take_profit = TrailingTakeProfitManager::new(config.average_tp_pips, instrument.clone());
        let spread_guard = SpreadGuard::new(config.max_spread_pips);

        info!(
            label = %config.label,
            instrument = %instrument.code,
            long = config.enable_long,
            short = config.enable_short,
            pip_step = config.pip_step,
            first_volume = %config.first_volume,
            exponent = %config.volume_exponent,
            average_tp_pips = config.average_tp_pips,
            max_spread_pips = %config.max_spread_pips,
            "Grid engine started"
        );

        Self {
            config,
            instrument,
            sizer,
            take_profit,
            spread_guard,
            funds_guard: FundsGuard::new(),
            long_state: DirectionState::default(),
            short_state: DirectionState::default(),
            closes: VecDeque::with_capacity(2),
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn instrument(&self) -> &InstrumentSpec {
        &self.instrument
    }

    pub fn funds_guard(&self) -> &FundsGuard {
        &self.funds_guard
    }

    pub fn direction_state(&self, direction: Direction) -> &DirectionState {
        match direction {
            Direction::Long => &self.long_state,
            Direction::Short => &self.short_state,
        }
    }

    fn direction_state_mut(&mut self, direction: Direction) -> &mut DirectionState {
        match direction {
            Direction::Long => &mut self.long_state,
            Direction::Short => &mut self.short_state,
        }
    }

    fn is_enabled(&self, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.config.enable_long,
            Direction::Short => self.config.enable_short,
        }
    }

    /// This engine's positions of `direction` within a ledger snapshot.
    pub fn ladder<'a>(&self, positions: &'a [Position], direction: Direction) -> Ladder<'a> {
        Ladder::collect(positions, direction, &self.config.label, &self.instrument.code)
    }

    /// Record a closed bar for the momentum check.
    pub fn on_bar_close(&mut self, bar: &Bar) {
        if self.closes.len() == 2 {
            self.closes.pop_front();
        }
        self.closes.push_back(bar.close);
        debug!(open_time = %bar.open_time, close = %bar.close, "Bar closed");
    }

    /// Whether the last two closes favour `direction`.
    pub fn momentum_favours(&self, direction: Direction) -> bool {
        let (Some(&previous), Some(&last)) = (self.closes.front(), self.closes.get(1)) else {
            return false;
        };
        match direction {
            Direction::Long => last > previous,
            Direction::Short => previous > last,
        }
    }

    /// Evaluate one price tick against the current ledger snapshot.
    pub fn on_tick<E>(&mut self, tick: &Tick, positions: &[Position], execution: &mut E) -> TickOutcome
    where
        E: ExecutionService + ?Sized,
    {
        let snapshot = MarketSnapshot::new(tick, &self.instrument);
        let mut outcome = TickOutcome::default();

        for direction in Direction::ALL {
            let ladder = self.ladder(positions, direction);
            if !ladder.is_empty() {
                outcome.absorb(self.take_profit.refresh(&ladder, execution));
            }
        }

        if self.funds_guard.is_halted() {
            outcome.suppressed = Some(Suppression::FundsHalted);
            return outcome;
        }
        if !self.spread_guard.allows(&snapshot) {
            outcome.suppressed = Some(Suppression::Spread);
            return outcome;
        }

        for direction in Direction::ALL {
            if self.is_enabled(direction)
                && self.ladder(positions, direction).is_empty()
                && self.momentum_favours(direction)
            {
                self.open_initial_layer(direction, tick, execution, &mut outcome);
            }
        }

        // Existing ladders keep averaging even when their direction is disabled.
        for direction in Direction::ALL {
            let ladder = self.ladder(positions, direction);
            if !ladder.is_empty() {
                self.evaluate_add_layer(&ladder, &snapshot, tick, execution, &mut outcome);
            }
        }

        outcome
    }

    fn open_initial_layer<E>(
        &mut self,
        direction: Direction,
        tick: &Tick,
        execution: &mut E,
        outcome: &mut TickOutcome,
    ) where
        E: ExecutionService + ?Sized,
    {
        if self.direction_state(direction).opened_in(tick.bar_open_time) {
            debug!(%direction, "First layer already opened in this bar");
            return;
        }

        match self.sizer.initial_volume(direction, self.config.first_volume) {
            Ok(volume) => self.submit_layer(direction, volume, tick, execution, outcome),
            Err(e) => {
                warn!(%direction, error = %e, "First layer not submitted");
                outcome.failures.push(e);
            }
        }
    }

    fn evaluate_add_layer<E>(
        &mut self,
        ladder: &Ladder<'_>,
        snapshot: &MarketSnapshot,
        tick: &Tick,
        execution: &mut E,
        outcome: &mut TickOutcome,
    ) where
        E: ExecutionService + ?Sized,
    {
        let direction = ladder.direction();
        let Some(worst) = ladder.worst_entry() else {
            return;
        };

        let step = self.instrument.pips(Decimal::from(self.config.pip_step));
        let trigger = self.instrument.round_price(direction.adverse_offset(worst, step));
        let price = self
            .instrument
            .round_price(direction.entry_side(snapshot.bid, snapshot.ask));

        if !direction.is_at_or_beyond(price, trigger) {
            return;
        }

        if self.direction_state(direction).opened_in(tick.bar_open_time) {
            debug!(
                %direction,
                bar_open_time = %tick.bar_open_time,
                "Layer already opened in this bar"
            );
            return;
        }

        match self.sizer.next_volume(ladder) {
            Ok(volume) => {
                debug!(
                    %direction,
                    %worst,
                    %price,
                    distance_pips = %to_pips((price - worst).abs(), self.instrument.pip_size),
                    layers = ladder.len(),
                    "Adding grid layer"
                );
                self.submit_layer(direction, volume, tick, execution, outcome);
            }
            Err(e) => {
                warn!(%direction, error = %e, "Volume calculation error, layer skipped");
                outcome.failures.push(e);
            }
        }
    }

    fn submit_layer<E>(
        &mut self,
        direction: Direction,
        volume: Decimal,
        tick: &Tick,
        execution: &mut E,
        outcome: &mut TickOutcome,
    ) where
        E: ExecutionService + ?Sized,
    {
        // The latch can trip on an earlier submission within the same tick.
        if self.funds_guard.is_halted() {
            return;
        }

        let request = OpenRequest {
            direction,
            volume,
            label: self.config.label.clone(),
            instrument_code: self.instrument.code.clone(),
        };
        outcome.actions.push(Action::Open(request.clone()));

        match execution.submit_order(&request) {
            Ok(fill) => {
                info!(
                    position_id = fill.position_id,
                    %direction,
                    volume = %fill.volume,
                    entry_price = %fill.entry_price,
                    "Layer opened"
                );
                self.direction_state_mut(direction).last_layer_open_bar = Some(tick.bar_open_time);
                outcome.fills.push(fill);
            }
            Err(ExecutionError::InsufficientFunds) => {
                self.funds_guard.trip(tick.time);
                outcome
                    .failures
                    .push(GridError::InsufficientFunds { direction });
            }
            Err(e) => {
                warn!(
                    %direction,
                    %volume,
                    bid = %tick.bid,
                    ask = %tick.ask,
                    error = %e,
                    "Opening error, will retry on a later tick"
                );
                outcome.failures.push(GridError::OrderRejected {
                    direction,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Human-readable status for the current tick.
    pub fn status(&self, tick: &Tick, positions: &[Position]) -> StatusReport {
        let snapshot = MarketSnapshot::new(tick, &self.instrument);
        let spread_pips = snapshot.spread_pips();

        let ladder_status = |direction: Direction| {
            let ladder = self.ladder(positions, direction);
            if ladder.is_empty() {
                return None;
            }
            let average_entry = self.take_profit_average(&ladder);
            let away = match direction {
                Direction::Long => average_entry - tick.bid,
                Direction::Short => tick.ask - average_entry,
            };
            Some(LadderStatus {
                count: ladder.len(),
                average_entry,
                target_away_pips: to_pips(away, self.instrument.pip_size).round_dp(1),
            })
        };

        StatusReport {
            spread_pips: spread_pips.round_dp(1),
            spread_exceeded: spread_pips > self.spread_guard.max_spread_pips(),
            halted: self.funds_guard.is_halted(),
            long: ladder_status(Direction::Long),
            short: ladder_status(Direction::Short),
        }
    }

    /// Chart annotation requests for the ladders' average prices.
    pub fn annotations(&self, positions: &[Position]) -> Vec<ChartAnnotation> {
        Direction::ALL
            .into_iter()
            .map(|direction| {
                let ladder = self.ladder(positions, direction);
                if ladder.len() > 1 {
                    ChartAnnotation::AverageLine {
                        direction,
                        price: self.take_profit_average(&ladder),
                    }
                } else {
                    ChartAnnotation::Clear { direction }
                }
            })
            .collect()
    }

    fn take_profit_average(&self, ladder: &Ladder<'_>) -> Decimal {
        self.take_profit.average_entry(ladder)
    }
}

#[cfg(test)]
mod tests {
    use super::super::ladder::test_support::*;
    use super::*;
    use crate::exchange::MockExecutionService;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn grid_config() -> GridConfig {
        GridConfig {
            enable_long: true,
            enable_short: true,
            pip_step: 10,
            first_volume: dec!(1000),
            max_spread_pips: dec!(3),
            average_tp_pips: 3,
            volume_exponent: dec!(2),
            label: "piprunner".to_string(),
        }
    }

    fn long_only() -> GridConfig {
        GridConfig {
            enable_short: false,
            ..grid_config()
        }
    }

    fn bar_time(bar: i64) -> DateTime<Utc> {
        t0() + Duration::hours(bar)
    }

    fn tick_in(bar: i64, second: i64, bid: Decimal, ask: Decimal) -> Tick {
        Tick {
            time: bar_time(bar) + Duration::seconds(second),
            bar_open_time: bar_time(bar),
            bid,
            ask,
        }
    }

    fn close_bars(engine: &mut GridEngine, closes: &[Decimal]) {
        for (i, close) in closes.iter().enumerate() {
            engine.on_bar_close(&Bar {
                open_time: bar_time(i as i64 - closes.len() as i64),
                close: *close,
            });
        }
    }

    fn fill_at(price: Decimal) -> impl FnMut(&OpenRequest) -> Result<Fill, ExecutionError> {
        let mut next_id = 100;
        move |request| {
            next_id += 1;
            Ok(Fill {
                position_id: next_id,
                direction: request.direction,
                entry_price: price,
                volume: request.volume,
                time: t0(),
            })
        }
    }

    #[test]
    fn test_momentum_requires_two_closes() {
        let mut engine = GridEngine::new(grid_config(), eurusd());
        assert!(!engine.momentum_favours(Direction::Long));

        engine.on_bar_close(&Bar { open_time: t0(), close: dec!(1.1050) });
        assert!(!engine.momentum_favours(Direction::Long));

        engine.on_bar_close(&Bar { open_time: bar_time(1), close: dec!(1.1060) });
        assert!(engine.momentum_favours(Direction::Long));
        assert!(!engine.momentum_favours(Direction::Short));

        engine.on_bar_close(&Bar { open_time: bar_time(2), close: dec!(1.1055) });
        assert!(!engine.momentum_favours(Direction::Long));
        assert!(engine.momentum_favours(Direction::Short));
    }

    #[test]
    fn test_initial_entry_on_momentum() {
        let mut engine = GridEngine::new(grid_config(), eurusd());
        close_bars(&mut engine, &[dec!(1.1050), dec!(1.1060)]);

        let mut execution = MockExecutionService::new();
        execution
            .expect_submit_order()
            .withf(|r| r.direction == Direction::Long && r.volume == dec!(1000))
            .times(1)
            .returning(fill_at(dec!(1.1060)));

        let tick = tick_in(0, 1, dec!(1.10590), dec!(1.10600));
        let outcome = engine.on_tick(&tick, &[], &mut execution);

        let opens: Vec<_> = outcome.open_requests().collect();
        assert_eq!(opens.len(), 1);
        assert_eq!(opens[0].label, "piprunner");
        assert_eq!(opens[0].instrument_code, "EURUSD");
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(
            engine.direction_state(Direction::Long).last_layer_open_bar,
            Some(bar_time(0))
        );
        // Short direction saw no momentum and stays untouched
        assert_eq!(engine.direction_state(Direction::Short).last_layer_open_bar, None);
    }

    #[test]
    fn test_no_entry_without_momentum() {
        let mut engine = GridEngine::new(grid_config(), eurusd());
        close_bars(&mut engine, &[dec!(1.1060), dec!(1.1060)]);

        let mut execution = MockExecutionService::new();
        execution.expect_submit_order().never();

        let outcome = engine.on_tick(&tick_in(0, 1, dec!(1.1059), dec!(1.1060)), &[], &mut execution);
        assert!(outcome.actions.is_empty());
    }

    #[test]
    fn test_disabled_direction_is_ignored() {
        let mut engine = GridEngine::new(long_only(), eurusd());
        close_bars(&mut engine, &[dec!(1.1060), dec!(1.1050)]);

        let mut execution = MockExecutionService::new();
        execution.expect_submit_order().never();

        let outcome = engine.on_tick(&tick_in(0, 1, dec!(1.1049), dec!(1.1050)), &[], &mut execution);
        assert_eq!(outcome.open_requests().count(), 0);
    }

    #[test]
    fn test_scenario_first_layer_then_doubled_layer() {
        let mut engine = GridEngine::new(long_only(), eurusd());
        close_bars(&mut engine, &[dec!(1.1050), dec!(1.1060)]);

        let mut execution = MockExecutionService::new();
        execution
            .expect_submit_order()
            .withf(|r| r.volume == dec!(1000))
            .times(1)
            .returning(fill_at(dec!(1.1060)));
        let outcome = engine.on_tick(&tick_in(0, 1, dec!(1.10590), dec!(1.10600)), &[], &mut execution);
        assert_eq!(outcome.fills.len(), 1);

        // Broker now reports the first layer with its take-profit aligned.
        let mut first = position(1, Direction::Long, dec!(1.1060), dec!(1000), 0);
        first.take_profit = Some(dec!(1.10630));
        let positions = vec![first];

        // Next bar, ask 11 pips below the only entry.
        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().never();
        execution
            .expect_submit_order()
            .withf(|r| r.direction == Direction::Long && r.volume == dec!(2000))
            .times(1)
            .returning(fill_at(dec!(1.1049)));

        let tick = tick_in(1, 5, dec!(1.10480), dec!(1.10490));
        let outcome = engine.on_tick(&tick, &positions, &mut execution);
        assert_eq!(outcome.open_requests().count(), 1);
        assert!(outcome.failures.is_empty());

        // Resulting ladder average
        let second = position(2, Direction::Long, dec!(1.1049), dec!(2000), 60);
        let positions = vec![positions[0].clone(), second];
        let ladder = engine.ladder(&positions, Direction::Long);
        let expected = ((dec!(1.1060) * dec!(1000) + dec!(1.1049) * dec!(2000)) / dec!(3000)).round_dp(5);
        assert_eq!(engine.take_profit_average(&ladder), expected);
    }

    #[test]
    fn test_add_layer_requires_full_pip_step() {
        let mut engine = GridEngine::new(long_only(), eurusd());
        let positions = vec![position(1, Direction::Long, dec!(1.10600), dec!(1000), 0)];

        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        execution.expect_submit_order().never();

        // 9.9 pips adverse: not yet
        let outcome = engine.on_tick(&tick_in(1, 0, dec!(1.10491), dec!(1.10501)), &positions, &mut execution);
        assert_eq!(outcome.open_requests().count(), 0);

        // Exactly 10 pips adverse: add
        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        execution
            .expect_submit_order()
            .times(1)
            .returning(fill_at(dec!(1.10500)));
        let outcome = engine.on_tick(&tick_in(1, 1, dec!(1.10490), dec!(1.10500)), &positions, &mut execution);
        assert_eq!(outcome.open_requests().count(), 1);
    }

    #[test]
    fn test_short_layer_uses_bid_and_highest_entry() {
        let config = GridConfig {
            enable_long: false,
            ..grid_config()
        };
        let mut engine = GridEngine::new(config, eurusd());
        let positions = vec![
            position(1, Direction::Short, dec!(1.10000), dec!(1000), 0),
            position(2, Direction::Short, dec!(1.10100), dec!(2000), 60),
        ];

        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        execution.expect_submit_order().never();
        // Ask is far above but bid only 9 pips over the worst entry
        let outcome = engine.on_tick(&tick_in(2, 0, dec!(1.10190), dec!(1.10220)), &positions, &mut execution);
        assert_eq!(outcome.open_requests().count(), 0);

        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        execution
            .expect_submit_order()
            .withf(|r| r.direction == Direction::Short && r.volume == dec!(4000))
            .times(1)
            .returning(fill_at(dec!(1.10200)));
        let outcome = engine.on_tick(&tick_in(2, 1, dec!(1.10200), dec!(1.10220)), &positions, &mut execution);
        assert_eq!(outcome.open_requests().count(), 1);
    }

    #[test]
    fn test_at_most_one_layer_per_bar() {
        let mut engine = GridEngine::new(long_only(), eurusd());
        let positions = vec![position(1, Direction::Long, dec!(1.10600), dec!(1000), 0)];

        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        execution
            .expect_submit_order()
            .times(1)
            .returning(fill_at(dec!(1.10400)));

        // The ledger snapshot is deliberately stale: even if the broker has
        // not reported the new layer yet, the bar guard holds.
        let mut opens = 0;
        for second in 0..50 {
            let tick = tick_in(1, second, dec!(1.10390), dec!(1.10400));
            opens += engine
                .on_tick(&tick, &positions, &mut execution)
                .open_requests()
                .count();
        }
        assert_eq!(opens, 1);

        // A new bar re-opens the gate
        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        execution
            .expect_submit_order()
            .times(1)
            .returning(fill_at(dec!(1.10400)));
        let outcome = engine.on_tick(&tick_in(2, 0, dec!(1.10390), dec!(1.10400)), &positions, &mut execution);
        assert_eq!(outcome.open_requests().count(), 1);
    }

    #[test]
    fn test_rejection_allows_retry_in_same_bar() {
        let mut engine = GridEngine::new(long_only(), eurusd());
        let positions = vec![position(1, Direction::Long, dec!(1.10600), dec!(1000), 0)];

        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        let mut seq = mockall::Sequence::new();
        execution
            .expect_submit_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ExecutionError::rejected("requote")));
        execution
            .expect_submit_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(fill_at(dec!(1.10400)));

        let first = engine.on_tick(&tick_in(1, 0, dec!(1.10390), dec!(1.10400)), &positions, &mut execution);
        assert!(matches!(
            first.failures.as_slice(),
            [GridError::OrderRejected { direction: Direction::Long, .. }]
        ));
        assert_eq!(engine.direction_state(Direction::Long).last_layer_open_bar, None);

        let second = engine.on_tick(&tick_in(1, 1, dec!(1.10390), dec!(1.10400)), &positions, &mut execution);
        assert_eq!(second.fills.len(), 1);
        assert_eq!(
            engine.direction_state(Direction::Long).last_layer_open_bar,
            Some(bar_time(1))
        );
    }

    #[test]
    fn test_disabled_direction_still_ladders_existing_positions() {
        let mut engine = GridEngine::new(long_only(), eurusd());
        // Short ladder left over from before the direction was switched off
        let positions = vec![position(1, Direction::Short, dec!(1.10000), dec!(1000), 0)];

        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        execution
            .expect_submit_order()
            .withf(|r| r.direction == Direction::Short && r.volume == dec!(2000))
            .times(1)
            .returning(fill_at(dec!(1.10200)));

        let outcome = engine.on_tick(&tick_in(1, 0, dec!(1.10200), dec!(1.10210)), &positions, &mut execution);
        assert_eq!(outcome.open_requests().count(), 1);
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(
            engine.direction_state(Direction::Short).last_layer_open_bar,
            Some(bar_time(1))
        );
    }

    #[test]
    fn test_invalid_volume_skips_submission() {
        let mut instrument = eurusd();
        instrument.volume_min = dec!(0);
        let config = GridConfig {
            volume_exponent: dec!(0.1),
            ..long_only()
        };
        let mut engine = GridEngine::new(config, instrument);
        let positions = vec![position(1, Direction::Long, dec!(1.10600), dec!(1000), 0)];

        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        execution.expect_submit_order().never();

        // 11 pips adverse, but 1000 * 0.1 normalizes to nothing
        let outcome = engine.on_tick(&tick_in(1, 0, dec!(1.10480), dec!(1.10490)), &positions, &mut execution);
        assert_eq!(outcome.open_requests().count(), 0);
        assert!(matches!(
            outcome.failures.as_slice(),
            [GridError::InvalidVolume { direction: Direction::Long, .. }]
        ));
        assert_eq!(engine.direction_state(Direction::Long).last_layer_open_bar, None);
        assert!(!engine.funds_guard().is_halted());
    }

    #[test]
    fn test_rejected_take_profit_is_reissued_next_tick() {
        let mut engine = GridEngine::new(long_only(), eurusd());
        let positions = vec![position(1, Direction::Long, dec!(1.10600), dec!(1000), 0)];

        let mut execution = MockExecutionService::new();
        execution.expect_submit_order().never();
        let mut seq = mockall::Sequence::new();
        execution
            .expect_modify_position()
            .withf(|r| r.position_id == 1 && r.take_profit == Some(dec!(1.10630)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ExecutionError::rejected("market closed")));
        execution
            .expect_modify_position()
            .withf(|r| r.position_id == 1 && r.take_profit == Some(dec!(1.10630)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let first = engine.on_tick(&tick_in(1, 0, dec!(1.10590), dec!(1.10600)), &positions, &mut execution);
        assert!(matches!(
            first.failures.as_slice(),
            [GridError::ModifyRejected { position_id: 1, .. }]
        ));

        // The ledger still reports no take-profit, so the update goes out again
        let second = engine.on_tick(&tick_in(1, 1, dec!(1.10590), dec!(1.10600)), &positions, &mut execution);
        assert_eq!(second.modify_requests().count(), 1);
        assert!(second.failures.is_empty());
    }

    #[test]
    fn test_spread_guard_blocks_entries_but_not_take_profit() {
        let mut engine = GridEngine::new(grid_config(), eurusd());
        close_bars(&mut engine, &[dec!(1.1050), dec!(1.1060)]);
        let positions = vec![position(1, Direction::Short, dec!(1.09000), dec!(1000), 0)];

        let mut execution = MockExecutionService::new();
        execution.expect_submit_order().never();
        execution
            .expect_modify_position()
            .times(1)
            .returning(|_| Ok(()));

        // Spread 5 pips, short ladder deep in drawdown, long momentum present
        let outcome = engine.on_tick(&tick_in(0, 0, dec!(1.10000), dec!(1.10050)), &positions, &mut execution);
        assert_eq!(outcome.suppressed, Some(Suppression::Spread));
        assert_eq!(outcome.open_requests().count(), 0);
        assert_eq!(outcome.modify_requests().count(), 1);

        // Spread narrows: entries resume
        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        execution
            .expect_submit_order()
            .times(2)
            .returning(fill_at(dec!(1.10010)));
        let outcome = engine.on_tick(&tick_in(0, 1, dec!(1.10000), dec!(1.10010)), &positions, &mut execution);
        assert_eq!(outcome.suppressed, None);
        assert_eq!(outcome.open_requests().count(), 2);
    }

    #[test]
    fn test_insufficient_funds_latches_for_session() {
        let mut engine = GridEngine::new(grid_config(), eurusd());
        close_bars(&mut engine, &[dec!(1.1050), dec!(1.1060)]);

        let mut execution = MockExecutionService::new();
        execution
            .expect_submit_order()
            .times(1)
            .returning(|_| Err(ExecutionError::InsufficientFunds));

        let outcome = engine.on_tick(&tick_in(0, 0, dec!(1.10590), dec!(1.10600)), &[], &mut execution);
        assert_eq!(
            outcome.failures,
            vec![GridError::InsufficientFunds { direction: Direction::Long }]
        );
        assert!(engine.funds_guard().is_halted());

        // Every later tick satisfies the entry rules, yet nothing is submitted.
        let positions = vec![position(1, Direction::Long, dec!(1.10600), dec!(1000), 0)];
        let mut execution = MockExecutionService::new();
        execution.expect_submit_order().never();
        execution.expect_modify_position().times(3).returning(|_| Ok(()));
        for bar in 1..4 {
            let outcome = engine.on_tick(&tick_in(bar, 0, dec!(1.10000), dec!(1.10010)), &positions, &mut execution);
            assert_eq!(outcome.suppressed, Some(Suppression::FundsHalted));
            assert_eq!(outcome.open_requests().count(), 0);
        }
    }

    #[test]
    fn test_funds_latch_stops_second_direction_same_tick() {
        let mut engine = GridEngine::new(grid_config(), eurusd());
        // Two existing ladders both due a layer
        let positions = vec![
            position(1, Direction::Long, dec!(1.10600), dec!(1000), 0),
            position(2, Direction::Short, dec!(1.09000), dec!(1000), 0),
        ];

        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().returning(|_| Ok(()));
        execution
            .expect_submit_order()
            .times(1)
            .returning(|_| Err(ExecutionError::InsufficientFunds));

        let outcome = engine.on_tick(&tick_in(1, 0, dec!(1.10000), dec!(1.10010)), &positions, &mut execution);
        assert_eq!(outcome.open_requests().count(), 1);
        assert!(engine.funds_guard().is_halted());
    }

    #[test]
    fn test_take_profit_follows_average_every_tick() {
        let mut engine = GridEngine::new(long_only(), eurusd());
        let positions = vec![
            position(1, Direction::Long, dec!(1.10600), dec!(1000), 0),
            position(2, Direction::Long, dec!(1.10490), dec!(2000), 60),
        ];

        let mut execution = MockExecutionService::new();
        execution
            .expect_modify_position()
            .withf(|r| r.take_profit == Some(dec!(1.10557)))
            .times(2)
            .returning(|_| Ok(()));

        let outcome = engine.on_tick(&tick_in(1, 0, dec!(1.10500), dec!(1.10510)), &positions, &mut execution);
        assert_eq!(outcome.modify_requests().count(), 2);
        assert_eq!(outcome.open_requests().count(), 0);
    }

    #[test]
    fn test_foreign_positions_are_invisible() {
        let mut engine = GridEngine::new(long_only(), eurusd());
        let mut foreign = position(1, Direction::Long, dec!(1.10600), dec!(1000), 0);
        foreign.label = "manual".to_string();

        let mut execution = MockExecutionService::new();
        execution.expect_modify_position().never();
        execution.expect_submit_order().never();

        // Far below the foreign entry, but this engine owns no long ladder
        // and has no momentum.
        let outcome = engine.on_tick(&tick_in(1, 0, dec!(1.09000), dec!(1.09010)), &[foreign], &mut execution);
        assert!(outcome.actions.is_empty());
    }

    #[test]
    fn test_status_and_annotations() {
        let engine = GridEngine::new(grid_config(), eurusd());
        let positions = vec![
            position(1, Direction::Long, dec!(1.10600), dec!(1000), 0),
            position(2, Direction::Long, dec!(1.10490), dec!(2000), 60),
            position(3, Direction::Short, dec!(1.10000), dec!(1000), 0),
        ];
        let tick = tick_in(1, 0, dec!(1.10500), dec!(1.10510));

        let status = engine.status(&tick, &positions);
        assert_eq!(status.spread_pips, dec!(1.0));
        assert!(!status.spread_exceeded);
        let long = status.long.as_ref().unwrap();
        assert_eq!(long.count, 2);
        assert_eq!(long.average_entry, dec!(1.10527));
        assert_eq!(long.target_away_pips, dec!(2.7));
        let short = status.short.as_ref().unwrap();
        assert_eq!(short.target_away_pips, dec!(51.0));

        let annotations = engine.annotations(&positions);
        assert_eq!(
            annotations,
            vec![
                ChartAnnotation::AverageLine {
                    direction: Direction::Long,
                    price: dec!(1.10527)
                },
                ChartAnnotation::Clear {
                    direction: Direction::Short
                },
            ]
        );
    }
}
