//! Shared strategy lifecycle and runtime state.
//!
//! Concrete strategies (`strategies::rsi`, `strategies::sma`, `strategies::macd`)
//! compose a [`StrategyRuntime`] rather than inheriting from a common base:
//! each carries its own parameter record and indicator-state record, with the
//! runtime supplying the rolling buffers, lifecycle state machine, and
//! cooldown bookkeeping common to all three.

use crate::indicators::RingBuffer;
use chrono::{DateTime, Utc};
use gekko_core::{Signal, StrategyMetrics, TradingResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const ERROR_LOG_CAPACITY: usize = 50;
const SIGNAL_HISTORY_CAPACITY: usize = 100;
const INDICATOR_HISTORY_CAPACITY: usize = 500;

/// Lifecycle state of a strategy instance.
///
/// Transitions: `Inactive -> Initializing -> Active <-> Paused`; any state can
/// move to `Error`; `Stopped` is reached from any state via `Stop` and is
/// terminal only for the purposes of `ExecuteStrategy` (a `Reset` can revive
/// it back to `Inactive`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyState {
    Inactive,
    Initializing,
    Active,
    Paused,
    Error,
    Stopped,
}

impl StrategyState {
    pub fn is_active(&self) -> bool {
        matches!(self, StrategyState::Active)
    }
}

/// Shared bookkeeping composed into every concrete strategy: rolling
/// price/volume history, bounded error and signal logs, per-kind emission
/// cooldowns, and the metrics record the engine reads back.
pub struct StrategyRuntime {
    pub state: StrategyState,
    pub closes: RingBuffer<f64>,
    pub volumes: RingBuffer<f64>,
    pub error_log: RingBuffer<String>,
    pub signal_history: RingBuffer<Signal>,
    pub metrics: StrategyMetrics,
    pub last_execution: Duration,
    last_emitted_at: HashMap<&'static str, DateTime<Utc>>,
}

impl StrategyRuntime {
    pub fn new(history_cap: usize) -> Self {
        let cap = history_cap.max(INDICATOR_HISTORY_CAPACITY.min(history_cap.max(1)));
        Self {
            state: StrategyState::Inactive,
            closes: RingBuffer::new(cap),
            volumes: RingBuffer::new(cap),
            error_log: RingBuffer::new(ERROR_LOG_CAPACITY),
            signal_history: RingBuffer::new(SIGNAL_HISTORY_CAPACITY),
            metrics: StrategyMetrics::new(),
            last_execution: Duration::ZERO,
            last_emitted_at: HashMap::new(),
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_log.push(message.into());
        self.state = StrategyState::Error;
    }

    /// True if `kind` was emitted within `cooldown` of now; used to throttle
    /// repeat signals of the same classification.
    pub fn in_cooldown(&self, kind: &'static str, cooldown: Duration, now: DateTime<Utc>) -> bool {
        match self.last_emitted_at.get(kind) {
            Some(last) => {
                let elapsed = (now - *last).to_std().unwrap_or(Duration::ZERO);
                elapsed < cooldown
            }
            None => false,
        }
    }

    pub fn mark_emitted(&mut self, kind: &'static str, now: DateTime<Utc>) {
        self.last_emitted_at.insert(kind, now);
    }

    pub fn push_signal(&mut self, signal: Signal) {
        self.signal_history.push(signal);
    }

    pub fn start(&mut self) {
        if self.state.is_active() {
            return;
        }
        self.state = StrategyState::Active;
    }

    pub fn pause(&mut self) {
        if self.state == StrategyState::Active {
            self.state = StrategyState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == StrategyState::Paused {
            self.state = StrategyState::Active;
        }
    }

    pub fn stop(&mut self) {
        if self.state == StrategyState::Inactive {
            return;
        }
        self.state = StrategyState::Stopped;
    }

    pub fn reset(&mut self) {
        *self = StrategyRuntime::new(self.closes.len().max(1));
    }
}

/// A structured snapshot of a strategy instance, round-tripped via serde.
/// `current_indicator_values` and `history` are strategy-specific and kept as
/// opaque JSON so the engine can persist any concrete strategy uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub strategy_type: String,
    pub name: String,
    pub state: StrategyState,
    pub config: serde_json::Value,
    pub metrics: StrategyMetrics,
    pub in_position: bool,
    pub current_position_id: Option<String>,
    pub current_indicator_values: serde_json::Value,
    pub current_zone_or_trend: String,
    pub history: Vec<serde_json::Value>,
}

/// Common capability set every concrete strategy exposes to the engine.
pub trait Strategy: Send {
    fn name(&self) -> &str;
    fn symbol(&self) -> &str;
    fn state(&self) -> StrategyState;

    fn start(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn reset(&mut self);

    /// Feed one update (candles plus an optional live ticker) through the
    /// strategy and produce a signal. Must never panic; insufficient data or
    /// internal faults degrade to a `HOLD` signal.
    fn update(&mut self, candles: &[gekko_core::Candle], ticker: Option<&gekko_core::Ticker>) -> Signal;

    fn metrics(&self) -> &StrategyMetrics;

    /// Wall-clock duration of the most recent `update` call.
    fn last_execution(&self) -> Duration;

    fn on_position_opened(&mut self, _position: &gekko_core::Position) {}
    fn on_position_updated(&mut self, _position: &gekko_core::Position) {}
    fn on_position_closed(&mut self, position: &gekko_core::Position, pnl: rust_decimal::Decimal) {
        let duration_secs = (Utc::now() - position.entry_time).num_seconds().max(0) as f64;
        self.record_close(pnl, duration_secs);
    }

    /// Callback fired by the engine with the final signal returned from
    /// `ExecuteStrategy`, after validation has possibly degraded it to HOLD.
    fn on_signal(&mut self, _signal: &Signal) {}

    /// Hook invoked by the default `on_position_closed`; concrete strategies
    /// delegate to their `StrategyRuntime`'s metrics.
    fn record_close(&mut self, pnl: rust_decimal::Decimal, duration_secs: f64);

    fn snapshot(&self) -> StrategySnapshot;

    /// Reconstructs an instance from a snapshot taken by [`Strategy::snapshot`].
    /// `symbol` is supplied by the caller: it is not part of the persisted
    /// snapshot schema, which only carries strategy-internal state.
    ///
    /// Restoring from a snapshot and immediately calling `snapshot()` again
    /// must yield an equal `config` and `current_indicator_values`, and a
    /// `history` of length `min(persisted_len, 100)`.
    fn from_snapshot(symbol: &str, snapshot: &StrategySnapshot) -> TradingResult<Self>
    where
        Self: Sized;
}
