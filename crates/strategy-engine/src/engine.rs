//! Strategy Engine: registry of strategies by unique name, open-position
//! tracking, and dispatch of market updates to active strategies.

use crate::strategy::{Strategy, StrategySnapshot, StrategyState};
use gekko_core::{generate_position_id, Candle, Position, Side, Signal, SignalKind, Ticker, TradingError, TradingResult};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// A single strategy's exported state, paired with the symbol it trades
/// (not part of [`StrategySnapshot`] itself, since the snapshot schema is
/// strategy-internal state only).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PersistedStrategy {
    pub symbol: String,
    pub snapshot: StrategySnapshot,
}

/// Engine-wide state, separate from any single strategy's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Inactive,
    Active,
    Paused,
    Error,
    Stopped,
}

struct Registry {
    strategies: HashMap<String, Box<dyn Strategy>>,
}

struct Positions {
    open: HashMap<String, Position>,
    by_strategy: HashMap<String, Vec<String>>,
}

/// Registry + position tracker for every running strategy.
///
/// Locking order is always registry before positions, matching the
/// documented discipline: never hold the positions lock while trying to
/// acquire the registry lock.
pub struct StrategyEngine {
    registry: Mutex<Registry>,
    positions: Mutex<Positions>,
    position_counter: AtomicU64,
    state: Mutex<EngineState>,
}

impl StrategyEngine {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry { strategies: HashMap::new() }),
            positions: Mutex::new(Positions { open: HashMap::new(), by_strategy: HashMap::new() }),
            position_counter: AtomicU64::new(0),
            state: Mutex::new(EngineState::Inactive),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Rejects a null or duplicate name. Calls no user code under the lock
    /// beyond the strategy's own `start`, which is a pure state transition.
    pub fn register_strategy(&self, strategy: Box<dyn Strategy>) -> TradingResult<()> {
        let name = strategy.name().to_string();
        if name.is_empty() {
            return Err(TradingError::Configuration("strategy name must not be empty".into()));
        }
        let mut registry = self.registry.lock();
        if registry.strategies.contains_key(&name) {
            return Err(TradingError::Configuration(format!("strategy '{}' already registered", name)));
        }
        registry.strategies.insert(name, strategy);
        *self.state.lock() = EngineState::Active;
        Ok(())
    }

    pub fn start_strategy(&self, name: &str) -> TradingResult<()> {
        self.with_strategy_mut(name, |s| s.start())
    }

    pub fn pause_strategy(&self, name: &str) -> TradingResult<()> {
        self.with_strategy_mut(name, |s| s.pause())
    }

    pub fn resume_strategy(&self, name: &str) -> TradingResult<()> {
        self.with_strategy_mut(name, |s| s.resume())
    }

    pub fn stop_strategy(&self, name: &str) -> TradingResult<()> {
        self.with_strategy_mut(name, |s| s.stop())
    }

    pub fn reset_strategy(&self, name: &str) -> TradingResult<()> {
        self.with_strategy_mut(name, |s| s.reset())
    }

    /// Captures every registered strategy's state as a structured snapshot,
    /// suitable for writing out and later feeding back to
    /// [`StrategyEngine::import_snapshots`].
    pub fn export_snapshots(&self) -> Vec<PersistedStrategy> {
        let registry = self.registry.lock();
        registry
            .strategies
            .values()
            .map(|s| PersistedStrategy { symbol: s.symbol().to_string(), snapshot: s.snapshot() })
            .collect()
    }

    /// Reconstructs and registers a strategy for each entry, via the
    /// matching concrete strategy's `from_snapshot`. Fails on the first
    /// entry whose `strategy_type` is unrecognized or whose name collides
    /// with an already-registered strategy; entries already imported remain
    /// registered.
    pub fn import_snapshots(&self, persisted: &[PersistedStrategy]) -> TradingResult<()> {
        for entry in persisted {
            let strategy = crate::strategies::restore(&entry.symbol, &entry.snapshot)?;
            self.register_strategy(strategy)?;
        }
        Ok(())
    }

    fn with_strategy_mut(&self, name: &str, f: impl FnOnce(&mut Box<dyn Strategy>)) -> TradingResult<()> {
        let mut registry = self.registry.lock();
        let strategy = registry
            .strategies
            .get_mut(name)
            .ok_or_else(|| TradingError::StrategyNotFound(name.to_string()))?;
        f(strategy);
        Ok(())
    }

    pub fn strategy_state(&self, name: &str) -> TradingResult<StrategyState> {
        let registry = self.registry.lock();
        registry
            .strategies
            .get(name)
            .map(|s| s.state())
            .ok_or_else(|| TradingError::StrategyNotFound(name.to_string()))
    }

    /// If the strategy is not `Active`, returns a synthesized HOLD signal
    /// rather than an error. Otherwise runs `update`, validates the result,
    /// degrading a structurally invalid signal to HOLD, and fires the
    /// strategy's `on_signal` callback with whatever is finally returned.
    pub fn execute_strategy(&self, name: &str, candles: &[Candle], ticker: Option<&Ticker>) -> TradingResult<Signal> {
        let mut registry = self.registry.lock();
        let strategy = registry
            .strategies
            .get_mut(name)
            .ok_or_else(|| TradingError::StrategyNotFound(name.to_string()))?;
        if strategy.state() != StrategyState::Active {
            return Ok(Signal::hold(name.to_string(), "", "Strategy not active"));
        }
        let signal = strategy.update(candles, ticker);
        let signal = if signal.is_valid() {
            signal
        } else {
            Signal::hold(name.to_string(), signal.symbol.clone(), "Signal failed validation, degraded to hold")
        };
        strategy.on_signal(&signal);
        Ok(signal)
    }

    /// Iterates over every registered strategy, isolating failures so one
    /// strategy's error never blocks the others.
    pub fn execute_all(&self, candles: &[Candle], ticker: Option<&Ticker>) -> Vec<(String, TradingResult<Signal>)> {
        let names: Vec<String> = {
            let registry = self.registry.lock();
            registry.strategies.keys().cloned().collect()
        };
        names
            .into_iter()
            .map(|name| {
                let result = self.execute_strategy(&name, candles, ticker);
                (name, result)
            })
            .collect()
    }

    pub fn generate_position_id(&self) -> String {
        generate_position_id(&self.position_counter)
    }

    /// Position id and strategy name must be non-empty; the strategy must
    /// already be registered.
    pub fn register_position(&self, position: Position) -> TradingResult<()> {
        if position.id.is_empty() {
            return Err(TradingError::Configuration("position id must not be empty".into()));
        }
        if position.strategy.is_empty() {
            return Err(TradingError::Configuration("position strategy must not be empty".into()));
        }
        {
            let registry = self.registry.lock();
            if !registry.strategies.contains_key(&position.strategy) {
                return Err(TradingError::StrategyNotFound(position.strategy.clone()));
            }
        }
        let mut positions = self.positions.lock();
        positions.by_strategy.entry(position.strategy.clone()).or_default().push(position.id.clone());
        positions.open.insert(position.id.clone(), position.clone());
        drop(positions);

        let mut registry = self.registry.lock();
        if let Some(strategy) = registry.strategies.get_mut(&position.strategy) {
            strategy.on_position_opened(&position);
        }
        Ok(())
    }

    pub fn update_position(&self, id: &str, current_price: Decimal) -> TradingResult<()> {
        let (strategy_name, position) = {
            let mut positions = self.positions.lock();
            let position = positions
                .open
                .get_mut(id)
                .ok_or_else(|| TradingError::Configuration(format!("position '{}' not found", id)))?;
            position.mark_to_market(current_price);
            (position.strategy.clone(), position.clone())
        };
        let mut registry = self.registry.lock();
        if let Some(strategy) = registry.strategies.get_mut(&strategy_name) {
            strategy.on_position_updated(&position);
        }
        Ok(())
    }

    /// Removes the position from every map, applies realized PnL to the
    /// owning strategy's stats, and notifies it.
    pub fn close_position(&self, id: &str, exit_price: Decimal) -> TradingResult<Decimal> {
        let position = {
            let mut positions = self.positions.lock();
            let mut position = positions
                .open
                .remove(id)
                .ok_or_else(|| TradingError::Configuration(format!("position '{}' not found", id)))?;
            if let Some(ids) = positions.by_strategy.get_mut(&position.strategy) {
                ids.retain(|pid| pid != id);
            }
            position.mark_to_market(exit_price);
            position
        };
        let pnl = position.unrealized_pnl;
        let mut registry = self.registry.lock();
        if let Some(strategy) = registry.strategies.get_mut(&position.strategy) {
            strategy.on_position_closed(&position, pnl);
        }
        Ok(pnl)
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.lock().open.len()
    }

    pub fn positions_for_strategy(&self, name: &str) -> Vec<String> {
        self.positions.lock().by_strategy.get(name).cloned().unwrap_or_default()
    }
}

impl Default for StrategyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a fresh long/short `Position` with the engine's monotonic id
/// generator and sign convention.
pub fn open_position(engine: &StrategyEngine, symbol: impl Into<String>, side: Side, entry_price: Decimal, quantity: Decimal, strategy: impl Into<String>, stop_loss: Option<Decimal>, take_profit: Option<Decimal>) -> Position {
    Position::new(
        engine.generate_position_id(),
        symbol.into(),
        side,
        entry_price,
        quantity,
        strategy.into(),
        stop_loss,
        take_profit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::{RsiConfig, RsiStrategy};
    use rust_decimal_macros::dec;

    fn rsi_strategy(name: &str) -> Box<dyn Strategy> {
        Box::new(RsiStrategy::new(name, "BTCUSDT", RsiConfig::default()).unwrap())
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let engine = StrategyEngine::new();
        engine.register_strategy(rsi_strategy("rsi-1")).unwrap();
        let err = engine.register_strategy(rsi_strategy("rsi-1"));
        assert!(err.is_err());
    }

    #[test]
    fn execute_inactive_strategy_returns_hold() {
        let engine = StrategyEngine::new();
        engine.register_strategy(rsi_strategy("rsi-1")).unwrap();
        let signal = engine.execute_strategy("rsi-1", &[], None).unwrap();
        assert_eq!(signal.kind, SignalKind::Hold);
    }

    #[test]
    fn register_close_position_round_trip_updates_stats() {
        let engine = StrategyEngine::new();
        engine.register_strategy(rsi_strategy("rsi-1")).unwrap();
        let position = open_position(&engine, "BTCUSDT", Side::Buy, dec!(100), dec!(1), "rsi-1", None, None);
        let id = position.id.clone();
        engine.register_position(position).unwrap();
        assert_eq!(engine.open_position_count(), 1);

        let pnl = engine.close_position(&id, dec!(110)).unwrap();
        assert_eq!(pnl, dec!(10));
        assert_eq!(engine.open_position_count(), 0);
    }

    #[test]
    fn position_ids_are_monotonic() {
        let engine = StrategyEngine::new();
        let a = engine.generate_position_id();
        let b = engine.generate_position_id();
        assert_ne!(a, b);
    }

    #[test]
    fn export_then_import_restores_registered_strategies() {
        let engine = StrategyEngine::new();
        engine.register_strategy(rsi_strategy("rsi-1")).unwrap();
        engine.start_strategy("rsi-1").unwrap();
        engine.execute_strategy("rsi-1", &[], None).unwrap();

        let exported = engine.export_snapshots();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].snapshot.name, "rsi-1");

        let restored_engine = StrategyEngine::new();
        restored_engine.import_snapshots(&exported).unwrap();
        assert_eq!(restored_engine.strategy_state("rsi-1").unwrap(), StrategyState::Active);
    }

    /// Always emits a structurally invalid BUY signal (zero price), to
    /// exercise `execute_strategy`'s validate-and-degrade path.
    struct BrokenStrategy {
        state: StrategyState,
        metrics: gekko_core::StrategyMetrics,
        on_signal_calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Strategy for BrokenStrategy {
        fn name(&self) -> &str {
            "broken"
        }
        fn symbol(&self) -> &str {
            "BTCUSDT"
        }
        fn state(&self) -> StrategyState {
            self.state
        }
        fn start(&mut self) {
            self.state = StrategyState::Active;
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn stop(&mut self) {}
        fn reset(&mut self) {}
        fn update(&mut self, _candles: &[Candle], _ticker: Option<&Ticker>) -> Signal {
            Signal {
                kind: SignalKind::Buy,
                symbol: "BTCUSDT".to_string(),
                price: rust_decimal::Decimal::ZERO,
                quantity: None,
                stop_loss: None,
                take_profit: None,
                strength: 1.0,
                strategy: "broken".to_string(),
                message: String::new(),
                timestamp: chrono::Utc::now(),
            }
        }
        fn metrics(&self) -> &gekko_core::StrategyMetrics {
            &self.metrics
        }
        fn last_execution(&self) -> std::time::Duration {
            std::time::Duration::ZERO
        }
        fn record_close(&mut self, _pnl: rust_decimal::Decimal, _duration_secs: f64) {}
        fn snapshot(&self) -> StrategySnapshot {
            unimplemented!("not exercised by this test")
        }
        fn from_snapshot(_symbol: &str, _snapshot: &StrategySnapshot) -> TradingResult<Self> {
            unimplemented!("not exercised by this test")
        }
        fn on_signal(&mut self, _signal: &Signal) {
            self.on_signal_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn execute_strategy_degrades_invalid_signal_to_hold_and_fires_callback() {
        let engine = StrategyEngine::new();
        let on_signal_calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        engine
            .register_strategy(Box::new(BrokenStrategy {
                state: StrategyState::Inactive,
                metrics: gekko_core::StrategyMetrics::new(),
                on_signal_calls: on_signal_calls.clone(),
            }))
            .unwrap();
        engine.start_strategy("broken").unwrap();

        let signal = engine.execute_strategy("broken", &[], None).unwrap();
        assert_eq!(signal.kind, SignalKind::Hold);
        assert_eq!(on_signal_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
