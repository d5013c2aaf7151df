//! Indicator kernels, concrete indicator strategies (RSI/SMA/MACD), and the
//! engine that registers, dispatches to, and tracks positions for them.

pub mod engine;
pub mod indicators;
pub mod strategies;
pub mod strategy;

pub use engine::{EngineState, PersistedStrategy, StrategyEngine};
pub use strategies::{restore as restore_strategy, MacdConfig, MacdStrategy, RsiConfig, RsiStrategy, SmaConfig, SmaStrategy};
pub use strategy::{Strategy, StrategyRuntime, StrategySnapshot, StrategyState};
