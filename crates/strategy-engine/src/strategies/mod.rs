//! Concrete strategies. Each owns its parameter record and indicator-state
//! record, and composes a [`crate::strategy::StrategyRuntime`] for the shared
//! lifecycle/history/cooldown machinery rather than inheriting it.

pub mod macd;
pub mod rsi;
pub mod sma;

pub use macd::{MacdConfig, MacdStrategy};
pub use rsi::{RsiConfig, RsiStrategy};
pub use sma::{SmaConfig, SmaStrategy};

use crate::strategy::{Strategy, StrategySnapshot};
use gekko_core::{TradingError, TradingResult};

/// Reconstructs the concrete strategy named by `snapshot.strategy_type`
/// ("rsi", "sma", "macd") from a snapshot taken by [`Strategy::snapshot`].
pub fn restore(symbol: &str, snapshot: &StrategySnapshot) -> TradingResult<Box<dyn Strategy>> {
    match snapshot.strategy_type.as_str() {
        "rsi" => Ok(Box::new(RsiStrategy::from_snapshot(symbol, snapshot)?)),
        "sma" => Ok(Box::new(SmaStrategy::from_snapshot(symbol, snapshot)?)),
        "macd" => Ok(Box::new(MacdStrategy::from_snapshot(symbol, snapshot)?)),
        other => Err(TradingError::StrategyNotFound(format!(
            "no strategy kind registered for snapshot type '{other}'"
        ))),
    }
}
