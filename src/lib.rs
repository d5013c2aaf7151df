//! # Gekko Trader
//!
//! An online algorithmic trading engine for crypto spot markets: indicator
//! strategies (RSI/SMA/MACD) feed a pre-trade risk gate, executed through an
//! exchange adapter in live mode or replayed deterministically through the
//! backtester.
//!
//! ## Architecture
//!
//! - `gekko-core`: shared types (candles, signals, positions) and the error
//!   taxonomy every other crate builds on.
//! - `exchange-connectors`: the `ExchangeAdapter` contract plus Binance.US
//!   and Coinbase implementations.
//! - `strategy-engine`: indicator kernels, concrete strategies, and the
//!   registry/dispatch engine.
//! - `risk-manager`: pre-trade gating, exposure accounting, and alerts.
//! - `backtester`: deterministic historical replay with performance metrics.

pub mod config;

use crate::config::{AppConfig, StrategyInstanceConfig};
use exchange_connectors::credentials::ExchangeCredentials;
use exchange_connectors::{binance_us::BinanceUsAdapter, coinbase::CoinbaseAdapter, ExchangeAdapter, ExchangeId};
use gekko_core::{StrategyConfig, StrategyType, TradingError};
use risk_manager::RiskManager;
use strategy_engine::{MacdConfig, MacdStrategy, RsiConfig, RsiStrategy, SmaConfig, SmaStrategy, Strategy};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Exchange(#[from] exchange_connectors::ExchangeError),

    #[error(transparent)]
    Trading(#[from] TradingError),

    #[error(transparent)]
    Backtest(#[from] backtester::BacktestError),

    #[error(transparent)]
    Risk(#[from] risk_manager::RiskError),

    #[error("unknown strategy kind: {0}")]
    UnknownStrategyKind(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Builds a concrete [`Strategy`] from a config entry's `kind` string
/// ("rsi", "sma", "macd"), reading parameters via `StrategyConfig::param`
/// defaults where the entry leaves them unset.
pub fn build_strategy(entry: &StrategyInstanceConfig) -> AppResult<Box<dyn Strategy>> {
    let params = entry.params.clone();
    let strategy_config = StrategyConfig {
        name: entry.name.clone(),
        strategy_type: StrategyType::MeanReversion,
        symbols: vec![entry.symbol.clone()],
        timeframe: "1h".into(),
        risk_per_trade_pct: rust_decimal::Decimal::new(2, 0),
        max_drawdown_pct: rust_decimal::Decimal::new(20, 0),
        max_open_positions: 1,
        enabled: true,
        params,
    };

    match entry.kind.as_str() {
        "rsi" => {
            let config = RsiConfig {
                period: strategy_config.param("period", 14.0) as usize,
                oversold: strategy_config.param("oversold", 30.0),
                overbought: strategy_config.param("overbought", 70.0),
                ..RsiConfig::default()
            };
            let strategy = RsiStrategy::new(entry.name.clone(), entry.symbol.clone(), config)?;
            Ok(Box::new(strategy))
        }
        "sma" => {
            let config = SmaConfig {
                fast_period: strategy_config.param("fast_period", 10.0) as usize,
                slow_period: strategy_config.param("slow_period", 30.0) as usize,
                ..SmaConfig::default()
            };
            let strategy = SmaStrategy::new(entry.name.clone(), entry.symbol.clone(), config)?;
            Ok(Box::new(strategy))
        }
        "macd" => {
            let config = MacdConfig {
                fast_period: strategy_config.param("fast_period", 12.0) as usize,
                slow_period: strategy_config.param("slow_period", 26.0) as usize,
                signal_period: strategy_config.param("signal_period", 9.0) as usize,
                ..MacdConfig::default()
            };
            let strategy = MacdStrategy::new(entry.name.clone(), entry.symbol.clone(), config)?;
            Ok(Box::new(strategy))
        }
        other => Err(AppError::UnknownStrategyKind(other.to_string())),
    }
}

/// Builds the configured exchange adapter, loading credentials from the
/// environment (never from the config file itself).
pub fn build_adapter(config: &AppConfig) -> AppResult<Box<dyn ExchangeAdapter>> {
    let (exchange_id, adapter): (ExchangeId, Box<dyn ExchangeAdapter>) = match config.exchange.exchange.as_str() {
        "coinbase" => {
            let id = ExchangeId::Coinbase;
            let creds = ExchangeCredentials::from_env(id).ok();
            if creds.is_none() {
                warn!("no Coinbase credentials in environment; adapter will run unauthenticated");
            }
            (id, Box::new(CoinbaseAdapter::new(creds)))
        }
        _ => {
            let id = ExchangeId::BinanceUs;
            let creds = ExchangeCredentials::from_env(id).ok();
            if creds.is_none() {
                warn!("no Binance.US credentials in environment; adapter will run unauthenticated");
            }
            (id, Box::new(BinanceUsAdapter::new(creds)))
        }
    };
    info!(exchange = ?exchange_id, "exchange adapter constructed");
    Ok(adapter)
}

/// Builds the configured risk manager from the "risk" section of `config`.
pub fn build_risk_manager(config: &AppConfig) -> AppResult<RiskManager> {
    Ok(RiskManager::new(config.risk.clone(), config.account_balance)?)
}
