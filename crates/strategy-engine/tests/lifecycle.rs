//! Lifecycle idempotence and multi-strategy engine dispatch.

use strategy_engine::strategies::{RsiConfig, RsiStrategy, SmaConfig, SmaStrategy};
use strategy_engine::{Strategy, StrategyEngine, StrategyState};

#[test]
fn start_on_active_is_a_no_op() {
    let mut strat = RsiStrategy::new("rsi", "BTCUSDT", RsiConfig::default()).unwrap();
    strat.start();
    assert_eq!(strat.state(), StrategyState::Active);
    strat.start();
    assert_eq!(strat.state(), StrategyState::Active);
}

#[test]
fn stop_on_inactive_is_a_no_op() {
    let mut strat = RsiStrategy::new("rsi", "BTCUSDT", RsiConfig::default()).unwrap();
    assert_eq!(strat.state(), StrategyState::Inactive);
    strat.stop();
    assert_eq!(strat.state(), StrategyState::Inactive);
}

#[test]
fn reset_twice_yields_the_same_state_as_once() {
    let mut strat = RsiStrategy::new("rsi", "BTCUSDT", RsiConfig::default()).unwrap();
    strat.start();
    strat.reset();
    let after_one = strat.state();
    strat.reset();
    assert_eq!(strat.state(), after_one);
}

#[test]
fn engine_executes_independent_strategies_in_isolation() {
    let engine = StrategyEngine::new();
    engine
        .register_strategy(Box::new(RsiStrategy::new("rsi", "BTCUSDT", RsiConfig::default()).unwrap()))
        .unwrap();
    engine
        .register_strategy(Box::new(
            SmaStrategy::new(
                "sma",
                "BTCUSDT",
                SmaConfig {
                    fast_period: 3,
                    slow_period: 5,
                    ..SmaConfig::default()
                },
            )
            .unwrap(),
        ))
        .unwrap();

    engine.start_strategy("rsi").unwrap();
    engine.start_strategy("sma").unwrap();

    let results = engine.execute_all(&[], None);
    assert_eq!(results.len(), 2);
    for (_, result) in results {
        assert!(result.is_ok());
    }
}

#[test]
fn execute_unknown_strategy_reports_not_found() {
    let engine = StrategyEngine::new();
    let result = engine.execute_strategy("missing", &[], None);
    assert!(result.is_err());
}
