//! End-to-end replay against a real (if tiny) concrete strategy.

use backtester::{load_csv, BacktestConfig, Backtester};
use chrono::Utc;
use rust_decimal_macros::dec;
use std::io::Write;
use strategy_engine::{RsiConfig, RsiStrategy, Strategy};

fn write_csv(lines: &[String]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("backtester_replay_{}.csv", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    path
}

#[test]
fn backtest_runs_a_real_strategy_over_csv_loaded_candles() {
    // Monotone-decreasing closes drive RSI down through the oversold zone,
    // matching the kind of series the RSI strategy is meant to trade.
    let lines: Vec<String> = (0..40)
        .map(|i: i64| {
            let close = 100 - i.min(30);
            format!("{},100,101,99,{},10,{}", i * 1000, close, i * 1000 + 999)
        })
        .collect();
    let path = write_csv(&lines);
    let candles = load_csv(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(candles.len(), 40);

    let mut strategy = RsiStrategy::new("rsi", "BTCUSDT", RsiConfig::default()).unwrap();
    strategy.start();

    let config = BacktestConfig {
        symbol: "BTCUSDT".into(),
        timeframe: "1m".into(),
        initial_balance: dec!(1000),
        start: Utc::now(),
        end: Utc::now(),
        fee_rate: dec!(0.001),
        slippage: dec!(0.0005),
        position_size_pct: dec!(50),
        risk_free_rate: dec!(0),
    };
    let backtester = Backtester::new(config).unwrap();
    let results = backtester.run(&mut strategy, &candles).unwrap();

    assert_eq!(results.equity_curve.len(), 40);
    assert!(results.summary.final_balance > dec!(0));
}
