//! End-to-end wiring test: load a config, build a strategy from it, and run
//! a full backtest through the same functions the CLI uses.

use backtester::{Backtester, BacktestConfig};
use gekko_trader::build_strategy;
use gekko_trader::config::AppConfig;
use rust_decimal_macros::dec;
use std::io::Write;

fn write_config() -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("gekko_cli_wiring_{}.toml", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"
account_balance = "5000"

[exchange]
exchange = "binance_us"
sandbox = true

[[strategies]]
name = "rsi-e2e"
kind = "rsi"
symbol = "BTCUSDT"

[strategies.params]
period = 14.0
oversold = 30.0
overbought = 70.0
"#
    )
    .unwrap();
    path
}

#[test]
fn config_drives_a_strategy_through_a_full_backtest_run() {
    let config_path = write_config();
    let config = AppConfig::load(config_path.to_str().unwrap()).unwrap();
    std::fs::remove_file(&config_path).ok();

    assert_eq!(config.strategies.len(), 1);
    let entry = &config.strategies[0];
    assert_eq!(entry.kind, "rsi");

    let mut strategy = build_strategy(entry).unwrap();
    strategy.start();

    let closes: Vec<i64> = (0..30).map(|i| 100 - i.min(25)).collect();
    let candles: Vec<gekko_core::Candle> = closes
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let close = rust_decimal::Decimal::from(*c);
            gekko_core::Candle::new(
                i as i64 * 1000,
                close,
                close,
                close,
                close,
                dec!(10),
                i as i64 * 1000 + 999,
            )
        })
        .collect();

    let backtest_config = BacktestConfig {
        symbol: entry.symbol.clone(),
        timeframe: "1h".into(),
        initial_balance: config.account_balance,
        start: chrono::Utc::now(),
        end: chrono::Utc::now(),
        fee_rate: dec!(0.001),
        slippage: dec!(0.0005),
        position_size_pct: dec!(25),
        risk_free_rate: dec!(0),
    };

    let runner = Backtester::new(backtest_config).unwrap();
    let results = runner.run(strategy.as_mut(), &candles).unwrap();

    assert_eq!(results.equity_curve.len(), 30);
    assert!(results.summary.final_balance > dec!(0));
}
