//! Gekko Trader CLI: run a configured strategy set live against an exchange
//! adapter, or replay it deterministically through the backtester.

use anyhow::Context;
use backtester::{parse_timestamp, Backtester, BacktestConfig};
use clap::{Parser, ValueEnum};
use gekko_trader::config::AppConfig;
use gekko_trader::{build_adapter, build_risk_manager, build_strategy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    Live,
    Backtest,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Operation mode: run against a live exchange, or replay historical candles.
    #[arg(short, long, value_enum, default_value = "backtest")]
    mode: Mode,

    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Where backtest results (JSON) are written; stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Symbol to backtest, overriding the config's first strategy symbol.
    #[arg(short, long)]
    symbol: Option<String>,

    /// Path to a CSV file of historical candles (backtest mode only).
    #[arg(long)]
    candles: Option<PathBuf>,

    /// Backtest window start (YYYY-MM-DD[ HH:MM:SS] or DD/MM/YYYY).
    #[arg(long)]
    start: Option<String>,

    /// Backtest window end, same formats as `--start`.
    #[arg(long)]
    end: Option<String>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = init_tracing(&args.log_level) {
        eprintln!("failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("gekko exited with an error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!(mode = ?args.mode, config = %args.config, "starting gekko");

    let config = AppConfig::load(&args.config).context("loading configuration")?;

    match args.mode {
        Mode::Backtest => run_backtest(args, config).await,
        Mode::Live => run_live(args, config).await,
    }
}

async fn run_backtest(args: Args, config: AppConfig) -> anyhow::Result<()> {
    let entry = config
        .strategies
        .first()
        .context("config must declare at least one strategy to backtest")?
        .clone();
    let symbol = args.symbol.clone().unwrap_or_else(|| entry.symbol.clone());

    let candles_path = args
        .candles
        .as_ref()
        .context("--candles <path> is required in backtest mode")?;
    let candles = backtester::load_csv(candles_path).context("loading candle CSV")?;
    info!(count = candles.len(), symbol = %symbol, "loaded historical candles");

    let now = chrono::Utc::now();
    let start = match &args.start {
        Some(s) => parse_timestamp(s)?,
        None => candles
            .first()
            .and_then(|c| chrono::DateTime::from_timestamp_millis(c.open_time))
            .unwrap_or(now),
    };
    let end = match &args.end {
        Some(s) => parse_timestamp(s)?,
        None => now,
    };

    let position_size_pct = entry
        .params
        .get("position_size_pct")
        .and_then(|v| rust_decimal::Decimal::try_from(*v).ok())
        .unwrap_or(rust_decimal::Decimal::new(10, 0));

    let backtest_config = BacktestConfig {
        symbol: symbol.clone(),
        timeframe: "1h".into(),
        initial_balance: config.account_balance,
        start,
        end,
        fee_rate: rust_decimal::Decimal::new(1, 3),
        slippage: rust_decimal::Decimal::new(5, 4),
        position_size_pct,
        risk_free_rate: rust_decimal::Decimal::ZERO,
    };

    let mut strategy = build_strategy(&entry)?;
    strategy.start();

    let runner = Backtester::new(backtest_config)?;
    let results = runner.run(strategy.as_mut(), &candles)?;

    info!(
        total_trades = results.summary.total_trades,
        win_rate = %results.summary.win_rate,
        final_balance = %results.summary.final_balance,
        "backtest complete"
    );

    let json = results.to_json().context("serializing backtest results")?;
    match &args.output {
        Some(path) => std::fs::write(path, json).context("writing backtest output")?,
        None => println!("{json}"),
    }

    Ok(())
}

async fn run_live(_args: Args, config: AppConfig) -> anyhow::Result<()> {
    let adapter = build_adapter(&config)?;
    let _risk_manager = build_risk_manager(&config)?;

    let mut strategies = Vec::new();
    for entry in &config.strategies {
        let mut strategy = build_strategy(entry)?;
        strategy.start();
        strategies.push((entry.symbol.clone(), strategy));
    }
    info!(count = strategies.len(), "strategies initialized for live trading");

    if !adapter.is_initialized() {
        info!("adapter is not yet connected; wire an initialize() call and polling/streaming loop before running unattended");
    }

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("received shutdown signal, stopping");
    Ok(())
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let level_filter = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let file_appender = tracing_appender::rolling::daily("logs", "gekko.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    Box::leak(Box::new(guard));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_filter(EnvFilter::from_default_env().add_directive(level_filter.into()));

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_current_span(true)
        .with_filter(EnvFilter::from_default_env().add_directive(level_filter.into()));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("initializing tracing subscriber")?;
    Ok(())
}
