//! Typed application configuration, loaded from a TOML file via the `config`
//! crate with environment-variable overrides (`GEKKO__` prefix, `__` as the
//! path separator, e.g. `GEKKO__RISK__MAX_OPEN_POSITIONS=5`).

use risk_manager::RiskParameters;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// One configured strategy instance: a concrete kind plus its tunable
/// parameters, keyed in `params` exactly as `StrategyConfig::param` expects.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyInstanceConfig {
    pub name: String,
    pub kind: String,
    pub symbol: String,
    #[serde(default)]
    pub params: std::collections::HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSection {
    pub exchange: String,
    #[serde(default)]
    pub sandbox: bool,
}

/// Root application configuration: a top-level "risk" section mirroring
/// `RiskParameters`' own field names, an "exchange" section, the initial
/// account balance, and the list of strategies to run.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub account_balance: rust_decimal::Decimal,
    #[serde(default)]
    pub exchange: ExchangeSection,
    #[serde(default)]
    pub risk: RiskParameters,
    #[serde(default)]
    pub strategies: Vec<StrategyInstanceConfig>,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self { exchange: "binance_us".into(), sandbox: true }
    }
}

impl AppConfig {
    pub fn load(path: &str) -> ConfigResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(true))
            .add_source(config::Environment::with_prefix("GEKKO").separator("__"))
            .build()?;
        let app: AppConfig = settings.try_deserialize()?;
        app.risk
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if app.strategies.is_empty() {
            return Err(ConfigError::Invalid("at least one strategy must be configured".into()));
        }
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_toml(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "gekko_config_test_{}_{}.toml",
            std::process::id(),
            contents.len()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_a_minimal_config_with_risk_defaults() {
        let path = write_temp_toml(
            r#"
            account_balance = "10000"

            [[strategies]]
            name = "rsi-1"
            kind = "rsi"
            symbol = "BTCUSDT"
            "#,
        );
        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.strategies.len(), 1);
        assert_eq!(config.risk.max_open_positions, 10);
    }

    #[test]
    fn rejects_a_config_with_no_strategies() {
        let path = write_temp_toml(r#"account_balance = "10000""#);
        let result = AppConfig::load(path.to_str().unwrap());
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_an_invalid_risk_section() {
        let path = write_temp_toml(
            r#"
            account_balance = "10000"

            [risk]
            max_capital_per_trade_pct = "2"
            max_total_exposure_pct = "50"
            max_symbol_exposure_pct = "80"
            max_open_positions = 10
            max_daily_loss_pct = "5"
            default_stop_loss_pct = "2"
            default_take_profit_pct = "4"
            min_time_between_trades = 60
            enable_volatility_check = false
            max_volatility_pct = "10"
            alert_window = 86400

            [[strategies]]
            name = "rsi-1"
            kind = "rsi"
            symbol = "BTCUSDT"
            "#,
        );
        let result = AppConfig::load(path.to_str().unwrap());
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
