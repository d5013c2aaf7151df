use crate::error::{BacktestError, BacktestResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Replay configuration: balance, timeframe, symbol, inclusive date range,
/// and the cost model applied to every simulated fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub symbol: String,
    pub timeframe: String,
    pub initial_balance: Decimal,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Fee charged on the gross value of every fill, e.g. `0.001` = 0.1%.
    pub fee_rate: Decimal,
    /// Multiplicative slippage applied to the fill price, e.g. `0.0005`.
    pub slippage: Decimal,
    /// Fraction of current balance committed to a BUY when the signal does
    /// not itself specify a target quantity.
    pub position_size_pct: Decimal,
    pub risk_free_rate: Decimal,
}

impl BacktestConfig {
    pub fn validate(&self) -> BacktestResult<()> {
        if self.symbol.is_empty() {
            return Err(BacktestError::Configuration("symbol must not be empty".into()));
        }
        if self.initial_balance <= Decimal::ZERO {
            return Err(BacktestError::Configuration("initial_balance must be positive".into()));
        }
        if self.end < self.start {
            return Err(BacktestError::Configuration("end must not precede start".into()));
        }
        Ok(())
    }
}

/// Parses an inclusive start/end timestamp in one of three accepted
/// formats: `YYYY-MM-DD`, `DD/MM/YYYY`, or `YYYY-MM-DD HH:MM:SS`.
pub fn parse_timestamp(input: &str) -> BacktestResult<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%d/%m/%Y") {
        return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
    }
    Err(BacktestError::Configuration(format!(
        "'{input}' does not match YYYY-MM-DD, DD/MM/YYYY, or YYYY-MM-DD HH:MM:SS"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_accepted_formats() {
        assert!(parse_timestamp("2024-01-15").is_ok());
        assert!(parse_timestamp("15/01/2024").is_ok());
        assert!(parse_timestamp("2024-01-15 09:30:00").is_ok());
    }

    #[test]
    fn rejects_unrecognized_format() {
        assert!(parse_timestamp("Jan 15 2024").is_err());
    }

    #[test]
    fn rejects_end_before_start() {
        use rust_decimal_macros::dec;
        let start = parse_timestamp("2024-01-15").unwrap();
        let end = parse_timestamp("2024-01-01").unwrap();
        let config = BacktestConfig {
            symbol: "BTCUSDT".into(),
            timeframe: "1h".into(),
            initial_balance: dec!(1000),
            start,
            end,
            fee_rate: Decimal::ZERO,
            slippage: Decimal::ZERO,
            position_size_pct: dec!(100),
            risk_free_rate: Decimal::ZERO,
        };
        assert!(config.validate().is_err());
    }
}
