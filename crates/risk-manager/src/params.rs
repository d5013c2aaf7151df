use crate::error::{RiskError, RiskResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Risk parameters gating every candidate trade. Percent fields are whole
/// percentages (20 means 20%), matching the config-file convention used
/// throughout the rest of the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParameters {
    pub max_capital_per_trade_pct: Decimal,
    pub max_total_exposure_pct: Decimal,
    pub max_symbol_exposure_pct: Decimal,
    pub max_open_positions: usize,
    pub max_daily_loss_pct: Decimal,
    pub default_stop_loss_pct: Decimal,
    pub default_take_profit_pct: Decimal,
    #[serde(with = "duration_secs")]
    pub min_time_between_trades: Duration,
    pub enable_volatility_check: bool,
    pub max_volatility_pct: Decimal,
    /// How long an alert is retained before being purged.
    #[serde(with = "duration_secs")]
    pub alert_window: Duration,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_capital_per_trade_pct: dec!(2),
            max_total_exposure_pct: dec!(50),
            max_symbol_exposure_pct: dec!(20),
            max_open_positions: 10,
            max_daily_loss_pct: dec!(5),
            default_stop_loss_pct: dec!(2),
            default_take_profit_pct: dec!(4),
            min_time_between_trades: Duration::from_secs(60),
            enable_volatility_check: false,
            max_volatility_pct: dec!(10),
            alert_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl RiskParameters {
    pub fn validate(&self) -> RiskResult<()> {
        if self.max_capital_per_trade_pct <= Decimal::ZERO {
            return Err(RiskError::Configuration("max_capital_per_trade_pct must be positive".into()));
        }
        if self.max_total_exposure_pct <= Decimal::ZERO {
            return Err(RiskError::Configuration("max_total_exposure_pct must be positive".into()));
        }
        if self.max_symbol_exposure_pct <= Decimal::ZERO {
            return Err(RiskError::Configuration("max_symbol_exposure_pct must be positive".into()));
        }
        if self.max_symbol_exposure_pct > self.max_total_exposure_pct {
            return Err(RiskError::Configuration(
                "max_symbol_exposure_pct must not exceed max_total_exposure_pct".into(),
            ));
        }
        if self.max_open_positions == 0 {
            return Err(RiskError::Configuration("max_open_positions must be positive".into()));
        }
        if self.max_daily_loss_pct <= Decimal::ZERO {
            return Err(RiskError::Configuration("max_daily_loss_pct must be positive".into()));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_validate() {
        assert!(RiskParameters::default().validate().is_ok());
    }

    #[test]
    fn symbol_exposure_above_total_is_rejected() {
        let mut params = RiskParameters::default();
        params.max_symbol_exposure_pct = dec!(60);
        params.max_total_exposure_pct = dec!(50);
        assert!(params.validate().is_err());
    }
}
