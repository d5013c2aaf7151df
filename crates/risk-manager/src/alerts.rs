use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which limit an [`Alert`] reports a crossing of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    DailyLossLimit,
    TotalExposureLimit,
    SymbolExposureLimit,
    MaxPositionsLimit,
    VolatilityAlert,
}

/// A timestamped record of a crossed risk limit, carrying the value that
/// triggered it and the limit it crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub symbol: Option<String>,
    pub current_value: Decimal,
    pub limit_value: Decimal,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(kind: AlertKind, symbol: Option<String>, current_value: Decimal, limit_value: Decimal, message: impl Into<String>) -> Self {
        Self {
            kind,
            symbol,
            current_value,
            limit_value,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
