use thiserror::Error;

/// Error taxonomy for pre-trade gating and exposure bookkeeping.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("position not found for symbol: {0}")]
    PositionNotFound(String),
}

pub type RiskResult<T> = Result<T, RiskError>;
