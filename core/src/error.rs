use thiserror::Error;

/// Error taxonomy shared by every crate that sits on the data path.
///
/// Configuration and lookup errors propagate straight to the caller; the
/// data-path variants (`InsufficientData`, `InvalidSignal`) are caught at the
/// strategy/engine boundary and degrade to a synthesized `HOLD` signal rather
/// than aborting the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradingError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("strategy not found: {0}")]
    StrategyNotFound(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

pub type TradingResult<T> = Result<T, TradingError>;
