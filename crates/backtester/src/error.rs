use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to read candle data: {0}")]
    DataLoad(String),

    #[error("exchange error while paginating historical candles: {0}")]
    Adapter(#[from] exchange_connectors::ExchangeError),

    #[error("no candle data available for the requested range")]
    EmptyDataset,
}

pub type BacktestResult<T> = Result<T, BacktestError>;
