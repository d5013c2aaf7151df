pub mod error;
pub mod types;

pub use error::{TradingError, TradingResult};
pub use types::{
    generate_position_id, Candle, OrderBookLevel, OrderBookSnapshot, OrderStatus, OrderType,
    Position, Side, Signal, SignalKind, StrategyConfig, StrategyMetrics, StrategyName,
    StrategyType, Symbol, Ticker, TradeRecord,
};
