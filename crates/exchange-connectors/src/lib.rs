//! Exchange adapter contract and reference implementations.
//!
//! The strategy/risk pipeline never talks to an exchange directly — it goes
//! through `ExchangeAdapter`, implemented here by `BinanceUsAdapter` and
//! `CoinbaseAdapter`. Both adapters own symbol/interval normalization from
//! the canonical form ("BTCUSDT", "1h") to their venue's own strings.

use async_trait::async_trait;
use gekko_core::{OrderStatus, OrderType, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod binance_us;
pub mod coinbase;
pub mod credentials;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authorization error: {0}")]
    Authorization(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("symbol not supported: {0}")]
    UnsupportedSymbol(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeId {
    BinanceUs,
    Coinbase,
}

/// Order placement request, symbol already in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

/// Order placement/status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_fill_price: Option<Decimal>,
}

/// A single streamed update delivered to a subscriber callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamMessage {
    Ticker(gekko_core::Ticker),
    OrderBook(gekko_core::OrderBookSnapshot),
    Trade(gekko_core::TradeRecord),
    Kline(gekko_core::Candle),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamType {
    OrderBook,
    Ticker,
    Trades,
    Klines,
}

pub type StreamCallback = std::sync::Arc<dyn Fn(StreamMessage) + Send + Sync>;

/// The narrow contract the pipeline consumes every concrete exchange client
/// through. Symbols passed in are canonical ("BTCUSDT"); the adapter is
/// responsible for mapping to and from its venue's own representation.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn exchange_name(&self) -> &'static str;

    async fn initialize(&mut self) -> ExchangeResult<()>;
    fn is_initialized(&self) -> bool;

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<gekko_core::Ticker>;
    async fn get_order_book(
        &self,
        symbol: &str,
        depth: u32,
    ) -> ExchangeResult<gekko_core::OrderBookSnapshot>;
    async fn get_recent_trades(
        &self,
        symbol: &str,
        n: u32,
    ) -> ExchangeResult<Vec<gekko_core::TradeRecord>>;
    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> ExchangeResult<Vec<gekko_core::Candle>>;

    async fn place_order(&self, request: OrderRequest) -> ExchangeResult<OrderResponse>;
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<bool>;
    async fn get_order_status(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderResponse>;
    async fn get_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<OrderResponse>>;
    async fn get_account_balance(&self, asset: &str) -> ExchangeResult<Decimal>;

    async fn subscribe_order_book(&self, symbol: &str, callback: StreamCallback) -> ExchangeResult<bool>;
    async fn subscribe_ticker(&self, symbol: &str, callback: StreamCallback) -> ExchangeResult<bool>;
    async fn subscribe_trades(&self, symbol: &str, callback: StreamCallback) -> ExchangeResult<bool>;
    async fn subscribe_klines(
        &self,
        symbol: &str,
        interval: &str,
        callback: StreamCallback,
    ) -> ExchangeResult<bool>;
    async fn unsubscribe(&self, symbol: &str, stream_type: StreamType) -> ExchangeResult<()>;

    fn available_pairs(&self) -> Vec<String>;
    fn is_valid_pair(&self, symbol: &str) -> bool {
        self.available_pairs().iter().any(|p| p == symbol)
    }
}

/// Per-adapter token-bucket limiter so a burst of signals never exceeds a
/// venue's documented request rate.
pub struct RateLimiter {
    inner: governor::DefaultDirectRateLimiter,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        use governor::{Quota, RateLimiter as GovernorRateLimiter};
        use std::num::NonZeroU32;
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second.max(1)).unwrap());
        Self {
            inner: GovernorRateLimiter::direct(quota),
        }
    }

    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

/// Utility helpers shared by every adapter implementation.
pub mod utils {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    /// HMAC-SHA256 signature, base64-encoded, for REST request signing.
    pub fn hmac_sha256_signature(secret: &str, message: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any size");
        mac.update(message.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    use base64::Engine;

    pub fn timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub fn decimal_to_string(value: rust_decimal::Decimal, precision: u32) -> String {
        format!("{:.precision$}", value, precision = precision as usize)
    }
}
