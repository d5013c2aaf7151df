//! Binance.us reference adapter: REST trading/market-data plus a reconnecting
//! WebSocket stream for the public market-data channels.

use crate::credentials::ExchangeCredentials;
use crate::{
    ExchangeAdapter, ExchangeError, ExchangeResult, OrderRequest, OrderResponse, RateLimiter,
    StreamCallback, StreamMessage, StreamType,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use gekko_core::{Candle, OrderBookLevel, OrderBookSnapshot, OrderStatus, OrderType, Side, Ticker, TradeRecord};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};
use url::Url;

const WS_URL: &str = "wss://stream.binance.us:9443/ws";
const REST_URL: &str = "https://api.binance.us";

type HmacSha256 = Hmac<Sha256>;

pub struct BinanceUsAdapter {
    client: Client,
    rest_url: Url,
    ws_url: Url,
    credentials: Option<ExchangeCredentials>,
    initialized: AtomicBool,
    rate_limiter: RateLimiter,
}

impl BinanceUsAdapter {
    pub fn new(credentials: Option<ExchangeCredentials>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("valid HTTP client"),
            rest_url: Url::parse(REST_URL).expect("valid Binance.us REST url"),
            ws_url: Url::parse(WS_URL).expect("valid Binance.us websocket url"),
            credentials,
            initialized: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(10),
        }
    }

    fn signed_query(&self, query: &str) -> ExchangeResult<String> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| ExchangeError::Authorization("no credentials configured".into()))?;
        let mut mac = HmacSha256::new_from_slice(creds.api_secret().expose_secret().as_bytes())
            .expect("HMAC accepts a key of any size");
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn api_key(&self) -> ExchangeResult<&str> {
        self.credentials
            .as_ref()
            .map(|c| c.api_key().expose_secret().as_str())
            .ok_or_else(|| ExchangeError::Authorization("no credentials configured".into()))
    }

    fn venue_symbol(symbol: &str) -> String {
        symbol.replace(['-', '_'], "").to_uppercase()
    }

    fn stream_key(symbol: &str) -> String {
        symbol
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .flat_map(|c| c.to_lowercase())
            .collect()
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceUsAdapter {
    fn exchange_name(&self) -> &'static str {
        "binance_us"
    }

    async fn initialize(&mut self) -> ExchangeResult<()> {
        let url = format!("{}/api/v3/ping", self.rest_url);
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        self.initialized.store(true, Ordering::SeqCst);
        info!("binance.us adapter initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        self.rate_limiter.acquire().await;
        let url = format!(
            "{}/api/v3/ticker/24hr?symbol={}",
            self.rest_url,
            Self::venue_symbol(symbol)
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let t: BinanceTicker24h = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: parse_dec(&t.last_price),
            bid: parse_dec(&t.bid_price),
            ask: parse_dec(&t.ask_price),
            volume_24h: parse_dec(&t.volume),
            change_24h: parse_dec(&t.price_change_percent),
            timestamp: chrono::Utc::now(),
        })
    }

    async fn get_order_book(&self, symbol: &str, depth: u32) -> ExchangeResult<OrderBookSnapshot> {
        self.rate_limiter.acquire().await;
        let limit = depth.clamp(5, 1000);
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.rest_url,
            Self::venue_symbol(symbol),
            limit
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let book: BinanceDepth = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(OrderBookSnapshot {
            symbol: symbol.to_string(),
            bids: book.bids.into_iter().map(level_from_pair).collect(),
            asks: book.asks.into_iter().map(level_from_pair).collect(),
            update_id: book.last_update_id,
            timestamp: chrono::Utc::now(),
        })
    }

    async fn get_recent_trades(&self, symbol: &str, n: u32) -> ExchangeResult<Vec<TradeRecord>> {
        self.rate_limiter.acquire().await;
        let url = format!(
            "{}/api/v3/trades?symbol={}&limit={}",
            self.rest_url,
            Self::venue_symbol(symbol),
            n.clamp(1, 1000)
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let trades: Vec<BinanceTrade> = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(trades
            .into_iter()
            .map(|t| TradeRecord {
                id: t.id.to_string(),
                symbol: symbol.to_string(),
                price: parse_dec(&t.price),
                quantity: parse_dec(&t.qty),
                side: if t.is_buyer_maker { Side::Sell } else { Side::Buy },
                timestamp: chrono::DateTime::from_timestamp_millis(t.time).unwrap_or_else(chrono::Utc::now),
            })
            .collect())
    }

    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> ExchangeResult<Vec<Candle>> {
        self.rate_limiter.acquire().await;
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.rest_url,
            Self::venue_symbol(symbol),
            interval,
            limit.clamp(1, 1000)
        );
        if let Some(s) = start_ms {
            url.push_str(&format!("&startTime={s}"));
        }
        if let Some(e) = end_ms {
            url.push_str(&format!("&endTime={e}"));
        }
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let raw: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        raw.into_iter().map(candle_from_kline).collect()
    }

    async fn place_order(&self, request: OrderRequest) -> ExchangeResult<OrderResponse> {
        self.rate_limiter.acquire().await;
        let api_key = self.api_key()?.to_string();
        let side_str = match request.side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let type_str = match request.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            _ => {
                return Err(ExchangeError::InvalidResponse(format!(
                    "unsupported order type: {:?}",
                    request.order_type
                )))
            }
        };
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut query = format!(
            "symbol={}&side={}&type={}&quantity={}&timestamp={}",
            Self::venue_symbol(&request.symbol),
            side_str,
            type_str,
            request.quantity,
            timestamp
        );
        if let Some(p) = request.price {
            if request.order_type == OrderType::Limit {
                query.push_str(&format!("&price={p}&timeInForce=GTC"));
            }
        }
        let signature = self.signed_query(&query)?;
        let url = format!("{}/api/v3/order?{}&signature={}", self.rest_url, query, signature);

        let resp = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let order: BinanceOrder = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(response_from_order(order))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<bool> {
        self.rate_limiter.acquire().await;
        let api_key = self.api_key()?.to_string();
        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = format!(
            "symbol={}&orderId={}&timestamp={}",
            Self::venue_symbol(symbol),
            order_id,
            timestamp
        );
        let signature = self.signed_query(&query)?;
        let url = format!("{}/api/v3/order?{}&signature={}", self.rest_url, query, signature);
        let resp = self
            .client
            .delete(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        Ok(resp.status().is_success())
    }

    async fn get_order_status(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderResponse> {
        self.rate_limiter.acquire().await;
        let api_key = self.api_key()?.to_string();
        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = format!(
            "symbol={}&orderId={}&timestamp={}",
            Self::venue_symbol(symbol),
            order_id,
            timestamp
        );
        let signature = self.signed_query(&query)?;
        let url = format!("{}/api/v3/order?{}&signature={}", self.rest_url, query, signature);
        let resp = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let order: BinanceOrder = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(response_from_order(order))
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<OrderResponse>> {
        self.rate_limiter.acquire().await;
        let api_key = self.api_key()?.to_string();
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut query = format!("timestamp={timestamp}");
        if let Some(s) = symbol {
            query = format!("symbol={}&{}", Self::venue_symbol(s), query);
        }
        let signature = self.signed_query(&query)?;
        let url = format!("{}/api/v3/openOrders?{}&signature={}", self.rest_url, query, signature);
        let resp = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let orders: Vec<BinanceOrder> = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(orders.into_iter().map(response_from_order).collect())
    }

    async fn get_account_balance(&self, asset: &str) -> ExchangeResult<Decimal> {
        self.rate_limiter.acquire().await;
        let api_key = self.api_key()?.to_string();
        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = format!("timestamp={timestamp}");
        let signature = self.signed_query(&query)?;
        let url = format!("{}/api/v3/account?{}&signature={}", self.rest_url, query, signature);
        let resp = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let account: BinanceAccount = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(account
            .balances
            .into_iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
            .map(|b| parse_dec(&b.free))
            .unwrap_or(Decimal::ZERO))
    }

    async fn subscribe_order_book(&self, symbol: &str, callback: StreamCallback) -> ExchangeResult<bool> {
        spawn_stream(self.ws_url.clone(), format!("{}@depth@100ms", Self::stream_key(symbol)), symbol.to_string(), callback);
        Ok(true)
    }

    async fn subscribe_ticker(&self, symbol: &str, callback: StreamCallback) -> ExchangeResult<bool> {
        spawn_stream(self.ws_url.clone(), format!("{}@bookTicker", Self::stream_key(symbol)), symbol.to_string(), callback);
        Ok(true)
    }

    async fn subscribe_trades(&self, symbol: &str, callback: StreamCallback) -> ExchangeResult<bool> {
        spawn_stream(self.ws_url.clone(), format!("{}@trade", Self::stream_key(symbol)), symbol.to_string(), callback);
        Ok(true)
    }

    async fn subscribe_klines(
        &self,
        symbol: &str,
        interval: &str,
        callback: StreamCallback,
    ) -> ExchangeResult<bool> {
        spawn_stream(
            self.ws_url.clone(),
            format!("{}@kline_{}", Self::stream_key(symbol), interval),
            symbol.to_string(),
            callback,
        );
        Ok(true)
    }

    async fn unsubscribe(&self, _symbol: &str, _stream_type: StreamType) -> ExchangeResult<()> {
        // Streams are independent per-task websockets; dropping the callback's
        // channel (not modeled here) is the caller's responsibility. There is
        // no shared subscription registry to tear down explicitly.
        Ok(())
    }

    fn available_pairs(&self) -> Vec<String> {
        vec!["BTCUSDT".into(), "ETHUSDT".into(), "SOLUSDT".into()]
    }
}

fn spawn_stream(ws_url: Url, stream_param: String, display_symbol: String, callback: StreamCallback) {
    tokio::spawn(async move {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match connect_async(ws_url.clone()).await {
                Ok((mut stream, _)) => {
                    attempt = 0;
                    let subscribe = serde_json::json!({
                        "method": "SUBSCRIBE",
                        "params": [stream_param],
                        "id": chrono::Utc::now().timestamp_millis(),
                    });
                    if stream.send(Message::Text(subscribe.to_string())).await.is_err() {
                        continue;
                    }
                    while let Some(msg) = stream.next().await {
                        match msg {
                            Ok(Message::Text(text)) => {
                                if let Some(m) = parse_stream_payload(&text, &display_symbol) {
                                    callback(m);
                                }
                            }
                            Ok(Message::Ping(payload)) => {
                                if stream.send(Message::Pong(payload)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Err(err) => {
                                warn!(%err, "binance.us websocket error");
                                break;
                            }
                            _ => {}
                        }
                    }
                }
                Err(err) => warn!(%err, "binance.us websocket connect failed"),
            }
            sleep(backoff_delay(attempt)).await;
        }
    });
}

fn backoff_delay(attempt: u32) -> Duration {
    let capped = attempt.min(10);
    let millis = (500.0 * 1.5_f64.powi(capped as i32)).min(15_000.0);
    Duration::from_millis(millis as u64)
}

fn parse_stream_payload(text: &str, display_symbol: &str) -> Option<StreamMessage> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("b").is_some() && value.get("a").is_some() && value.get("c").is_some() {
        return Some(StreamMessage::Ticker(Ticker {
            symbol: display_symbol.to_string(),
            last: parse_dec(value.get("c")?.as_str()?),
            bid: parse_dec(value.get("b")?.as_str()?),
            ask: parse_dec(value.get("a")?.as_str()?),
            volume_24h: Decimal::ZERO,
            change_24h: Decimal::ZERO,
            timestamp: chrono::Utc::now(),
        }));
    }
    if let Some(price) = value.get("p").and_then(|v| v.as_str()) {
        return Some(StreamMessage::Trade(TradeRecord {
            id: value.get("t").map(|v| v.to_string()).unwrap_or_default(),
            symbol: display_symbol.to_string(),
            price: parse_dec(price),
            quantity: parse_dec(value.get("q")?.as_str()?),
            side: if value.get("m")?.as_bool()? { Side::Sell } else { Side::Buy },
            timestamp: chrono::Utc::now(),
        }));
    }
    None
}

fn level_from_pair(pair: Vec<String>) -> OrderBookLevel {
    OrderBookLevel {
        price: pair.first().map(|s| parse_dec(s)).unwrap_or(Decimal::ZERO),
        quantity: pair.get(1).map(|s| parse_dec(s)).unwrap_or(Decimal::ZERO),
    }
}

fn candle_from_kline(raw: serde_json::Value) -> ExchangeResult<Candle> {
    let arr = raw
        .as_array()
        .ok_or_else(|| ExchangeError::InvalidResponse("kline row is not an array".into()))?;
    let get_str = |i: usize| arr.get(i).and_then(|v| v.as_str()).unwrap_or("0");
    let get_i64 = |i: usize| arr.get(i).and_then(|v| v.as_i64()).unwrap_or(0);
    Ok(Candle::new(
        get_i64(0),
        parse_dec(get_str(1)),
        parse_dec(get_str(2)),
        parse_dec(get_str(3)),
        parse_dec(get_str(4)),
        parse_dec(get_str(5)),
        get_i64(6),
    ))
}

fn response_from_order(order: BinanceOrder) -> OrderResponse {
    let status = match order.status.as_str() {
        "NEW" => OrderStatus::Pending,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::Open,
    };
    OrderResponse {
        order_id: order.order_id.to_string(),
        status,
        filled_qty: parse_dec(&order.executed_qty),
        avg_fill_price: if order.price.is_empty() || order.price == "0.00" {
            None
        } else {
            Some(parse_dec(&order.price))
        },
    }
}

fn parse_dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or(Decimal::ZERO)
}

fn map_status(status: u16) -> ExchangeResult<()> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(ExchangeError::Authorization(format!("http {status}"))),
        429 => Err(ExchangeError::RateLimit(format!("http {status}"))),
        _ => Err(ExchangeError::InvalidResponse(format!("http {status}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker24h {
    last_price: String,
    bid_price: String,
    ask_price: String,
    volume: String,
    price_change_percent: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceDepth {
    last_update_id: u64,
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct BinanceTrade {
    id: u64,
    price: String,
    qty: String,
    time: i64,
    #[serde(rename = "isBuyerMaker")]
    is_buyer_maker: bool,
}

#[derive(Debug, Deserialize)]
struct BinanceAccount {
    balances: Vec<BinanceBalance>,
}

#[derive(Debug, Deserialize)]
struct BinanceBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOrder {
    order_id: u64,
    price: String,
    executed_qty: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_symbol_strips_separators() {
        assert_eq!(BinanceUsAdapter::venue_symbol("BTC-USDT"), "BTCUSDT");
        assert_eq!(BinanceUsAdapter::venue_symbol("eth_usdt"), "ETHUSDT");
    }

    #[test]
    fn stream_key_is_lowercase_alnum() {
        assert_eq!(BinanceUsAdapter::stream_key("BTC-USDT"), "btcusdt");
    }

    #[test]
    fn default_pairs_include_btcusdt() {
        let adapter = BinanceUsAdapter::new(None);
        assert!(adapter.is_valid_pair("BTCUSDT"));
        assert!(!adapter.is_valid_pair("DOGEUSDT"));
    }
}
