//! Coinbase Advanced Trade reference adapter, authenticated with the legacy
//! CB-ACCESS HMAC scheme (timestamp + method + path + body, base64 secret).

use crate::credentials::ExchangeCredentials;
use crate::{
    ExchangeAdapter, ExchangeError, ExchangeResult, OrderRequest, OrderResponse, RateLimiter,
    StreamCallback, StreamMessage, StreamType,
};
use async_trait::async_trait;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use gekko_core::{Candle, OrderBookLevel, OrderBookSnapshot, OrderStatus, OrderType, Side, Ticker, TradeRecord};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::warn;
use url::Url;

const REST_URL: &str = "https://api.exchange.coinbase.com";
const WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

type HmacSha256 = Hmac<Sha256>;

pub struct CoinbaseAdapter {
    client: Client,
    rest_url: Url,
    ws_url: Url,
    credentials: Option<ExchangeCredentials>,
    initialized: AtomicBool,
    rate_limiter: RateLimiter,
}

impl CoinbaseAdapter {
    pub fn new(credentials: Option<ExchangeCredentials>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("valid HTTP client"),
            rest_url: Url::parse(REST_URL).expect("valid Coinbase REST url"),
            ws_url: Url::parse(WS_URL).expect("valid Coinbase websocket url"),
            credentials,
            initialized: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(10),
        }
    }

    fn venue_symbol(symbol: &str) -> String {
        if symbol.contains('-') {
            symbol.to_uppercase()
        } else if symbol.len() > 3 {
            format!("{}-{}", &symbol[..symbol.len() - 3], &symbol[symbol.len() - 3..]).to_uppercase()
        } else {
            symbol.to_uppercase()
        }
    }

    fn signed_headers(&self, method: Method, path: &str, body: &str) -> ExchangeResult<Vec<(&'static str, String)>> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| ExchangeError::Authorization("no credentials configured".into()))?;
        let secret_bytes = base64::engine::general_purpose::STANDARD
            .decode(creds.api_secret().expose_secret())
            .map_err(|e| ExchangeError::Configuration(format!("invalid base64 API secret: {e}")))?;
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let prehash = format!("{timestamp}{method}{path}{body}");
        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| ExchangeError::Configuration(e.to_string()))?;
        mac.update(prehash.as_bytes());
        let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        let mut headers = vec![
            ("CB-ACCESS-KEY", creds.api_key().expose_secret().clone()),
            ("CB-ACCESS-SIGN", signature),
            ("CB-ACCESS-TIMESTAMP", timestamp),
        ];
        if let Some(passphrase) = creds.passphrase() {
            headers.push(("CB-ACCESS-PASSPHRASE", passphrase.to_string()));
        }
        Ok(headers)
    }
}

#[async_trait]
impl ExchangeAdapter for CoinbaseAdapter {
    fn exchange_name(&self) -> &'static str {
        "coinbase"
    }

    async fn initialize(&mut self) -> ExchangeResult<()> {
        let url = format!("{}/products", self.rest_url);
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        self.rate_limiter.acquire().await;
        let url = format!("{}/products/{}/ticker", self.rest_url, Self::venue_symbol(symbol));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let t: CoinbaseTicker = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: parse_dec(&t.price),
            bid: parse_dec(&t.bid),
            ask: parse_dec(&t.ask),
            volume_24h: parse_dec(&t.volume),
            change_24h: Decimal::ZERO,
            timestamp: chrono::Utc::now(),
        })
    }

    async fn get_order_book(&self, symbol: &str, depth: u32) -> ExchangeResult<OrderBookSnapshot> {
        self.rate_limiter.acquire().await;
        let level = if depth <= 50 { 2 } else { 3 };
        let url = format!(
            "{}/products/{}/book?level={}",
            self.rest_url,
            Self::venue_symbol(symbol),
            level
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let book: CoinbaseBook = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(OrderBookSnapshot {
            symbol: symbol.to_string(),
            bids: book.bids.into_iter().map(level_from_triplet).collect(),
            asks: book.asks.into_iter().map(level_from_triplet).collect(),
            update_id: book.sequence,
            timestamp: chrono::Utc::now(),
        })
    }

    async fn get_recent_trades(&self, symbol: &str, n: u32) -> ExchangeResult<Vec<TradeRecord>> {
        self.rate_limiter.acquire().await;
        let url = format!(
            "{}/products/{}/trades?limit={}",
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
        let trades: Vec<CoinbaseTrade> = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(trades
            .into_iter()
            .map(|t| TradeRecord {
                id: t.trade_id.to_string(),
                symbol: symbol.to_string(),
                price: parse_dec(&t.price),
                quantity: parse_dec(&t.size),
                side: if t.side == "buy" { Side::Buy } else { Side::Sell },
                timestamp: chrono::DateTime::parse_from_rfc3339(&t.time)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(|_| chrono::Utc::now()),
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
        let granularity = interval_to_granularity(interval);
        let mut url = format!(
            "{}/products/{}/candles?granularity={}",
            self.rest_url,
            Self::venue_symbol(symbol),
            granularity
        );
        if let Some(s) = start_ms {
            url.push_str(&format!("&start={}", s / 1000));
        }
        if let Some(e) = end_ms {
            url.push_str(&format!("&end={}", e / 1000));
        }
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let raw: Vec<[f64; 6]> = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        let mut candles: Vec<Candle> = raw
            .into_iter()
            .take(limit as usize)
            .map(|row| {
                let open_time = row[0] as i64 * 1000;
                Candle::new(
                    open_time,
                    Decimal::try_from(row[3]).unwrap_or(Decimal::ZERO),
                    Decimal::try_from(row[2]).unwrap_or(Decimal::ZERO),
                    Decimal::try_from(row[1]).unwrap_or(Decimal::ZERO),
                    Decimal::try_from(row[4]).unwrap_or(Decimal::ZERO),
                    Decimal::try_from(row[5]).unwrap_or(Decimal::ZERO),
                    open_time + granularity as i64 * 1000,
                )
            })
            .collect();
        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }

    async fn place_order(&self, request: OrderRequest) -> ExchangeResult<OrderResponse> {
        self.rate_limiter.acquire().await;
        let side = match request.side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        let order_type = match request.order_type {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Stop => "stop",
            OrderType::StopLimit => "stop_limit",
        };
        let body = json!({
            "product_id": Self::venue_symbol(&request.symbol),
            "side": side,
            "type": order_type,
            "size": request.quantity.to_string(),
            "price": request.price.map(|p| p.to_string()),
        })
        .to_string();

        let headers = self.signed_headers(Method::POST, "/orders", &body)?;
        let mut builder = self.client.post(format!("{}/orders", self.rest_url)).body(body.clone());
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        let resp = builder
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let order: CoinbaseOrder = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(response_from_order(order))
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> ExchangeResult<bool> {
        self.rate_limiter.acquire().await;
        let path = format!("/orders/{order_id}");
        let headers = self.signed_headers(Method::DELETE, &path, "")?;
        let mut builder = self.client.delete(format!("{}{}", self.rest_url, path));
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        Ok(resp.status().is_success())
    }

    async fn get_order_status(&self, _symbol: &str, order_id: &str) -> ExchangeResult<OrderResponse> {
        self.rate_limiter.acquire().await;
        let path = format!("/orders/{order_id}");
        let headers = self.signed_headers(Method::GET, &path, "")?;
        let mut builder = self.client.get(format!("{}{}", self.rest_url, path));
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let order: CoinbaseOrder = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(response_from_order(order))
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<OrderResponse>> {
        self.rate_limiter.acquire().await;
        let mut path = "/orders?status=open".to_string();
        if let Some(s) = symbol {
            path.push_str(&format!("&product_id={}", Self::venue_symbol(s)));
        }
        let headers = self.signed_headers(Method::GET, &path, "")?;
        let mut builder = self.client.get(format!("{}{}", self.rest_url, path));
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let orders: Vec<CoinbaseOrder> = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(orders.into_iter().map(response_from_order).collect())
    }

    async fn get_account_balance(&self, asset: &str) -> ExchangeResult<Decimal> {
        self.rate_limiter.acquire().await;
        let path = "/accounts";
        let headers = self.signed_headers(Method::GET, path, "")?;
        let mut builder = self.client.get(format!("{}{}", self.rest_url, path));
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        map_status(resp.status().as_u16())?;
        let accounts: Vec<CoinbaseAccount> = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok(accounts
            .into_iter()
            .find(|a| a.currency.eq_ignore_ascii_case(asset))
            .map(|a| parse_dec(&a.available))
            .unwrap_or(Decimal::ZERO))
    }

    async fn subscribe_order_book(&self, symbol: &str, callback: StreamCallback) -> ExchangeResult<bool> {
        spawn_stream(self.ws_url.clone(), vec!["level2".into()], symbol.to_string(), callback);
        Ok(true)
    }

    async fn subscribe_ticker(&self, symbol: &str, callback: StreamCallback) -> ExchangeResult<bool> {
        spawn_stream(self.ws_url.clone(), vec!["ticker".into()], symbol.to_string(), callback);
        Ok(true)
    }

    async fn subscribe_trades(&self, symbol: &str, callback: StreamCallback) -> ExchangeResult<bool> {
        spawn_stream(self.ws_url.clone(), vec!["matches".into()], symbol.to_string(), callback);
        Ok(true)
    }

    async fn subscribe_klines(
        &self,
        _symbol: &str,
        _interval: &str,
        _callback: StreamCallback,
    ) -> ExchangeResult<bool> {
        Err(ExchangeError::InvalidResponse(
            "Coinbase's public feed has no kline channel; poll get_klines instead".into(),
        ))
    }

    async fn unsubscribe(&self, _symbol: &str, _stream_type: StreamType) -> ExchangeResult<()> {
        Ok(())
    }

    fn available_pairs(&self) -> Vec<String> {
        vec!["BTC-USD".into(), "ETH-USD".into(), "SOL-USD".into()]
    }

    fn is_valid_pair(&self, symbol: &str) -> bool {
        self.available_pairs().iter().any(|p| p == &Self::venue_symbol(symbol))
    }
}

fn spawn_stream(ws_url: Url, channels: Vec<String>, product_id: String, callback: StreamCallback) {
    tokio::spawn(async move {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match connect_async(ws_url.clone()).await {
                Ok((mut stream, _)) => {
                    attempt = 0;
                    let subscribe = json!({
                        "type": "subscribe",
                        "product_ids": [product_id.clone()],
                        "channels": channels,
                    });
                    if stream.send(Message::Text(subscribe.to_string())).await.is_err() {
                        continue;
                    }
                    while let Some(msg) = stream.next().await {
                        match msg {
                            Ok(Message::Text(text)) => {
                                if let Some(m) = parse_stream_payload(&text) {
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
                                warn!(%err, "coinbase websocket error");
                                break;
                            }
                            _ => {}
                        }
                    }
                }
                Err(err) => warn!(%err, "coinbase websocket connect failed"),
            }
            sleep(backoff_delay(attempt)).await;
        }
    });
}

fn backoff_delay(attempt: u32) -> Duration {
    let millis = (400.0 * 1.6_f64.powi(attempt.min(8) as i32)).min(10_000.0);
    Duration::from_millis(millis as u64)
}

fn parse_stream_payload(text: &str) -> Option<StreamMessage> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let message_type = value.get("type")?.as_str()?;
    let product_id = value.get("product_id")?.as_str()?.to_string();
    match message_type {
        "ticker" => Some(StreamMessage::Ticker(Ticker {
            symbol: product_id,
            last: parse_dec(value.get("price")?.as_str()?),
            bid: parse_dec(value.get("best_bid").and_then(|v| v.as_str()).unwrap_or("0")),
            ask: parse_dec(value.get("best_ask").and_then(|v| v.as_str()).unwrap_or("0")),
            volume_24h: parse_dec(value.get("volume_24h").and_then(|v| v.as_str()).unwrap_or("0")),
            change_24h: Decimal::ZERO,
            timestamp: chrono::Utc::now(),
        })),
        "match" => Some(StreamMessage::Trade(TradeRecord {
            id: value.get("trade_id").map(|v| v.to_string()).unwrap_or_default(),
            symbol: product_id,
            price: parse_dec(value.get("price")?.as_str()?),
            quantity: parse_dec(value.get("size")?.as_str()?),
            side: if value.get("side")?.as_str()? == "buy" { Side::Buy } else { Side::Sell },
            timestamp: chrono::Utc::now(),
        })),
        _ => None,
    }
}

fn level_from_triplet(entries: Vec<serde_json::Value>) -> OrderBookLevel {
    let price = entries.first().and_then(|v| v.as_str()).map(parse_dec).unwrap_or(Decimal::ZERO);
    let quantity = entries.get(1).and_then(|v| v.as_str()).map(parse_dec).unwrap_or(Decimal::ZERO);
    OrderBookLevel { price, quantity }
}

fn interval_to_granularity(interval: &str) -> u32 {
    match interval {
        "1m" => 60,
        "5m" => 300,
        "15m" => 900,
        "1h" => 3600,
        "6h" => 21600,
        "1d" => 86400,
        _ => 3600,
    }
}

fn response_from_order(order: CoinbaseOrder) -> OrderResponse {
    let status = match order.status.as_str() {
        "pending" => OrderStatus::Pending,
        "open" | "active" => OrderStatus::Open,
        "done" => {
            let filled: Decimal = parse_dec(&order.filled_size);
            let size: Decimal = parse_dec(&order.size);
            if filled >= size {
                OrderStatus::Filled
            } else if filled > Decimal::ZERO {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Cancelled
            }
        }
        "cancelled" => OrderStatus::Cancelled,
        "rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    };
    OrderResponse {
        order_id: order.id,
        status,
        filled_qty: parse_dec(&order.filled_size),
        avg_fill_price: order.price.as_deref().map(parse_dec),
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
struct CoinbaseTicker {
    price: String,
    bid: String,
    ask: String,
    volume: String,
}

#[derive(Debug, Deserialize)]
struct CoinbaseBook {
    sequence: u64,
    bids: Vec<Vec<serde_json::Value>>,
    asks: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct CoinbaseTrade {
    trade_id: u64,
    price: String,
    size: String,
    side: String,
    time: String,
}

#[derive(Debug, Deserialize)]
struct CoinbaseAccount {
    currency: String,
    available: String,
}

#[derive(Debug, Deserialize)]
struct CoinbaseOrder {
    id: String,
    status: String,
    size: String,
    price: Option<String>,
    filled_size: String,
}
