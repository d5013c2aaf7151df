//! Shared market-data and trading types.
//!
//! These are the nouns every other crate in the workspace speaks: candles and
//! tickers coming in from an exchange adapter, signals coming out of a
//! strategy, and the positions the Strategy Engine keeps open against them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub type Symbol = String;
pub type StrategyName = String;

/// Buy or sell side, shared by orders, signals, positions, and trade records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side, used to detect an opposing crossover/signal.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for Buy, -1 for Sell — used in unrealized PnL arithmetic.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => -Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    pub fn requires_price(&self) -> bool {
        !matches!(self, OrderType::Market)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

/// OHLCV bar for a fixed time interval. Immutable once produced; ordered by
/// `open_time` within a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
}

impl Candle {
    pub fn new(
        open_time: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        close_time: i64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time,
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }
}

/// Snapshot quote; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: Symbol,
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume_24h: Decimal,
    pub change_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    pub fn mid_price(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// A single price/quantity level in an order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Order-book snapshot. Bids are ordered descending by price, asks ascending.
/// `update_id` is monotonic within a symbol's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: Symbol,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub update_id: u64,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<OrderBookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<OrderBookLevel> {
        self.asks.first().copied()
    }
}

/// A single executed trade, as reported by an exchange's public trade feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub symbol: Symbol,
    pub price: Decimal,
    pub quantity: Decimal,
    pub side: Side,
    pub timestamp: DateTime<Utc>,
}

/// Kind of a strategy-emitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
    CloseLong,
    CloseShort,
    Cancel,
}

impl SignalKind {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalKind::Hold)
    }
}

/// Immutable directional signal emitted by a strategy on `Update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub symbol: Symbol,
    pub price: Decimal,
    pub quantity: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Confidence/strength in [0, 1].
    pub strength: f64,
    pub strategy: StrategyName,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn hold(strategy: impl Into<String>, symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Hold,
            symbol: symbol.into(),
            price: Decimal::ZERO,
            quantity: None,
            stop_loss: None,
            take_profit: None,
            strength: 0.0,
            strategy: strategy.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Structural validity: strength must be a finite value in `[0, 1]`, and
    /// an actionable signal must carry a symbol and a positive price.
    pub fn is_valid(&self) -> bool {
        if !self.strength.is_finite() || !(0.0..=1.0).contains(&self.strength) {
            return false;
        }
        if self.kind.is_actionable() {
            return !self.symbol.is_empty() && self.price > Decimal::ZERO;
        }
        true
    }
}

/// Generates position ids of the form `pos_<ms-epoch>_<monotonic-counter>`.
///
/// The counter must be shared (e.g. held by the owning `StrategyEngine`) so
/// that two positions opened within the same millisecond still get distinct
/// ids.
pub fn generate_position_id(counter: &AtomicU64) -> String {
    let seq = counter.fetch_add(1, Ordering::SeqCst);
    format!("pos_{}_{}", Utc::now().timestamp_millis(), seq)
}

/// An open (or just-closed) position. Created by the Strategy Engine on
/// registration, mutated only by the owning engine under its positions lock,
/// destroyed on `ClosePosition`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub strategy: StrategyName,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub commission_paid: Decimal,
}

impl Position {
    pub fn new(
        id: String,
        symbol: Symbol,
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        strategy: StrategyName,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Self {
        Self {
            id,
            symbol,
            side,
            entry_price,
            quantity,
            entry_time: Utc::now(),
            stop_loss,
            take_profit,
            strategy,
            current_price: entry_price,
            unrealized_pnl: Decimal::ZERO,
            commission_paid: Decimal::ZERO,
        }
    }

    /// Recomputes `unrealized_pnl` from a fresh mark price, per spec:
    /// `(current - entry) * qty * (side == Buy ? 1 : -1) - commission`.
    pub fn mark_to_market(&mut self, current_price: Decimal) {
        self.current_price = current_price;
        self.unrealized_pnl =
            (current_price - self.entry_price) * self.quantity * self.side.sign() - self.commission_paid;
    }

    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }
}

/// Strategy family tag, used for reporting/filtering; does not change
/// execution behavior by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyType {
    Scalping,
    Swing,
    Position,
    Arbitrage,
    Grid,
    Dca,
    Momentum,
    MeanReversion,
}

/// Strategy configuration common to every concrete strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub strategy_type: StrategyType,
    pub symbols: Vec<Symbol>,
    pub timeframe: String,
    pub risk_per_trade_pct: Decimal,
    pub max_drawdown_pct: Decimal,
    pub max_open_positions: usize,
    pub enabled: bool,
    pub params: HashMap<String, f64>,
}

impl StrategyConfig {
    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }
}

/// Running performance statistics for one strategy instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub total_pnl: Decimal,
    pub total_return_pct: Decimal,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown_pct: f64,
    pub current_drawdown_pct: f64,
    pub best_trade: Decimal,
    pub worst_trade: Decimal,
    pub average_trade: Decimal,
    pub consecutive_wins: u32,
    pub consecutive_losses: u32,
    pub max_consecutive_wins: u32,
    pub max_consecutive_losses: u32,
    pub profit_factor: f64,
    pub calmar_ratio: f64,
    pub average_trade_duration_secs: f64,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub start_time: DateTime<Utc>,

    #[serde(skip)]
    gross_profit: Decimal,
    #[serde(skip)]
    gross_loss: Decimal,
    #[serde(skip)]
    peak_equity: Decimal,
    #[serde(skip)]
    running_equity: Decimal,
}

impl Default for StrategyMetrics {
    fn default() -> Self {
        Self {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            total_pnl: Decimal::ZERO,
            total_return_pct: Decimal::ZERO,
            win_rate: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            max_drawdown_pct: 0.0,
            current_drawdown_pct: 0.0,
            best_trade: Decimal::ZERO,
            worst_trade: Decimal::ZERO,
            average_trade: Decimal::ZERO,
            consecutive_wins: 0,
            consecutive_losses: 0,
            max_consecutive_wins: 0,
            max_consecutive_losses: 0,
            profit_factor: 0.0,
            calmar_ratio: 0.0,
            average_trade_duration_secs: 0.0,
            last_trade_at: None,
            start_time: Utc::now(),
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            peak_equity: Decimal::ZERO,
            running_equity: Decimal::ZERO,
        }
    }
}

impl StrategyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-close stats update (spec §4.6): totals incremented, win/loss
    /// split, running win-rate recomputed, current drawdown grows by |pnl|
    /// on a loss and recovers by pnl on a gain, max drawdown is monotone.
    pub fn record_close(&mut self, pnl: Decimal, duration_secs: f64) {
        self.total_trades += 1;
        self.total_pnl += pnl;
        self.running_equity += pnl;
        self.last_trade_at = Some(Utc::now());

        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
            self.gross_profit += pnl;
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
            self.max_consecutive_wins = self.max_consecutive_wins.max(self.consecutive_wins);
            self.current_drawdown_pct = (self.current_drawdown_pct - pnl_pct(pnl, self.peak_equity)).max(0.0);
        } else {
            self.losing_trades += 1;
            self.gross_loss += -pnl;
            self.consecutive_losses += 1;
            self.consecutive_wins = 0;
            self.max_consecutive_losses = self.max_consecutive_losses.max(self.consecutive_losses);
            self.current_drawdown_pct += pnl_pct(-pnl, self.peak_equity.max(Decimal::ONE));
        }

        if self.running_equity > self.peak_equity {
            self.peak_equity = self.running_equity;
        }
        self.max_drawdown_pct = self.max_drawdown_pct.max(self.current_drawdown_pct);

        if pnl > self.best_trade || self.total_trades == 1 {
            self.best_trade = pnl;
        }
        if pnl < self.worst_trade || self.total_trades == 1 {
            self.worst_trade = pnl;
        }
        self.average_trade = self.total_pnl / Decimal::from(self.total_trades);

        self.win_rate = if self.total_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.total_trades as f64 * 100.0
        };

        self.profit_factor = if self.gross_loss.is_zero() {
            if self.gross_profit.is_zero() {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            (self.gross_profit / self.gross_loss)
                .to_string()
                .parse()
                .unwrap_or(0.0)
        };

        let n = self.total_trades as f64;
        self.average_trade_duration_secs =
            (self.average_trade_duration_secs * (n - 1.0) + duration_secs) / n;
    }
}

fn pnl_pct(pnl: Decimal, base: Decimal) -> f64 {
    if base.is_zero() {
        0.0
    } else {
        (pnl / base * Decimal::from(100))
            .to_string()
            .parse()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn position_mark_to_market_long() {
        let mut pos = Position::new(
            "pos_1_0".into(),
            "BTCUSDT".into(),
            Side::Buy,
            dec!(100),
            dec!(2),
            "rsi-1".into(),
            None,
            None,
        );
        pos.commission_paid = dec!(1);
        pos.mark_to_market(dec!(110));
        assert_eq!(pos.unrealized_pnl, dec!(19)); // (110-100)*2 - 1
    }

    #[test]
    fn position_mark_to_market_short() {
        let mut pos = Position::new(
            "pos_1_1".into(),
            "BTCUSDT".into(),
            Side::Sell,
            dec!(100),
            dec!(2),
            "sma-1".into(),
            None,
            None,
        );
        pos.mark_to_market(dec!(90));
        assert_eq!(pos.unrealized_pnl, dec!(20)); // (90-100)*2*-1
    }

    #[test]
    fn generate_position_id_is_monotonic_and_unique() {
        let counter = AtomicU64::new(0);
        let a = generate_position_id(&counter);
        let b = generate_position_id(&counter);
        assert_ne!(a, b);
        assert!(a.starts_with("pos_"));
    }

    #[test]
    fn metrics_totals_equal_wins_plus_losses() {
        let mut m = StrategyMetrics::new();
        m.record_close(dec!(10), 60.0);
        m.record_close(dec!(-5), 30.0);
        m.record_close(dec!(7), 45.0);
        assert_eq!(m.total_trades, m.winning_trades + m.losing_trades);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.losing_trades, 1);
    }

    #[test]
    fn hold_signal_is_always_valid() {
        assert!(Signal::hold("rsi-1", "", "no data").is_valid());
    }

    #[test]
    fn actionable_signal_requires_symbol_and_positive_price() {
        let mut signal = Signal {
            kind: SignalKind::Buy,
            symbol: "BTCUSDT".into(),
            price: dec!(100),
            quantity: None,
            stop_loss: None,
            take_profit: None,
            strength: 0.8,
            strategy: "rsi-1".into(),
            message: String::new(),
            timestamp: Utc::now(),
        };
        assert!(signal.is_valid());

        signal.price = Decimal::ZERO;
        assert!(!signal.is_valid());

        signal.price = dec!(100);
        signal.symbol = String::new();
        assert!(!signal.is_valid());

        signal.symbol = "BTCUSDT".into();
        signal.strength = 1.5;
        assert!(!signal.is_valid());

        signal.strength = f64::NAN;
        assert!(!signal.is_valid());
    }
}
