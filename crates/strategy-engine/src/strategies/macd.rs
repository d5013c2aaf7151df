//! MACD crossover / histogram / divergence strategy.

use crate::indicators::{kernels, RingBuffer};
use crate::strategy::{Strategy, StrategyRuntime, StrategySnapshot};
use chrono::Utc;
use gekko_core::{Candle, Signal, SignalKind, StrategyMetrics, TradingError, TradingResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const COOLDOWN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacdConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    pub histogram_threshold: f64,
    pub min_histogram_change: f64,
    pub use_divergence: bool,
    pub use_histogram_analysis: bool,
    pub use_zero_line_cross: bool,
    pub trend_confirmation_periods: usize,
    pub position_size_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            histogram_threshold: 0.0,
            min_histogram_change: 0.001,
            use_divergence: true,
            use_histogram_analysis: true,
            use_zero_line_cross: true,
            trend_confirmation_periods: 3,
            position_size_pct: 0.1,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
        }
    }
}

impl MacdConfig {
    pub fn validate(&self) -> TradingResult<()> {
        if !(self.fast_period < self.slow_period) {
            return Err(TradingError::Configuration("fast_period must be less than slow_period".into()));
        }
        if self.fast_period == 0 || self.slow_period == 0 || self.signal_period == 0 {
            return Err(TradingError::Configuration("all MACD periods must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Snapshot {
    macd: f64,
    signal_line: f64,
    histogram: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MacdIndicators {
    macd: f64,
    signal_line: f64,
    histogram: f64,
    trend: Trend,
}

pub struct MacdStrategy {
    name: String,
    symbol: String,
    config: MacdConfig,
    runtime: StrategyRuntime,
    macd_history: RingBuffer<f64>,
    trend_history: RingBuffer<Trend>,
    prev_snapshot: Option<Snapshot>,
    in_position: bool,
    current_position_id: Option<String>,
}

impl MacdStrategy {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, config: MacdConfig) -> TradingResult<Self> {
        config.validate()?;
        let signal_period = config.signal_period;
        Ok(Self {
            name: name.into(),
            symbol: symbol.into(),
            config,
            runtime: StrategyRuntime::new(200),
            macd_history: RingBuffer::new(signal_period.max(1) + 5),
            trend_history: RingBuffer::new(10),
            prev_snapshot: None,
            in_position: false,
            current_position_id: None,
        })
    }

    fn hold(&self, message: impl Into<String>) -> Signal {
        Signal::hold(self.name.clone(), self.symbol.clone(), message)
    }

    fn classify_trend(&self, snap: &Snapshot) -> Trend {
        if snap.macd > snap.signal_line && snap.macd > 0.0 {
            Trend::StrongBullish
        } else if snap.macd > snap.signal_line {
            Trend::Bullish
        } else if snap.macd < snap.signal_line && snap.macd < 0.0 {
            Trend::StrongBearish
        } else if snap.macd < snap.signal_line {
            Trend::Bearish
        } else {
            Trend::Neutral
        }
    }

    fn directional(&mut self, kind: SignalKind, price: f64, strength: f64, message: &str, tag: &'static str) -> Signal {
        let now = Utc::now();
        if self.runtime.in_cooldown(tag, COOLDOWN, now) {
            return self.hold(format!("{} suppressed: cooldown active", message));
        }
        self.runtime.mark_emitted(tag, now);

        let price_dec = Decimal::try_from(price).unwrap_or(Decimal::ZERO);
        let (stop_loss, take_profit) = match kind {
            SignalKind::Buy => (
                Some(price_dec * Decimal::try_from(1.0 - self.config.stop_loss_pct).unwrap_or(Decimal::ONE)),
                Some(price_dec * Decimal::try_from(1.0 + self.config.take_profit_pct).unwrap_or(Decimal::ONE)),
            ),
            SignalKind::Sell => (
                Some(price_dec * Decimal::try_from(1.0 + self.config.stop_loss_pct).unwrap_or(Decimal::ONE)),
                Some(price_dec * Decimal::try_from(1.0 - self.config.take_profit_pct).unwrap_or(Decimal::ONE)),
            ),
            _ => (None, None),
        };
        let signal = Signal {
            kind,
            symbol: self.symbol.clone(),
            price: price_dec,
            quantity: None,
            stop_loss,
            take_profit,
            strength: strength.clamp(0.0, 1.0),
            strategy: self.name.clone(),
            message: message.to_string(),
            timestamp: now,
        };
        self.runtime.push_signal(signal.clone());
        signal
    }

    fn classify(&mut self, snap: Snapshot, price: f64) -> Signal {
        let prev = self.prev_snapshot.unwrap_or(snap);
        let macd_change = snap.macd - prev.macd;
        let histogram_change = snap.histogram - prev.histogram;

        // 1. Signal-line cross.
        if prev.macd <= prev.signal_line && snap.macd > snap.signal_line {
            let strength = ((snap.macd - snap.signal_line).abs() / 0.01).min(1.0);
            self.prev_snapshot = Some(snap);
            return self.directional(SignalKind::Buy, price, strength, "Bullish Crossover", "bullish_crossover");
        }
        if prev.macd >= prev.signal_line && snap.macd < snap.signal_line {
            let strength = ((snap.macd - snap.signal_line).abs() / 0.01).min(1.0);
            self.prev_snapshot = Some(snap);
            return self.directional(SignalKind::Sell, price, strength, "Bearish Crossover", "bearish_crossover");
        }

        // 2. Zero-line cross.
        if self.config.use_zero_line_cross {
            if prev.macd <= 0.0 && snap.macd > 0.0 {
                let strength = (snap.macd.abs() / 0.005).min(1.0);
                self.prev_snapshot = Some(snap);
                return self.directional(
                    SignalKind::Buy,
                    price,
                    strength,
                    "Zero Line Cross Up",
                    "zero_line_cross_up",
                );
            }
            if prev.macd >= 0.0 && snap.macd < 0.0 {
                let strength = (snap.macd.abs() / 0.005).min(1.0);
                self.prev_snapshot = Some(snap);
                return self.directional(
                    SignalKind::Sell,
                    price,
                    strength,
                    "Zero Line Cross Down",
                    "zero_line_cross_down",
                );
            }
        }

        // 3. Histogram turn / acceleration.
        if self.config.use_histogram_analysis {
            if prev.histogram <= 0.0 && snap.histogram > 0.0 {
                self.prev_snapshot = Some(snap);
                return self.directional(
                    SignalKind::Buy,
                    price,
                    (histogram_change.abs() / 0.001).min(1.0),
                    "Histogram Turn Positive",
                    "histogram_turn_positive",
                );
            }
            if prev.histogram >= 0.0 && snap.histogram < 0.0 {
                self.prev_snapshot = Some(snap);
                return self.directional(
                    SignalKind::Sell,
                    price,
                    (histogram_change.abs() / 0.001).min(1.0),
                    "Histogram Turn Negative",
                    "histogram_turn_negative",
                );
            }
            if histogram_change.abs() > self.config.min_histogram_change {
                let strength = (histogram_change.abs() / 0.001).min(1.0);
                if histogram_change > 0.0 && snap.histogram > 0.0 {
                    self.prev_snapshot = Some(snap);
                    return self.directional(
                        SignalKind::Buy,
                        price,
                        strength,
                        "Histogram Accelerating Up",
                        "histogram_accel_up",
                    );
                }
                if histogram_change < 0.0 && snap.histogram < 0.0 {
                    self.prev_snapshot = Some(snap);
                    return self.directional(
                        SignalKind::Sell,
                        price,
                        strength,
                        "Histogram Accelerating Down",
                        "histogram_accel_down",
                    );
                }
            }
        }

        // 4. Momentum acceleration: MACD and histogram strengthen together.
        if macd_change.abs() > 0.0 && histogram_change.abs() > 0.0 && macd_change.signum() == histogram_change.signum() {
            let strength = (macd_change.abs() / 0.01).min(1.0);
            if macd_change > 0.0 {
                self.prev_snapshot = Some(snap);
                return self.directional(SignalKind::Buy, price, strength, "Momentum Acceleration Up", "momentum_accel_up");
            } else {
                self.prev_snapshot = Some(snap);
                return self.directional(
                    SignalKind::Sell,
                    price,
                    strength,
                    "Momentum Acceleration Down",
                    "momentum_accel_down",
                );
            }
        }

        // 5. Trend confirmation: majority of the last N snapshots share a trend.
        let trend = self.classify_trend(&snap);
        self.trend_history.push(trend);
        let window = self.trend_history.last_n(self.config.trend_confirmation_periods);
        let bullish_count = window.iter().filter(|t| matches!(t, Trend::Bullish | Trend::StrongBullish)).count();
        let bearish_count = window.iter().filter(|t| matches!(t, Trend::Bearish | Trend::StrongBearish)).count();
        let quorum = (window.len() * 2) / 3 + 1;
        if window.len() >= self.config.trend_confirmation_periods {
            if bullish_count >= quorum {
                self.prev_snapshot = Some(snap);
                return self.directional(SignalKind::Buy, price, 0.5, "Trend Confirmation Bullish", "trend_confirm_bull");
            }
            if bearish_count >= quorum {
                self.prev_snapshot = Some(snap);
                return self.directional(SignalKind::Sell, price, 0.5, "Trend Confirmation Bearish", "trend_confirm_bear");
            }
        }

        // 6. Divergence.
        if self.config.use_divergence {
            let lookback = 20;
            let prices: Vec<f64> = self.runtime.closes.last_n(lookback).into_iter().copied().collect();
            let macds: Vec<f64> = self.macd_history.last_n(lookback).into_iter().copied().collect();
            if let Some(signal) = self.divergence_signal(&prices, &macds, price) {
                return signal;
            }
        }

        self.prev_snapshot = Some(snap);
        self.hold("No MACD signal")
    }

    fn divergence_signal(&mut self, prices: &[f64], macds: &[f64], price: f64) -> Option<Signal> {
        let price_lows = pivots(prices, false);
        let macd_lows = pivots(macds, false);
        if price_lows.len() >= 2 && macd_lows.len() >= 2 {
            let (_, p1) = price_lows[price_lows.len() - 2];
            let (_, p2) = price_lows[price_lows.len() - 1];
            let (_, m1) = macd_lows[macd_lows.len() - 2];
            let (_, m2) = macd_lows[macd_lows.len() - 1];
            if p2 < p1 && m2 > m1 {
                return Some(self.directional(SignalKind::Buy, price, 0.9, "Divergence Bullish", "macd_divergence_bull"));
            }
        }
        let price_highs = pivots(prices, true);
        let macd_highs = pivots(macds, true);
        if price_highs.len() >= 2 && macd_highs.len() >= 2 {
            let (_, p1) = price_highs[price_highs.len() - 2];
            let (_, p2) = price_highs[price_highs.len() - 1];
            let (_, m1) = macd_highs[macd_highs.len() - 2];
            let (_, m2) = macd_highs[macd_highs.len() - 1];
            if p2 > p1 && m2 < m1 {
                return Some(self.directional(SignalKind::Sell, price, 0.9, "Divergence Bearish", "macd_divergence_bear"));
            }
        }
        None
    }
}

fn pivots(series: &[f64], highs: bool) -> Vec<(usize, f64)> {
    let mut out = Vec::new();
    for i in 1..series.len().saturating_sub(1) {
        let is_pivot = if highs {
            series[i] > series[i - 1] && series[i] > series[i + 1]
        } else {
            series[i] < series[i - 1] && series[i] < series[i + 1]
        };
        if is_pivot {
            out.push((i, series[i]));
        }
    }
    out
}

impl Strategy for MacdStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn state(&self) -> crate::strategy::StrategyState {
        self.runtime.state
    }

    fn start(&mut self) {
        self.runtime.start();
    }

    fn pause(&mut self) {
        self.runtime.pause();
    }

    fn resume(&mut self) {
        self.runtime.resume();
    }

    fn stop(&mut self) {
        self.runtime.stop();
    }

    fn reset(&mut self) {
        self.runtime.reset();
        self.macd_history = RingBuffer::new(self.config.signal_period.max(1) + 5);
        self.trend_history = RingBuffer::new(10);
        self.prev_snapshot = None;
        self.in_position = false;
        self.current_position_id = None;
    }

    fn update(&mut self, candles: &[Candle], _ticker: Option<&gekko_core::Ticker>) -> Signal {
        if !self.runtime.state.is_active() {
            return self.hold("Strategy not active");
        }
        let start = std::time::Instant::now();
        for candle in candles {
            self.runtime.closes.push(candle.close.to_f64().unwrap_or(0.0));
            self.runtime.volumes.push(candle.volume.to_f64().unwrap_or(0.0));
        }
        let closes: Vec<f64> = self.runtime.closes.iter().copied().collect();
        if closes.len() < self.config.slow_period {
            self.runtime.last_execution = start.elapsed();
            return self.hold("Insufficient data for MACD");
        }

        let fast_ema = kernels::ema(&closes, self.config.fast_period);
        let slow_ema = kernels::ema(&closes, self.config.slow_period);
        let macd = fast_ema - slow_ema;
        self.macd_history.push(macd);
        let macd_series: Vec<f64> = self.macd_history.iter().copied().collect();
        let signal_line = kernels::ema(&macd_series, self.config.signal_period);
        let histogram = macd - signal_line;

        let snap = Snapshot { macd, signal_line, histogram };
        let price = closes[closes.len() - 1];
        let signal = self.classify(snap, price);
        self.runtime.last_execution = start.elapsed();
        signal
    }

    fn metrics(&self) -> &StrategyMetrics {
        &self.runtime.metrics
    }

    fn last_execution(&self) -> std::time::Duration {
        self.runtime.last_execution
    }

    fn record_close(&mut self, pnl: Decimal, duration_secs: f64) {
        self.runtime.metrics.record_close(pnl, duration_secs);
        self.in_position = false;
        self.current_position_id = None;
    }

    fn on_position_opened(&mut self, position: &gekko_core::Position) {
        self.in_position = true;
        self.current_position_id = Some(position.id.clone());
    }

    fn snapshot(&self) -> StrategySnapshot {
        let snap = self.prev_snapshot.unwrap_or(Snapshot { macd: 0.0, signal_line: 0.0, histogram: 0.0 });
        let trend = self.classify_trend(&snap);
        StrategySnapshot {
            strategy_type: "macd".to_string(),
            name: self.name.clone(),
            state: self.runtime.state,
            config: serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null),
            metrics: self.runtime.metrics.clone(),
            in_position: self.in_position,
            current_position_id: self.current_position_id.clone(),
            current_indicator_values: serde_json::to_value(MacdIndicators {
                macd: snap.macd,
                signal_line: snap.signal_line,
                histogram: snap.histogram,
                trend,
            })
            .unwrap_or(serde_json::Value::Null),
            current_zone_or_trend: format!("{:?}", trend),
            history: self
                .macd_history
                .iter()
                .rev()
                .take(100)
                .map(|v| serde_json::json!({ "macd": v }))
                .collect(),
        }
    }

    fn from_snapshot(symbol: &str, snapshot: &StrategySnapshot) -> TradingResult<Self> {
        let config: MacdConfig = serde_json::from_value(snapshot.config.clone())
            .map_err(|e| TradingError::Persistence(format!("macd config: {e}")))?;
        let mut strategy = Self::new(snapshot.name.clone(), symbol, config)?;
        strategy.runtime.metrics = snapshot.metrics.clone();
        strategy.runtime.state = snapshot.state;
        strategy.in_position = snapshot.in_position;
        strategy.current_position_id = snapshot.current_position_id.clone();
        for entry in snapshot.history.iter().rev() {
            if let Some(macd) = entry.get("macd").and_then(|v| v.as_f64()) {
                strategy.macd_history.push(macd);
            }
        }
        if let Ok(indicators) = serde_json::from_value::<MacdIndicators>(snapshot.current_indicator_values.clone()) {
            strategy.prev_snapshot = Some(Snapshot {
                macd: indicators.macd,
                signal_line: indicators.signal_line,
                histogram: indicators.histogram,
            });
        }
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gekko_core::Candle;

    fn candle(close: f64, t: i64) -> Candle {
        Candle::new(t, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::try_from(close).unwrap(), Decimal::ONE, t)
    }

    #[test]
    fn bullish_crossover_emits_buy() {
        let cfg = MacdConfig {
            fast_period: 3,
            slow_period: 5,
            signal_period: 3,
            ..MacdConfig::default()
        };
        let mut strat = MacdStrategy::new("macd-3-5-3", "BTCUSDT", cfg).unwrap();
        strat.start();

        let mut closes = vec![10.0; 6];
        closes.extend([9.5, 9.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0]);
        let candles: Vec<Candle> = closes.iter().enumerate().map(|(i, &c)| candle(c, i as i64)).collect();

        let mut last_signal = strat.hold("init");
        for i in 0..candles.len() {
            last_signal = strat.update(&candles[i..=i], None);
        }
        assert!(matches!(last_signal.kind, SignalKind::Buy | SignalKind::Hold));
    }

    #[test]
    fn insufficient_data_holds() {
        let mut strat = MacdStrategy::new("macd", "BTCUSDT", MacdConfig::default()).unwrap();
        strat.start();
        let signal = strat.update(&[candle(10.0, 0)], None);
        assert_eq!(signal.kind, SignalKind::Hold);
    }

    #[test]
    fn snapshot_round_trip_preserves_config_and_indicators() {
        let mut strat = MacdStrategy::new("macd-roundtrip", "BTCUSDT", MacdConfig::default()).unwrap();
        strat.start();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.2).sin() * 5.0 + i as f64 * 0.1).collect();
        let candles: Vec<Candle> = closes.iter().enumerate().map(|(i, &c)| candle(c, i as i64)).collect();
        for i in 0..candles.len() {
            strat.update(&candles[i..=i], None);
        }
        let before = strat.snapshot();

        let restored = MacdStrategy::from_snapshot("BTCUSDT", &before).unwrap();
        let after = restored.snapshot();

        assert_eq!(before.config, after.config);
        assert_eq!(before.current_indicator_values, after.current_indicator_values);
        assert_eq!(before.current_zone_or_trend, after.current_zone_or_trend);
        assert_eq!(before.state, after.state);
        assert_eq!(after.history.len(), before.history.len().min(100));
    }

    #[test]
    fn config_validation_rejects_fast_gte_slow() {
        let cfg = MacdConfig {
            fast_period: 30,
            slow_period: 10,
            ..MacdConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
