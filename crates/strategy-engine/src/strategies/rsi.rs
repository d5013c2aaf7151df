//! RSI zone/momentum/divergence strategy.
//!
//! See the module doc comment in [`crate::strategies`] for the shared shape
//! every concrete strategy follows.

use crate::indicators::{kernels, RingBuffer};
use crate::strategy::{Strategy, StrategyRuntime, StrategySnapshot};
use chrono::Utc;
use gekko_core::{Candle, Signal, SignalKind, StrategyMetrics, TradingError, TradingResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const COOLDOWN: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsiConfig {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub extreme_oversold: f64,
    pub extreme_overbought: f64,
    pub position_size_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub min_rsi_change: f64,
    pub use_divergence: bool,
    pub divergence_lookback: usize,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
            extreme_oversold: 20.0,
            extreme_overbought: 80.0,
            position_size_pct: 0.1,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
            min_rsi_change: 5.0,
            use_divergence: true,
            divergence_lookback: 20,
        }
    }
}

impl RsiConfig {
    pub fn validate(&self) -> TradingResult<()> {
        if !(self.oversold < self.overbought) {
            return Err(TradingError::Configuration(
                "oversold must be less than overbought".into(),
            ));
        }
        if !(self.extreme_oversold < self.oversold) {
            return Err(TradingError::Configuration(
                "extreme_oversold must be less than oversold".into(),
            ));
        }
        if !(self.extreme_overbought > self.overbought) {
            return Err(TradingError::Configuration(
                "extreme_overbought must be greater than overbought".into(),
            ));
        }
        let clamped = self.period.clamp(2, 50);
        if clamped != self.period {
            return Err(TradingError::Configuration(format!(
                "period {} outside allowed range 2..50",
                self.period
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Zone {
    ExtremeOversold,
    Oversold,
    NeutralLow,
    NeutralHigh,
    Overbought,
    ExtremeOverbought,
}

impl Zone {
    pub fn classify(rsi: f64, cfg: &RsiConfig) -> Zone {
        if rsi <= cfg.extreme_oversold {
            Zone::ExtremeOversold
        } else if rsi <= cfg.oversold {
            Zone::Oversold
        } else if rsi < 50.0 {
            Zone::NeutralLow
        } else if rsi < cfg.overbought {
            Zone::NeutralHigh
        } else if rsi < cfg.extreme_overbought {
            Zone::Overbought
        } else {
            Zone::ExtremeOverbought
        }
    }

    fn is_oversold_side(&self) -> bool {
        matches!(self, Zone::Oversold | Zone::ExtremeOversold)
    }

    fn is_overbought_side(&self) -> bool {
        matches!(self, Zone::Overbought | Zone::ExtremeOverbought)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RsiIndicators {
    rsi: f64,
    zone: Zone,
}

pub struct RsiStrategy {
    name: String,
    symbol: String,
    config: RsiConfig,
    runtime: StrategyRuntime,
    rsi_history: RingBuffer<f64>,
    prev_zone: Option<Zone>,
    in_position: bool,
    current_position_id: Option<String>,
}

impl RsiStrategy {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, config: RsiConfig) -> TradingResult<Self> {
        config.validate()?;
        let lookback = config.divergence_lookback.max(10) + 5;
        Ok(Self {
            name: name.into(),
            symbol: symbol.into(),
            config,
            runtime: StrategyRuntime::new((lookback).max(200)),
            rsi_history: RingBuffer::new(lookback),
            prev_zone: None,
            in_position: false,
            current_position_id: None,
        })
    }

    fn hold(&self, message: impl Into<String>) -> Signal {
        Signal::hold(self.name.clone(), self.symbol.clone(), message)
    }

    fn directional_signal(
        &mut self,
        kind: SignalKind,
        price: f64,
        strength: f64,
        message: &str,
        cooldown_tag: &'static str,
    ) -> Signal {
        let now = Utc::now();
        if self.runtime.in_cooldown(cooldown_tag, COOLDOWN, now) {
            return self.hold(format!("{} suppressed: cooldown active", message));
        }
        self.runtime.mark_emitted(cooldown_tag, now);

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

    /// Three-point pivot lows in `series`, oldest first.
    fn pivot_lows(series: &[f64]) -> Vec<(usize, f64)> {
        let mut out = Vec::new();
        for i in 1..series.len().saturating_sub(1) {
            if series[i] < series[i - 1] && series[i] < series[i + 1] {
                out.push((i, series[i]));
            }
        }
        out
    }

    fn pivot_highs(series: &[f64]) -> Vec<(usize, f64)> {
        let mut out = Vec::new();
        for i in 1..series.len().saturating_sub(1) {
            if series[i] > series[i - 1] && series[i] > series[i + 1] {
                out.push((i, series[i]));
            }
        }
        out
    }

    fn classify(&mut self, rsi: f64, prev_rsi: f64, price: f64) -> Signal {
        let zone = Zone::classify(rsi, &self.config);
        let prev_zone = self.prev_zone.unwrap_or(zone);
        let delta = rsi - prev_rsi;

        // 1. Zone entry.
        if !prev_zone.is_oversold_side() && zone.is_oversold_side() {
            let span = self.config.oversold - self.config.extreme_oversold;
            let strength = ((self.config.oversold - rsi) / span.max(1e-9)).clamp(0.0, 1.0);
            self.prev_zone = Some(zone);
            return self.directional_signal(SignalKind::Buy, price, strength, "Buy Oversold", "buy_oversold");
        }
        if !prev_zone.is_overbought_side() && zone.is_overbought_side() {
            let span = self.config.extreme_overbought - self.config.overbought;
            let strength = ((rsi - self.config.overbought) / span.max(1e-9)).clamp(0.0, 1.0);
            self.prev_zone = Some(zone);
            return self.directional_signal(SignalKind::Sell, price, strength, "Sell Overbought", "sell_overbought");
        }

        // 2. Zone exit.
        if prev_zone.is_oversold_side() && matches!(zone, Zone::NeutralLow | Zone::NeutralHigh) {
            self.prev_zone = Some(zone);
            return self.directional_signal(
                SignalKind::Buy,
                price,
                0.5,
                "Buy Oversold Exit",
                "buy_oversold_exit",
            );
        }
        if prev_zone.is_overbought_side() && matches!(zone, Zone::NeutralLow | Zone::NeutralHigh) {
            self.prev_zone = Some(zone);
            return self.directional_signal(
                SignalKind::Sell,
                price,
                0.5,
                "Sell Overbought Exit",
                "sell_overbought_exit",
            );
        }

        // 3. Extreme reversal: last 3 rsi readings show a direction flip.
        let recent: Vec<f64> = self.rsi_history.last_n(3).into_iter().copied().collect();
        if recent.len() == 3 {
            let valley = recent[0] > recent[1] && recent[1] < recent[2];
            let peak = recent[0] < recent[1] && recent[1] > recent[2];
            if zone == Zone::ExtremeOversold && valley {
                self.prev_zone = Some(zone);
                return self.directional_signal(
                    SignalKind::Buy,
                    price,
                    0.9,
                    "Extreme Reversal Buy",
                    "extreme_reversal_buy",
                );
            }
            if zone == Zone::ExtremeOverbought && peak {
                self.prev_zone = Some(zone);
                return self.directional_signal(
                    SignalKind::Sell,
                    price,
                    0.9,
                    "Extreme Reversal Sell",
                    "extreme_reversal_sell",
                );
            }
        }

        // 4. Momentum.
        if delta.abs() > self.config.min_rsi_change {
            let strength = (delta.abs() / 20.0).min(1.0);
            if delta > 0.0 && rsi > 50.0 {
                self.prev_zone = Some(zone);
                return self.directional_signal(
                    SignalKind::Buy,
                    price,
                    strength,
                    "Momentum Bullish",
                    "momentum_bullish",
                );
            }
            if delta < 0.0 && rsi < 50.0 {
                self.prev_zone = Some(zone);
                return self.directional_signal(
                    SignalKind::Sell,
                    price,
                    strength,
                    "Momentum Bearish",
                    "momentum_bearish",
                );
            }
        }

        // 5. Divergence.
        if self.config.use_divergence {
            let lookback = self.config.divergence_lookback;
            let prices: Vec<f64> = self.runtime.closes.last_n(lookback).into_iter().copied().collect();
            let rsis: Vec<f64> = self.rsi_history.last_n(lookback).into_iter().copied().collect();
            let price_lows = Self::pivot_lows(&prices);
            let rsi_lows = Self::pivot_lows(&rsis);
            if price_lows.len() >= 2 && rsi_lows.len() >= 2 {
                let (_, p1) = price_lows[price_lows.len() - 2];
                let (_, p2) = price_lows[price_lows.len() - 1];
                let (_, r1) = rsi_lows[rsi_lows.len() - 2];
                let (_, r2) = rsi_lows[rsi_lows.len() - 1];
                if p2 < p1 && r2 > r1 {
                    let strength = (1.0 - (r2 - 50.0).abs() / 50.0).max(0.1);
                    self.prev_zone = Some(zone);
                    return self.directional_signal(
                        SignalKind::Buy,
                        price,
                        strength,
                        "Divergence Bullish",
                        "divergence_bullish",
                    );
                }
            }
            let price_highs = Self::pivot_highs(&prices);
            let rsi_highs = Self::pivot_highs(&rsis);
            if price_highs.len() >= 2 && rsi_highs.len() >= 2 {
                let (_, p1) = price_highs[price_highs.len() - 2];
                let (_, p2) = price_highs[price_highs.len() - 1];
                let (_, r1) = rsi_highs[rsi_highs.len() - 2];
                let (_, r2) = rsi_highs[rsi_highs.len() - 1];
                if p2 > p1 && r2 < r1 {
                    let strength = (1.0 - (r2 - 50.0).abs() / 50.0).max(0.1);
                    self.prev_zone = Some(zone);
                    return self.directional_signal(
                        SignalKind::Sell,
                        price,
                        strength,
                        "Divergence Bearish",
                        "divergence_bearish",
                    );
                }
            }
        }

        self.prev_zone = Some(zone);
        self.hold("No RSI signal")
    }

    /// Position-close trigger in addition to SL/TP set at entry.
    pub fn should_close(&self, side: gekko_core::Side, rsi: f64) -> bool {
        let overbought = rsi >= self.config.overbought;
        let oversold = rsi <= self.config.oversold;
        match side {
            gekko_core::Side::Buy => overbought,
            gekko_core::Side::Sell => oversold,
        }
    }
}

impl Strategy for RsiStrategy {
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
        self.rsi_history = RingBuffer::new(self.config.divergence_lookback.max(10) + 5);
        self.prev_zone = None;
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
        if closes.len() < self.config.period + 1 {
            self.runtime.last_execution = start.elapsed();
            return self.hold("Insufficient data for RSI");
        }
        let rsi = kernels::rsi(&closes, self.config.period);
        let prev_rsi = self.rsi_history.latest().copied().unwrap_or(rsi);
        self.rsi_history.push(rsi);
        let price = closes[closes.len() - 1];
        let signal = self.classify(rsi, prev_rsi, price);
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
        let rsi = self.rsi_history.latest().copied().unwrap_or(50.0);
        let zone = self.prev_zone.unwrap_or(Zone::NeutralLow);
        StrategySnapshot {
            strategy_type: "rsi".to_string(),
            name: self.name.clone(),
            state: self.runtime.state,
            config: serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null),
            metrics: self.runtime.metrics.clone(),
            in_position: self.in_position,
            current_position_id: self.current_position_id.clone(),
            current_indicator_values: serde_json::to_value(RsiIndicators { rsi, zone })
                .unwrap_or(serde_json::Value::Null),
            current_zone_or_trend: format!("{:?}", zone),
            history: self
                .rsi_history
                .iter()
                .rev()
                .take(100)
                .map(|v| serde_json::json!({ "rsi": v }))
                .collect(),
        }
    }

    fn from_snapshot(symbol: &str, snapshot: &StrategySnapshot) -> TradingResult<Self> {
        let config: RsiConfig = serde_json::from_value(snapshot.config.clone())
            .map_err(|e| TradingError::Persistence(format!("rsi config: {e}")))?;
        let mut strategy = Self::new(snapshot.name.clone(), symbol, config)?;
        strategy.runtime.metrics = snapshot.metrics.clone();
        strategy.runtime.state = snapshot.state;
        strategy.in_position = snapshot.in_position;
        strategy.current_position_id = snapshot.current_position_id.clone();
        for entry in snapshot.history.iter().rev() {
            if let Some(rsi) = entry.get("rsi").and_then(|v| v.as_f64()) {
                strategy.rsi_history.push(rsi);
            }
        }
        if let Ok(indicators) = serde_json::from_value::<RsiIndicators>(snapshot.current_indicator_values.clone()) {
            strategy.prev_zone = Some(indicators.zone);
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
    fn zone_classification_matches_thresholds() {
        let cfg = RsiConfig::default();
        assert_eq!(Zone::classify(10.0, &cfg), Zone::ExtremeOversold);
        assert_eq!(Zone::classify(25.0, &cfg), Zone::Oversold);
        assert_eq!(Zone::classify(45.0, &cfg), Zone::NeutralLow);
        assert_eq!(Zone::classify(55.0, &cfg), Zone::NeutralHigh);
        assert_eq!(Zone::classify(75.0, &cfg), Zone::Overbought);
        assert_eq!(Zone::classify(90.0, &cfg), Zone::ExtremeOverbought);
    }

    #[test]
    fn rsi_oversold_entry_emits_buy() {
        let mut strat = RsiStrategy::new("rsi-14", "BTCUSDT", RsiConfig::default()).unwrap();
        strat.start();

        // Monotone-decreasing close series drives RSI into the oversold zone.
        let mut candles = Vec::new();
        let mut price = 100.0;
        for i in 0..20 {
            candles.push(candle(price, i));
            price -= 1.0;
        }
        let signal = strat.update(&candles, None);
        assert_eq!(signal.kind, SignalKind::Buy);
        assert!(signal.strength > 0.0);
        assert_eq!(strat.runtime.signal_history.len(), 1);
    }

    #[test]
    fn insufficient_data_holds() {
        let mut strat = RsiStrategy::new("rsi-14", "BTCUSDT", RsiConfig::default()).unwrap();
        strat.start();
        let signal = strat.update(&[candle(100.0, 0)], None);
        assert_eq!(signal.kind, SignalKind::Hold);
    }

    #[test]
    fn config_validation_rejects_inverted_thresholds() {
        let mut cfg = RsiConfig::default();
        cfg.oversold = 80.0;
        cfg.overbought = 20.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn snapshot_round_trip_preserves_config_and_indicators() {
        let mut strat = RsiStrategy::new("rsi-roundtrip", "BTCUSDT", RsiConfig::default()).unwrap();
        strat.start();
        let mut price = 100.0;
        for i in 0..40 {
            strat.update(&[candle(price, i)], None);
            price -= 0.5;
        }
        let before = strat.snapshot();

        let restored = RsiStrategy::from_snapshot("BTCUSDT", &before).unwrap();
        let after = restored.snapshot();

        assert_eq!(before.config, after.config);
        assert_eq!(before.current_indicator_values, after.current_indicator_values);
        assert_eq!(before.current_zone_or_trend, after.current_zone_or_trend);
        assert_eq!(before.state, after.state);
        assert_eq!(before.in_position, after.in_position);
        assert_eq!(before.current_position_id, after.current_position_id);
        assert_eq!(after.history.len(), before.history.len().min(100));
    }
}
