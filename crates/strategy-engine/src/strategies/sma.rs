//! SMA crossover / trend-following strategy.

use crate::indicators::kernels;
use crate::strategy::{Strategy, StrategyRuntime, StrategySnapshot};
use chrono::Utc;
use gekko_core::{Candle, Signal, SignalKind, StrategyMetrics, TradingError, TradingResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const COOLDOWN: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmaConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub long_period: usize,
    pub position_size_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub use_triple_ma: bool,
    pub use_slope_filter: bool,
    pub min_slope: f64,
    pub use_volume_filter: bool,
    pub volume_threshold: f64,
}

impl Default for SmaConfig {
    fn default() -> Self {
        Self {
            fast_period: 10,
            slow_period: 20,
            long_period: 50,
            position_size_pct: 0.1,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
            use_triple_ma: false,
            use_slope_filter: false,
            min_slope: 0.001,
            use_volume_filter: false,
            volume_threshold: 1.5,
        }
    }
}

impl SmaConfig {
    pub fn validate(&self) -> TradingResult<()> {
        if !(self.fast_period < self.slow_period) {
            return Err(TradingError::Configuration("fast_period must be less than slow_period".into()));
        }
        if self.use_triple_ma && !(self.slow_period < self.long_period) {
            return Err(TradingError::Configuration(
                "slow_period must be less than long_period when triple MA is enabled".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    StrongUptrend,
    WeakUptrend,
    Sideways,
    WeakDowntrend,
    StrongDowntrend,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Snapshot {
    fast: f64,
    slow: f64,
    long: f64,
    fast_slope: f64,
    spread_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SmaIndicators {
    #[serde(flatten)]
    snap: Snapshot,
    trend: Trend,
}

pub struct SmaStrategy {
    name: String,
    symbol: String,
    config: SmaConfig,
    runtime: StrategyRuntime,
    prev_snapshot: Option<Snapshot>,
    fast_history: crate::indicators::RingBuffer<f64>,
    in_position: bool,
    current_position_id: Option<String>,
    current_side: Option<gekko_core::Side>,
}

impl SmaStrategy {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, config: SmaConfig) -> TradingResult<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            symbol: symbol.into(),
            config,
            runtime: StrategyRuntime::new(200),
            prev_snapshot: None,
            fast_history: crate::indicators::RingBuffer::new(8),
            in_position: false,
            current_position_id: None,
            current_side: None,
        })
    }

    fn hold(&self, message: impl Into<String>) -> Signal {
        Signal::hold(self.name.clone(), self.symbol.clone(), message)
    }

    fn classify_trend(&self, snap: &Snapshot) -> Trend {
        let spread_pct_abs = snap.spread_pct.abs();
        if snap.fast > snap.slow {
            if spread_pct_abs > 1.0 && snap.fast_slope > self.config.min_slope {
                Trend::StrongUptrend
            } else if spread_pct_abs > 0.5 {
                Trend::WeakUptrend
            } else {
                Trend::Sideways
            }
        } else if snap.fast < snap.slow {
            if spread_pct_abs > 1.0 && snap.fast_slope < -self.config.min_slope {
                Trend::StrongDowntrend
            } else if spread_pct_abs > 0.5 {
                Trend::WeakDowntrend
            } else {
                Trend::Sideways
            }
        } else {
            Trend::Sideways
        }
    }

    fn volume_ok(&self) -> bool {
        if !self.config.use_volume_filter {
            return true;
        }
        let volumes: Vec<f64> = self.runtime.volumes.last_n(20).into_iter().copied().collect();
        if volumes.is_empty() {
            return true;
        }
        let avg: f64 = volumes.iter().sum::<f64>() / volumes.len() as f64;
        let current = *volumes.last().unwrap();
        current >= avg * self.config.volume_threshold
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
        if self.config.use_volume_filter && !self.volume_ok() {
            self.prev_snapshot = Some(snap);
            return self.hold("Volume filter blocked signal");
        }
        if self.config.use_slope_filter && snap.fast_slope.abs() < self.config.min_slope {
            self.prev_snapshot = Some(snap);
            return self.hold("Slope filter blocked signal");
        }

        let prev = self.prev_snapshot.unwrap_or(snap);
        let trend = self.classify_trend(&snap);
        let strength = (snap.spread_pct.abs() * 2.0 + snap.fast_slope.abs() * 100.0).min(1.0);

        // 1 & 2: crossovers.
        if prev.fast <= prev.slow && snap.fast > snap.slow {
            self.prev_snapshot = Some(snap);
            return self.directional(SignalKind::Buy, price, strength, "Golden Cross", "golden_cross");
        }
        if prev.fast >= prev.slow && snap.fast < snap.slow {
            self.prev_snapshot = Some(snap);
            return self.directional(SignalKind::Sell, price, strength, "Death Cross", "death_cross");
        }

        // 3 & 4: slope acceleration / deceleration.
        if snap.fast_slope > prev.fast_slope && snap.fast_slope > 2.0 * self.config.min_slope {
            self.prev_snapshot = Some(snap);
            return self.directional(
                SignalKind::Buy,
                price,
                strength,
                "Trend Acceleration",
                "trend_acceleration",
            );
        }
        if snap.fast_slope < prev.fast_slope && snap.fast_slope.abs() < self.config.min_slope {
            self.prev_snapshot = Some(snap);
            return self.directional(
                SignalKind::Sell,
                price,
                strength * 0.5,
                "Trend Deceleration",
                "trend_deceleration",
            );
        }

        // 5: pullback in a strong trend.
        if trend == Trend::StrongUptrend {
            let distance_pct = ((price - snap.fast).abs() / snap.fast.max(1e-9)) * 100.0;
            if distance_pct < 0.5 {
                self.prev_snapshot = Some(snap);
                return self.directional(SignalKind::Buy, price, 0.6, "Pullback Buy", "pullback_buy");
            }
        }
        if trend == Trend::StrongDowntrend {
            let distance_pct = ((price - snap.fast).abs() / snap.fast.max(1e-9)) * 100.0;
            if distance_pct < 0.5 {
                self.prev_snapshot = Some(snap);
                return self.directional(SignalKind::Sell, price, 0.6, "Pullback Sell", "pullback_sell");
            }
        }

        // 6: triple-MA alignment, fired exactly on the transition edge.
        if self.config.use_triple_ma {
            let prev_bull = prev.fast > prev.slow && prev.slow > prev.long;
            let cur_bull = snap.fast > snap.slow && snap.slow > snap.long;
            let prev_bear = prev.fast < prev.slow && prev.slow < prev.long;
            let cur_bear = snap.fast < snap.slow && snap.slow < snap.long;
            if cur_bull && !prev_bull {
                self.prev_snapshot = Some(snap);
                return self.directional(
                    SignalKind::Buy,
                    price,
                    (0.8 + strength * 0.2).min(1.0),
                    "Triple Alignment Bull",
                    "triple_alignment_bull",
                );
            }
            if cur_bear && !prev_bear {
                self.prev_snapshot = Some(snap);
                return self.directional(
                    SignalKind::Sell,
                    price,
                    (0.8 + strength * 0.2).min(1.0),
                    "Triple Alignment Bear",
                    "triple_alignment_bear",
                );
            }
        }

        self.prev_snapshot = Some(snap);
        self.hold("No SMA signal")
    }

    /// Support in an uptrend is the minimum of active SMAs; resistance in a
    /// downtrend is the maximum.
    pub fn dynamic_support_resistance(&self, snap: &Snapshot, trend: Trend) -> f64 {
        let values = if self.config.use_triple_ma {
            vec![snap.fast, snap.slow, snap.long]
        } else {
            vec![snap.fast, snap.slow]
        };
        match trend {
            Trend::StrongUptrend | Trend::WeakUptrend => values.iter().cloned().fold(f64::INFINITY, f64::min),
            Trend::StrongDowntrend | Trend::WeakDowntrend => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            Trend::Sideways => snap.fast,
        }
    }
}

impl Strategy for SmaStrategy {
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
        self.prev_snapshot = None;
        self.fast_history = crate::indicators::RingBuffer::new(8);
        self.in_position = false;
        self.current_position_id = None;
        self.current_side = None;
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
        let required = if self.config.use_triple_ma {
            self.config.long_period
        } else {
            self.config.slow_period
        };
        if closes.len() < required {
            self.runtime.last_execution = start.elapsed();
            return self.hold("Insufficient data for SMA");
        }

        let fast = kernels::sma(&closes, self.config.fast_period);
        let slow = kernels::sma(&closes, self.config.slow_period);
        let long = if self.config.use_triple_ma {
            kernels::sma(&closes, self.config.long_period)
        } else {
            0.0
        };
        self.fast_history.push(fast);
        let fast_series: Vec<f64> = self.fast_history.iter().copied().collect();
        let fast_slope = kernels::linreg_slope(&fast_series, 3.min(fast_series.len().max(1)));
        let spread = fast - slow;
        let spread_pct = if slow != 0.0 { spread / slow * 100.0 } else { 0.0 };

        let snap = Snapshot {
            fast,
            slow,
            long,
            fast_slope,
            spread_pct,
        };
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
        self.current_side = None;
    }

    fn on_position_opened(&mut self, position: &gekko_core::Position) {
        self.in_position = true;
        self.current_position_id = Some(position.id.clone());
        self.current_side = Some(position.side);
    }

    fn snapshot(&self) -> StrategySnapshot {
        let snap = self.prev_snapshot.unwrap_or(Snapshot {
            fast: 0.0,
            slow: 0.0,
            long: 0.0,
            fast_slope: 0.0,
            spread_pct: 0.0,
        });
        let trend = self.classify_trend(&snap);
        StrategySnapshot {
            strategy_type: "sma".to_string(),
            name: self.name.clone(),
            state: self.runtime.state,
            config: serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null),
            metrics: self.runtime.metrics.clone(),
            in_position: self.in_position,
            current_position_id: self.current_position_id.clone(),
            current_indicator_values: serde_json::to_value(SmaIndicators { snap, trend })
                .unwrap_or(serde_json::Value::Null),
            current_zone_or_trend: format!("{:?}", trend),
            history: self
                .fast_history
                .iter()
                .rev()
                .take(100)
                .map(|v| serde_json::json!({ "fast": v }))
                .collect(),
        }
    }

    fn from_snapshot(symbol: &str, snapshot: &StrategySnapshot) -> TradingResult<Self> {
        let config: SmaConfig = serde_json::from_value(snapshot.config.clone())
            .map_err(|e| TradingError::Persistence(format!("sma config: {e}")))?;
        let mut strategy = Self::new(snapshot.name.clone(), symbol, config)?;
        strategy.runtime.metrics = snapshot.metrics.clone();
        strategy.runtime.state = snapshot.state;
        strategy.in_position = snapshot.in_position;
        strategy.current_position_id = snapshot.current_position_id.clone();
        for entry in snapshot.history.iter().rev() {
            if let Some(fast) = entry.get("fast").and_then(|v| v.as_f64()) {
                strategy.fast_history.push(fast);
            }
        }
        if let Ok(indicators) = serde_json::from_value::<SmaIndicators>(snapshot.current_indicator_values.clone()) {
            strategy.prev_snapshot = Some(indicators.snap);
        }
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gekko_core::Candle;

    fn candle(close: f64, volume: f64, t: i64) -> Candle {
        Candle::new(
            t,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::try_from(close).unwrap(),
            Decimal::try_from(volume).unwrap(),
            t,
        )
    }

    #[test]
    fn golden_cross_emits_buy() {
        let cfg = SmaConfig {
            fast_period: 3,
            slow_period: 5,
            ..SmaConfig::default()
        };
        let mut strat = SmaStrategy::new("sma-3-5", "BTCUSDT", cfg).unwrap();
        strat.start();

        let closes = [10.0, 10.0, 10.0, 10.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| candle(c, 1.0, i as i64))
            .collect();

        let mut last_signal = strat.hold("init");
        for i in 0..candles.len() {
            last_signal = strat.update(&candles[i..=i], None);
        }
        assert_eq!(last_signal.kind, SignalKind::Buy);
    }

    #[test]
    fn insufficient_data_holds() {
        let mut strat = SmaStrategy::new("sma", "BTCUSDT", SmaConfig::default()).unwrap();
        strat.start();
        let signal = strat.update(&[candle(10.0, 1.0, 0)], None);
        assert_eq!(signal.kind, SignalKind::Hold);
    }

    #[test]
    fn snapshot_round_trip_preserves_config_and_indicators() {
        let mut strat = SmaStrategy::new("sma-roundtrip", "BTCUSDT", SmaConfig::default()).unwrap();
        strat.start();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.3).collect();
        let candles: Vec<Candle> = closes.iter().enumerate().map(|(i, &c)| candle(c, 1.0, i as i64)).collect();
        for i in 0..candles.len() {
            strat.update(&candles[i..=i], None);
        }
        let before = strat.snapshot();

        let restored = SmaStrategy::from_snapshot("BTCUSDT", &before).unwrap();
        let after = restored.snapshot();

        assert_eq!(before.config, after.config);
        assert_eq!(before.current_indicator_values, after.current_indicator_values);
        assert_eq!(before.current_zone_or_trend, after.current_zone_or_trend);
        assert_eq!(before.state, after.state);
        assert_eq!(after.history.len(), before.history.len().min(100));
    }

    #[test]
    fn config_validation_rejects_fast_gte_slow() {
        let cfg = SmaConfig {
            fast_period: 20,
            slow_period: 10,
            ..SmaConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
