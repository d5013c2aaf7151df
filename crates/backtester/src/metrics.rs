//! Equity/drawdown curves, trade log, and summary performance metrics.

use gekko_core::Side;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: i64,
    pub equity: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DrawdownPoint {
    pub ts: i64,
    pub drawdown: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub ts: i64,
    #[serde(rename = "type")]
    pub side: Side,
    pub price: Decimal,
    pub qty: Decimal,
    pub pnl: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub total_return_pct: Decimal,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: Decimal,
    pub max_drawdown_pct: Decimal,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResults {
    pub summary: BacktestSummary,
    pub equity_curve: Vec<EquityPoint>,
    pub drawdown_curve: Vec<DrawdownPoint>,
    pub trades: Vec<BacktestTrade>,
}

impl BacktestResults {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Accumulates equity/drawdown points and period returns as the replay loop
/// advances, then folds them into a [`BacktestResults`] at the end.
pub struct PerformanceTracker {
    initial_balance: Decimal,
    peak_equity: Decimal,
    max_drawdown_pct: Decimal,
    equity_curve: Vec<EquityPoint>,
    drawdown_curve: Vec<DrawdownPoint>,
    period_returns: Vec<f64>,
    prev_equity: Option<Decimal>,
    trades: Vec<BacktestTrade>,
    wins: usize,
    losses: usize,
    round_trips: usize,
}

impl PerformanceTracker {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            peak_equity: initial_balance,
            max_drawdown_pct: Decimal::ZERO,
            equity_curve: Vec::new(),
            drawdown_curve: Vec::new(),
            period_returns: Vec::new(),
            prev_equity: None,
            trades: Vec::new(),
            wins: 0,
            losses: 0,
            round_trips: 0,
        }
    }

    pub fn record_equity(&mut self, ts: i64, equity: Decimal) {
        self.equity_curve.push(EquityPoint { ts, equity });

        self.peak_equity = self.peak_equity.max(equity);
        let drawdown_pct = if self.peak_equity > Decimal::ZERO {
            (self.peak_equity - equity) / self.peak_equity * Decimal::from(100)
        } else {
            Decimal::ZERO
        };
        self.max_drawdown_pct = self.max_drawdown_pct.max(drawdown_pct);
        self.drawdown_curve.push(DrawdownPoint { ts, drawdown: drawdown_pct });

        if let Some(prev) = self.prev_equity {
            if prev > Decimal::ZERO {
                let period_return = ((equity - prev) / prev).to_f64().unwrap_or(0.0);
                self.period_returns.push(period_return);
            }
        }
        self.prev_equity = Some(equity);
    }

    /// Entry (BUY) fills are logged but don't count toward win rate — only a
    /// closed round trip (SELL) realizes a PnL that can win or lose.
    pub fn record_trade(&mut self, trade: BacktestTrade) {
        if trade.side == Side::Sell {
            self.round_trips += 1;
            if trade.pnl > Decimal::ZERO {
                self.wins += 1;
            } else if trade.pnl < Decimal::ZERO {
                self.losses += 1;
            }
        }
        self.trades.push(trade);
    }

    /// Annualized Sharpe ratio: `mean(excess_return) / stddev(excess_return) * sqrt(365)`,
    /// where `excess_return = period_return - risk_free_rate/365`. Zero stddev
    /// (e.g. a single period, or a perfectly flat equity curve) yields `0.0`.
    fn sharpe_ratio(&self, risk_free_rate: Decimal) -> f64 {
        if self.period_returns.len() < 2 {
            return 0.0;
        }
        let daily_rf = risk_free_rate.to_f64().unwrap_or(0.0) / 365.0;
        let excess: Vec<f64> = self.period_returns.iter().map(|r| r - daily_rf).collect();
        let mean = excess.iter().sum::<f64>() / excess.len() as f64;
        let std_dev = excess.std_dev();
        if std_dev == 0.0 || std_dev.is_nan() {
            return 0.0;
        }
        (mean / std_dev) * 365.0_f64.sqrt()
    }

    pub fn finish(self, final_balance: Decimal, risk_free_rate: Decimal) -> BacktestResults {
        let total_trades = self.round_trips;
        let win_rate = if total_trades > 0 {
            Decimal::from(self.wins) / Decimal::from(total_trades) * Decimal::from(100)
        } else {
            Decimal::ZERO
        };
        let total_return_pct = if self.initial_balance > Decimal::ZERO {
            (final_balance - self.initial_balance) / self.initial_balance * Decimal::from(100)
        } else {
            Decimal::ZERO
        };
        let sharpe_ratio = self.sharpe_ratio(risk_free_rate);

        BacktestResults {
            summary: BacktestSummary {
                initial_balance: self.initial_balance,
                final_balance,
                total_return_pct,
                total_trades,
                wins: self.wins,
                losses: self.losses,
                win_rate,
                max_drawdown_pct: self.max_drawdown_pct,
                sharpe_ratio,
            },
            equity_curve: self.equity_curve,
            drawdown_curve: self.drawdown_curve,
            trades: self.trades,
        }
    }
}
