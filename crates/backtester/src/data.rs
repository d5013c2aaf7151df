//! Historical candle loading: CSV import or paginated API pull.

use crate::error::{BacktestError, BacktestResult};
use exchange_connectors::ExchangeAdapter;
use gekko_core::Candle;
use rust_decimal::Decimal;
use std::path::Path;

/// Reads `(open_time_ms, open, high, low, close, volume, close_time_ms)`
/// rows with no header row, then sorts the result by open-time.
pub fn load_csv(path: impl AsRef<Path>) -> BacktestResult<Vec<Candle>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path.as_ref())
        .map_err(|e| BacktestError::DataLoad(e.to_string()))?;

    let mut candles = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| BacktestError::DataLoad(e.to_string()))?;
        if record.len() < 7 {
            return Err(BacktestError::DataLoad(format!(
                "expected 7 columns, found {}",
                record.len()
            )));
        }
        let field = |i: usize| record.get(i).unwrap();
        let parse_i64 = |s: &str| s.parse::<i64>().map_err(|e| BacktestError::DataLoad(e.to_string()));
        let parse_dec = |s: &str| s.parse::<Decimal>().map_err(|e| BacktestError::DataLoad(e.to_string()));

        candles.push(Candle::new(
            parse_i64(field(0))?,
            parse_dec(field(1))?,
            parse_dec(field(2))?,
            parse_dec(field(3))?,
            parse_dec(field(4))?,
            parse_dec(field(5))?,
            parse_i64(field(6))?,
        ));
    }

    if candles.is_empty() {
        return Err(BacktestError::EmptyDataset);
    }
    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}

/// Pulls candles from an exchange adapter in pages of 1000 until `end_ms`
/// is reached or a page returns fewer than the page size (end of history).
pub async fn fetch_paginated(
    adapter: &dyn ExchangeAdapter,
    symbol: &str,
    interval: &str,
    start_ms: i64,
    end_ms: i64,
) -> BacktestResult<Vec<Candle>> {
    const PAGE_SIZE: u32 = 1000;
    let mut candles = Vec::new();
    let mut cursor = start_ms;

    loop {
        let page = adapter
            .get_klines(symbol, interval, PAGE_SIZE, Some(cursor), Some(end_ms))
            .await?;
        if page.is_empty() {
            break;
        }
        let page_len = page.len();
        let last_open_time = page.last().map(|c| c.open_time).unwrap_or(cursor);
        candles.extend(page);

        if page_len < PAGE_SIZE as usize || last_open_time >= end_ms {
            break;
        }
        cursor = last_open_time + 1;
    }

    if candles.is_empty() {
        return Err(BacktestError::EmptyDataset);
    }
    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}
