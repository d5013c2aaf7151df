use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strategy_engine::indicators::kernels;

fn bench_sma(c: &mut Criterion) {
    let closes: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64) * 0.1).collect();
    c.bench_function("sma_20", |b| {
        b.iter(|| black_box(kernels::sma(black_box(&closes), black_box(20))))
    });
}

fn bench_ema(c: &mut Criterion) {
    let closes: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64) * 0.1).collect();
    c.bench_function("ema_20", |b| {
        b.iter(|| black_box(kernels::ema(black_box(&closes), black_box(20))))
    });
}

fn bench_rsi(c: &mut Criterion) {
    let closes: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0).collect();
    c.bench_function("rsi_14", |b| {
        b.iter(|| black_box(kernels::rsi(black_box(&closes), black_box(14))))
    });
}

fn bench_linreg_slope(c: &mut Criterion) {
    let values: Vec<f64> = (0..50).map(|i| i as f64).collect();
    c.bench_function("linreg_slope_3", |b| {
        b.iter(|| black_box(kernels::linreg_slope(black_box(&values), black_box(3))))
    });
}

fn bench_rsi_strategy_update(c: &mut Criterion) {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use strategy_engine::strategies::{RsiConfig, RsiStrategy};
    use strategy_engine::Strategy;

    let mut strategy = RsiStrategy::new("bench-rsi", "BTCUSDT", RsiConfig::default()).unwrap();
    strategy.start();
    let mut candles = Vec::new();
    for i in 0..30 {
        candles.push(gekko_core::Candle::new(
            i,
            dec!(100),
            dec!(101),
            dec!(99),
            Decimal::from(100 + (i % 7)),
            dec!(10),
            i,
        ));
    }
    for c in &candles {
        strategy.update(std::slice::from_ref(c), None);
    }

    c.bench_function("rsi_strategy_update", |b| {
        b.iter(|| black_box(strategy.update(std::slice::from_ref(black_box(&candles[0])), None)))
    });
}

criterion_group!(benches, bench_sma, bench_ema, bench_rsi, bench_linreg_slope, bench_rsi_strategy_update);
criterion_main!(benches);
