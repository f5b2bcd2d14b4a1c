use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use klineforge::config::IndicatorSettings;
use klineforge::normalize::MinMaxScaler;
use klineforge::{compute_indicators, prepare_features, Interval, Kline, KlineSeries, RunMode, Settings};

/// Sine wave plus a slow drift, hourly from 2024-01-01
fn generate_series(count: usize) -> KlineSeries {
    let hour = Interval::Hour1.duration_ms();
    let klines = (0..count)
        .map(|i| {
            let close = 30_000.0 + (i as f64 / 24.0).sin() * 400.0 + i as f64 * 0.5;
            let open_time = 1_704_067_200_000 + i as i64 * hour;
            Kline {
                open_time,
                open: close - 5.0,
                high: close + 20.0 + (i % 7) as f64,
                low: close - 20.0 - (i % 5) as f64,
                close,
                volume: 50.0 + (i % 11) as f64 * 3.0,
                close_time: open_time + hour - 1,
                quote_asset_volume: close * 50.0,
                number_of_trades: 1_000 + (i % 17) as u64,
                taker_buy_base_asset_volume: 25.0,
                taker_buy_quote_asset_volume: close * 25.0,
                ignore: 0.0,
            }
        })
        .collect();
    KlineSeries::new("BTCUSDC", Interval::Hour1, klines)
}

fn bench_indicators(c: &mut Criterion) {
    let settings = IndicatorSettings::default();
    let mut group = c.benchmark_group("compute_indicators");
    for rows in [500, 5_000] {
        let series = generate_series(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &series, |b, series| {
            b.iter(|| compute_indicators(black_box(series), &settings).unwrap());
        });
    }
    group.finish();
}

fn bench_scaler(c: &mut Criterion) {
    let settings = Settings::default();
    let prepared = prepare_features(&generate_series(2_000), &settings, RunMode::Inference).unwrap();
    let scaler = MinMaxScaler::fit(&prepared, None).unwrap();

    c.bench_function("minmax_transform_2k", |b| {
        b.iter(|| scaler.transform(black_box(&prepared)).unwrap());
    });
}

criterion_group!(benches, bench_indicators, bench_scaler);
criterion_main!(benches);
