//! Performance benchmarks for tradecore
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tradecore::backtest::{BacktestRequest, BacktestRunner};
use tradecore::config::Config;
use tradecore::data::{synthetic_fallback, HistoricalDataProvider};
use tradecore::indicators::{atr, ema, rsi};
use tradecore::{Candle, Symbol, TradeError};

struct BenchProvider;

#[async_trait]
impl HistoricalDataProvider for BenchProvider {
    async fn fetch(&self, symbol: &Symbol, interval: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Candle>, TradeError> {
        Ok(synthetic_fallback(symbol, interval, start, end))
    }
}

fn sample_series(len: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
    let candles = synthetic_fallback(&Symbol::new("BTCUSDT"), "1h", start, start + Duration::hours(len as i64));
    (
        candles.iter().map(|c| c.high).collect(),
        candles.iter().map(|c| c.low).collect(),
        candles.iter().map(|c| c.close).collect(),
    )
}

fn benchmark_indicators(c: &mut Criterion) {
    let (high, low, close) = sample_series(1000);

    c.bench_function("ema_1000_bars", |b| b.iter(|| black_box(ema(&close, 21))));
    c.bench_function("rsi_1000_bars", |b| b.iter(|| black_box(rsi(&close, 14))));
    c.bench_function("atr_1000_bars", |b| b.iter(|| black_box(atr(&high, &low, &close, 14))));
}

fn benchmark_backtest(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
    let request = BacktestRequest {
        symbols: vec![Symbol::new("BTCUSDT")],
        interval: "1h".to_string(),
        start,
        end: start + Duration::hours(2000),
    };

    c.bench_function("backtest_2000_bars", |b| {
        b.iter(|| {
            let runner = BacktestRunner::new(BenchProvider, Config::default());
            black_box(rt.block_on(runner.run(&request)).unwrap())
        })
    });
}

criterion_group!(benches, benchmark_indicators, benchmark_backtest);
criterion_main!(benches);
