//! Performance benchmarks for the log simulator backend
//!
//! Run with: cargo bench

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::Map;

use logsim_backend::cron::CronExpression;
use logsim_backend::generator::SyntheticLogGenerator;

const EXPRESSIONS: [(&str, &str); 5] = [
    ("every_minute", "* * * * *"),
    ("nightly", "0 2 * * *"),
    ("weekdays", "0 9 * * MON-FRI"),
    ("stepped_list", "*/7 1,5,9-17 * * *"),
    ("leap_day", "0 0 29 2 *"),
];

/// Benchmark cron parsing
fn bench_cron_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("cron_parse");

    for (name, expr) in EXPRESSIONS.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), expr, |b, expr| {
            b.iter(|| CronExpression::parse(black_box(expr)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark next-fire computation, including the sparse leap-day case
fn bench_cron_next_after(c: &mut Criterion) {
    let mut group = c.benchmark_group("cron_next_after");
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 17, 42).unwrap();

    for (name, expr) in EXPRESSIONS.iter() {
        let cron = CronExpression::parse(expr).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &cron, |b, cron| {
            b.iter(|| cron.next_after(black_box(start)));
        });
    }

    group.finish();
}

/// Benchmark one-shot synthetic log generation
fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    let params = Map::new();

    for count in [10usize, 100, 1000].iter() {
        let generator = SyntheticLogGenerator::new(10_000);
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("batch", count), count, |b, count| {
            b.iter(|| generator.generate(black_box(*count), Some("bench"), &params));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cron_parse, bench_cron_next_after, bench_generate);
criterion_main!(benches);
