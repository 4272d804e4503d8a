//! Benchmarks for the per-line ingestion hot path
//!
//! Covers:
//! - Decoding strict JSON frames and literal-syntax frames
//! - Deep-merging timing updates into a populated race state
//! - Building the sorted leaderboard projection
//!
//! Platform: Cross-platform (synthetic frames, CI-safe)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use paddock::{LineDecoder, StateAggregator};
use serde_json::{Value, json};
use std::hint::black_box;

fn timing_payload(cars: usize, lap: usize) -> Value {
    let lines: serde_json::Map<String, Value> = (1..=cars)
        .map(|car| {
            let entry = json!({
                "Position": ((car + lap) % cars + 1).to_string(),
                "GapToLeader": format!("+{}.{:03}", car, lap % 1000),
                "LastLapTime": {"Value": format!("1:3{}.{:03}", car % 10, lap % 1000)},
                "Sectors": {"0": {"Value": "28.114"}, "1": {"Value": "31.502"}, "2": {"Value": "24.980"}},
            });
            (car.to_string(), entry)
        })
        .collect();
    json!({ "Lines": lines })
}

fn json_frame(cars: usize) -> String {
    json!({"M": [{"M": "feed", "A": ["TimingData", timing_payload(cars, 7), "2024-03-02T15:04:05.123Z"]}]})
        .to_string()
}

fn literal_frame(cars: usize) -> String {
    json_frame(cars).replace('"', "'")
}

fn bench_decode(c: &mut Criterion) {
    let decoder = LineDecoder::default();
    let mut group = c.benchmark_group("decode");

    for cars in [1, 20] {
        let strict = json_frame(cars);
        group.throughput(Throughput::Bytes(strict.len() as u64));
        group.bench_with_input(BenchmarkId::new("json", cars), &strict, |b, line| {
            b.iter(|| black_box(decoder.decode_all(black_box(line))))
        });

        let literal = literal_frame(cars);
        group.throughput(Throughput::Bytes(literal.len() as u64));
        group.bench_with_input(BenchmarkId::new("literal", cars), &literal, |b, line| {
            b.iter(|| black_box(decoder.decode_all(black_box(line))))
        });
    }

    group.bench_function("garbage", |b| {
        b.iter(|| black_box(decoder.decode_all(black_box("<html>502 Bad Gateway</html>"))))
    });

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let aggregator = StateAggregator::new();
    aggregator.update("TimingData", timing_payload(20, 0));

    let mut group = c.benchmark_group("merge");
    group.bench_function("timing_single_car", |b| {
        let mut lap = 0usize;
        b.iter(|| {
            lap += 1;
            let patch = json!({"Lines": {"44": {"LastLapTime": {"Value": lap.to_string()}}}});
            black_box(aggregator.update("TimingData", black_box(patch)))
        })
    });
    group.bench_function("timing_full_field", |b| {
        let payload = timing_payload(20, 3);
        b.iter(|| black_box(aggregator.update("TimingData", black_box(payload.clone()))))
    });
    group.finish();
}

fn bench_leaderboard(c: &mut Criterion) {
    let aggregator = StateAggregator::new();
    aggregator.update("TimingData", timing_payload(20, 5));

    c.bench_function("leaderboard_20_cars", |b| b.iter(|| black_box(aggregator.leaderboard())));
}

criterion_group!(benches, bench_decode, bench_merge, bench_leaderboard);
criterion_main!(benches);
