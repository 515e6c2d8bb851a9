//! Benchmarks for the emberlog storage engine.
//!
//! Run with: cargo bench --package emberlog
//!
//! ## Benchmark Categories
//!
//! - **Block codec**: encode/decode of full blocks
//! - **Write path**: buffered appends including threshold flushes
//! - **Query path**: cold block reads plus hot buffer merge

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use emberlog::storage::{Block, Point};
use emberlog::{Engine, EngineConfig};
use tempfile::TempDir;

/// Generate typical telemetry (regular interval, slowly varying values).
fn generate_points(count: usize) -> Vec<Point> {
    let start_ts = 1_700_000_000_000i64;
    let interval = 1_000i64;

    let mut value = 50.0;
    (0..count)
        .map(|i| {
            value += (i as f64 * 0.1).sin() * 0.1;
            Point::new(start_ts + i as i64 * interval, value)
        })
        .collect()
}

fn bench_block_codec(c: &mut Criterion) {
    let block = Block::new(1, generate_points(1000));
    let encoded = block.encode();

    c.bench_function("block_encode_1k", |b| b.iter(|| black_box(&block).encode()));
    c.bench_function("block_decode_1k", |b| {
        b.iter(|| Block::decode(black_box(&encoded)).unwrap())
    });
}

fn bench_write_path(c: &mut Criterion) {
    let points = generate_points(10_000);

    let mut group = c.benchmark_group("write");
    group.throughput(Throughput::Elements(points.len() as u64));
    group.sample_size(10);
    group.bench_function("write_10k_single_series", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let engine = Engine::open(EngineConfig::new(dir.path())).unwrap();
                (dir, engine)
            },
            |(_dir, engine)| {
                for p in &points {
                    engine.write("bench/cpu", p.time, p.value).unwrap();
                }
                engine.close().unwrap();
            },
            BatchSize::PerIteration,
        )
    });
    group.finish();
}

fn bench_query_path(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(EngineConfig::new(dir.path())).unwrap();
    let points = generate_points(10_000);
    for p in &points {
        engine.write("bench/cpu", p.time, p.value).unwrap();
    }

    let mid = points[points.len() / 2].time;

    let mut group = c.benchmark_group("query");
    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("query_full_range_10k", |b| {
        b.iter(|| {
            black_box(
                engine
                    .query("bench/cpu", i64::MIN, i64::MAX)
                    .unwrap(),
            )
        })
    });
    group.bench_function("query_half_range_10k", |b| {
        b.iter(|| black_box(engine.query("bench/cpu", mid, i64::MAX).unwrap()))
    });
    group.finish();

    engine.close().unwrap();
}

criterion_group!(
    benches,
    bench_block_codec,
    bench_write_path,
    bench_query_path
);
criterion_main!(benches);
