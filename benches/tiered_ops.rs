//! Benchmarks for store operations against near-zero-latency tiers.
//!
//! Tier latencies are zeroed out so the numbers measure the coordination
//! overhead (policy, locks, metrics) rather than the simulated media.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tiersim::config::{BackoffConfig, TierConfig};
use tiersim::lock::TierSet;
use tiersim::map::TieredMap;
use tiersim::metrics::MetricsRecorder;
use tiersim::policy::{HotWarmCold, PlacementPolicy};
use tokio::runtime::Runtime;

fn bench_map() -> TieredMap {
    let tiers = vec![
        TierConfig::new("DRAM", 8 * 1024 * 1024 * 1024, 0, 1_000_000_000_000),
        TierConfig::new("SSD", 64 * 1024 * 1024 * 1024, 0, 1_000_000_000_000),
        TierConfig::new("HDD", 512 * 1024 * 1024 * 1024, 0, 1_000_000_000_000),
    ];
    let set = Arc::new(TierSet::new(tiers, &BackoffConfig::default()));
    let policy: Arc<dyn PlacementPolicy> = Arc::new(HotWarmCold::new(100, 20));
    TieredMap::new(set, policy, Arc::new(MetricsRecorder::new()))
}

fn bench_put(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("tiered_put");

    for size in [256usize, 4096, 65536] {
        let map = bench_map();
        let payload = vec![0u8; size];
        let mut counter = 0u64;

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                counter += 1;
                let key = format!("k{}", counter % 1024);
                rt.block_on(map.put(black_box(&key), black_box(payload.clone())))
                    .unwrap();
            })
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("tiered_get");

    for size in [256usize, 4096, 65536] {
        let map = bench_map();
        let payload = vec![0u8; size];
        rt.block_on(async {
            for i in 0..1024 {
                map.put(&format!("k{}", i), payload.clone()).await.unwrap();
            }
        });
        let mut counter = 0u64;

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                counter += 1;
                let key = format!("k{}", counter % 1024);
                rt.block_on(map.get(black_box(&key))).unwrap();
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_put, bench_get);
criterion_main!(benches);
