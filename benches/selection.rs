use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use shunt::{
    Operation, Recorder, SlidingWindow, Weighted, WeightedRoundRobin, WeightedSharded,
};

fn arms(n: usize) -> Vec<Weighted<usize>> {
    // Deterministic, slightly-non-uniform weights.
    (0..n)
        .map(|i| Weighted::new((i as u32 * 7 + 1) % 100 + 1, i))
        .collect()
}

fn bench_round_robin(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_robin_pick");
    for &n in &[2usize, 16usize, 256usize] {
        let mut router = WeightedRoundRobin::with_seed(arms(n), 123).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &_n| {
            b.iter(|| {
                black_box(*router.pick());
            })
        });
    }
    group.finish();
}

fn bench_sharded(c: &mut Criterion) {
    let ops = [Operation::new("lookup", 1)];
    let mut group = c.benchmark_group("sharded_select_by_key");
    for &n in &[2usize, 16usize, 256usize] {
        let router = WeightedSharded::new(&ops, 123, arms(n)).unwrap();
        let mut key = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &_n| {
            b.iter(|| {
                key = key.wrapping_add(1);
                black_box(*router.select_by_key(&key));
            })
        });
    }
    group.finish();
}

fn bench_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window");
    for &slots in &[6usize, 60usize] {
        let window = SlidingWindow::new(slots, Duration::from_secs(30)).unwrap();
        group.bench_with_input(BenchmarkId::new("record", slots), &slots, |b, &_n| {
            b.iter(|| window.record_success())
        });
        group.bench_with_input(BenchmarkId::new("summary", slots), &slots, |b, &_n| {
            b.iter(|| black_box(window.summary()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_round_robin, bench_sharded, bench_window);
criterion_main!(benches);
