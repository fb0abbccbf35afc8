//! P99 selection benchmarks
//!
//! Quickselect over one minute of samples versus a full sort.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rpcwatch::minute_stats::{select_descending, LatencySamples};
use std::time::Duration;

fn latencies(n: usize) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    (0..n).map(|_| rng.gen_range(1..2_000)).collect()
}

fn bench_select_vs_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("p99_selection");
    group.measurement_time(Duration::from_secs(5));

    for size in [100usize, 1_000, 10_000, 100_000] {
        let data = latencies(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("quickselect", size), &data, |b, data| {
            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                let mut work = data.clone();
                black_box(select_descending(&mut work, size / 100, &mut rng))
            });
        });

        group.bench_with_input(BenchmarkId::new("full_sort", size), &data, |b, data| {
            b.iter(|| {
                let mut work = data.clone();
                work.sort_unstable_by(|a, b| b.cmp(a));
                black_box(work[size / 100])
            });
        });
    }

    group.finish();
}

fn bench_drain_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("samples_drain");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1_000));

    let data = latencies(1_000);
    group.bench_function("add_p99_rate_reset", |b| {
        let mut samples = LatencySamples::with_capacity(1_000);
        b.iter(|| {
            for (i, &v) in data.iter().enumerate() {
                samples.add(v, i % 50 != 0);
            }
            let p99 = samples.p99();
            let rate = samples.success_rate();
            black_box((p99, rate))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_select_vs_sort, bench_drain_cycle);
criterion_main!(benches);
