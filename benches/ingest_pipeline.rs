//! Ingest pipeline throughput
//!
//! Synthetic logs through reader, parser and compute stages at a few block
//! sizes.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rpcwatch::config::AnalyzerConfig;
use rpcwatch::pipeline;
use rpcwatch::record::CsvRecordDecoder;
use std::fmt::Write;
use std::io::Cursor;
use std::time::Duration;

const BASE_MS: u64 = 1_592_841_600_000;

/// `minutes` minutes of traffic across a fan-out of 20 services
fn synthetic_log(minutes: u64, calls_per_minute: u64) -> Vec<u8> {
    let mut log = String::new();
    for minute in 0..minutes {
        for i in 0..calls_per_minute {
            let caller = i % 20;
            let responder = (i * 7 + 3) % 20;
            let ts = BASE_MS + minute * 60_000 + (i * 60_000 / calls_per_minute);
            let _ = writeln!(
                log,
                "svc_{},10.0.{}.{},svc_{},10.0.{}.{},{},{},{}",
                caller,
                caller,
                i % 4 + 1,
                responder,
                responder,
                i % 3 + 1,
                i % 97 != 0,
                (i * 13) % 500,
                ts
            );
        }
    }
    log.into_bytes()
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    let log = synthetic_log(10, 20_000);
    group.throughput(Throughput::Bytes(log.len() as u64));

    for block_size in [4usize << 10, 64 << 10, 256 << 10] {
        let config = AnalyzerConfig {
            block_size,
            ..AnalyzerConfig::default()
        };
        group.bench_with_input(BenchmarkId::new("block_size", block_size), &config, |b, config| {
            b.iter(|| {
                let output = pipeline::ingest(Cursor::new(log.as_slice()), CsvRecordDecoder, config);
                black_box(output.map(|o| o.stats.records).unwrap_or(0))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ingest);
criterion_main!(benches);
