//! Performance benchmarks for the network speed tester
//!
//! Covers the hot paths that run per packet or per chunk: the jitter/loss
//! analysis, the download chunk stream and probe packet encoding.

use clap::Parser;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::StreamExt;
use network_speed_tester::{
    cli::Cli,
    config::ConfigParser,
    models::{Config, ProbePacket},
    server::stream::{ChunkStream, MIB},
    stats,
};

/// RTT samples with a little deterministic spread
fn sample_rtts(count: usize) -> Vec<f64> {
    (0..count).map(|i| 20.0 + (i % 7) as f64 * 0.75 - (i % 3) as f64 * 0.5).collect()
}

fn benchmark_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis");

    for size in [10usize, 100, 1000].iter() {
        let samples = sample_rtts(*size);
        group.bench_with_input(BenchmarkId::new("analyze", size), size, |b, &size| {
            b.iter(|| stats::analyze(black_box(&samples), black_box(size as u32 + 3)))
        });
        group.bench_with_input(BenchmarkId::new("jitter", size), size, |b, _| {
            b.iter(|| stats::jitter(black_box(&samples)))
        });
    }

    group.finish();
}

fn benchmark_chunk_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_stream");
    group.throughput(Throughput::Bytes(16 * MIB));

    for chunk_size in [4096usize, 64 * 1024, 1024 * 1024].iter() {
        group.bench_with_input(BenchmarkId::new("drain_16mb", chunk_size), chunk_size, |b, &chunk_size| {
            b.iter(|| {
                futures::executor::block_on(
                    ChunkStream::megabytes(16, chunk_size)
                        .fold(0u64, |acc, chunk| async move { acc + chunk.map_or(0, |c| c.len() as u64) }),
                )
            })
        });
    }

    group.finish();
}

fn benchmark_probe_packets(c: &mut Criterion) {
    let mut group = c.benchmark_group("probe_packet");
    let packet = ProbePacket::new(42, 1234.567);
    let encoded = packet.encode().unwrap();

    group.bench_function("encode", |b| b.iter(|| black_box(&packet).encode().unwrap()));
    group.bench_function("decode", |b| b.iter(|| ProbePacket::decode(black_box(&encoded)).unwrap()));

    group.finish();
}

fn benchmark_config(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");

    group.bench_function("parse_cli_args", |b| {
        b.iter(|| Cli::parse_from(black_box(["nst", "run", "--packets", "50", "--interval-ms", "20"])))
    });

    group.bench_function("apply_overrides_and_validate", |b| {
        let cli = Cli::parse_from(["nst", "run", "--server", "http://127.0.0.1:8080", "--no-save"]);
        let parser = ConfigParser::new(cli);
        b.iter(|| {
            let mut config = Config::default();
            parser.apply_cli_overrides(&mut config);
            config.validate().unwrap();
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_analysis,
    benchmark_chunk_stream,
    benchmark_probe_packets,
    benchmark_config
);
criterion_main!(benches);
