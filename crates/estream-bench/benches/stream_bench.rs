//! Stream throughput benchmarks.
//!
//! Compares the three buffering strategies over a memory backend and
//! measures line reading.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use estream_bench::line_payload;
use estream_core::{BufMode, MemoryBackend, MemoryOptions, Stream, StreamRegistry, Whence};

fn bench_write_strategies(c: &mut Criterion) {
    let registry = StreamRegistry::new();
    let payload = line_payload(1024, 64);
    let mut group = c.benchmark_group("write");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    for mode in [BufMode::Full, BufMode::Line, BufMode::None] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{mode:?}")), &mode, |b, &mode| {
            b.iter(|| {
                let stream = Stream::builder()
                    .buffering(mode)
                    .open(&registry, MemoryBackend::new(MemoryOptions::default()), "w")
                    .expect("open");
                for chunk in payload.chunks(100) {
                    stream.write_all(chunk).expect("write");
                }
                criterion::black_box(stream.close_snatch().expect("snatch"));
            });
        });
    }
    group.finish();
}

fn bench_read_chunks(c: &mut Criterion) {
    let registry = StreamRegistry::new();
    let payload = line_payload(1024, 64);
    let stream = Stream::open_memory_init(&registry, None, "r", &payload).expect("open");
    let mut chunk = [0u8; 100];
    let mut group = c.benchmark_group("read");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("chunks_100", |b| {
        b.iter(|| {
            stream.seek(0, Whence::Set).expect("seek");
            while stream.read(&mut chunk).expect("read") > 0 {
                criterion::black_box(&chunk);
            }
        });
    });
    group.finish();
}

fn bench_getline(c: &mut Criterion) {
    let registry = StreamRegistry::new();
    let payload = line_payload(1024, 64);
    let stream = Stream::open_memory_init(&registry, None, "r", &payload).expect("open");
    let mut line = Vec::new();
    c.bench_function("getline_1024x64", |b| {
        b.iter(|| {
            stream.seek(0, Whence::Set).expect("seek");
            while stream.getline(&mut line).expect("getline") > 0 {
                criterion::black_box(&line);
            }
        });
    });
}

criterion_group!(benches, bench_write_strategies, bench_read_chunks, bench_getline);
criterion_main!(benches);
