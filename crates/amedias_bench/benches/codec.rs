//! State codec benchmarks.

use amedias_bench::{raw_size, sample_state};
use amedias_codec::{fingerprint, Capabilities, StateCodec};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const SIZES: [usize; 4] = [0, 10, 100, 500];

/// Benchmark encoding with and without compression.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let gzip = StateCodec::new(Capabilities::probe());
    let plain = StateCodec::new(Capabilities::none());

    for size in SIZES.iter() {
        let state = sample_state(*size);
        group.throughput(Throughput::Bytes(raw_size(&state) as u64));

        group.bench_with_input(BenchmarkId::new("gzip", size), &state, |b, state| {
            b.iter(|| black_box(gzip.encode(black_box(state)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("plain", size), &state, |b, state| {
            b.iter(|| black_box(plain.encode(black_box(state)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark decoding link text back into a state.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let codec = StateCodec::new(Capabilities::probe());

    for size in SIZES.iter() {
        let state = sample_state(*size);
        let text = codec.encode(&state).unwrap().text;
        group.throughput(Throughput::Bytes(text.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| black_box(codec.decode(black_box(text)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark fingerprinting.
fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in SIZES.iter() {
        let state = sample_state(*size);
        group.throughput(Throughput::Bytes(raw_size(&state) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &state, |b, state| {
            b.iter(|| black_box(fingerprint(black_box(state))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_fingerprint);
criterion_main!(benches);
