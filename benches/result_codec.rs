//! Result-set encoding and decoding throughput
//!
//! ```bash
//! cargo bench --bench result_codec
//! ```

mod common;

use common::synthetic_scenario;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use phasemeter::attribution::persist::{decode_envelope, encode_envelope};
use phasemeter::attribution::StepResult;

fn bench_result_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_codec");

    for phases in [16usize, 128, 1024] {
        let built = synthetic_scenario(phases, 16, 64)
            .build()
            .expect("synthetic scenario builds");
        let result = built.attribute(1).unwrap();
        let bytes = result.to_bytes().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", phases), &result, |b, result| {
            b.iter(|| black_box(result.to_bytes().unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decode", phases), &bytes, |b, bytes| {
            let context = built.context();
            b.iter(|| black_box(StepResult::from_bytes(bytes, &context, &built.providers).unwrap()))
        });
    }

    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let payload = vec![0x5au8; 1 << 20];
    let file = encode_envelope(&payload);
    let mut group = c.benchmark_group("envelope");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("encode_1mib", |b| b.iter(|| black_box(encode_envelope(&payload))));
    group.bench_function("decode_1mib", |b| b.iter(|| black_box(decode_envelope(&file).unwrap().len())));
    group.finish();
}

criterion_group!(benches, bench_result_codec, bench_envelope);
criterion_main!(benches);
