//! Attribution step and iterator throughput
//!
//! Measures the step itself (classification and factory binding, sequential
//! and on a worker pool) and a full pass over every consumable and blocking
//! iterator of the result.
//!
//! ```bash
//! cargo bench --bench attribution_iterators
//! ```

mod common;

use common::synthetic_scenario;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use phasemeter::attribution::{drain, StepResult};

fn bench_step_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_execution");

    for phases in [8usize, 64, 256] {
        let built = synthetic_scenario(phases, 8, 512)
            .build()
            .expect("synthetic scenario builds");
        for workers in [1usize, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("workers_{workers}"), phases),
                &workers,
                |b, &workers| b.iter(|| black_box(built.attribute(workers).unwrap())),
            );
        }
    }

    group.finish();
}

fn full_pass(result: &StepResult) -> f64 {
    let mut total = 0.0;
    for phase in result.iter() {
        for (metric, _) in phase.rules() {
            let mut iterator = phase.consumable_iterator(metric).unwrap();
            total += drain(iterator.as_mut())
                .unwrap()
                .iter()
                .map(|s| s.attributed_usage)
                .sum::<f64>();
        }
        for metric in phase.blocking_metrics() {
            total += phase.blocking_iterator(metric).unwrap().filter(|b| *b).count() as f64;
        }
    }
    total
}

fn bench_iterator_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterator_pass");

    for slices in [128i64, 1024, 8192] {
        let built = synthetic_scenario(16, 4, slices)
            .build()
            .expect("synthetic scenario builds");
        let result = built.attribute(1).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(slices), &result, |b, result| {
            b.iter(|| black_box(full_pass(result)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_step_execution, bench_iterator_pass);
criterion_main!(benches);
