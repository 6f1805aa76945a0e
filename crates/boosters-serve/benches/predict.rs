//! Prediction benchmarks for boosters-serve.
//!
//! Benchmarks cover:
//! - Pipeline prediction at different batch sizes
//! - Forest margins, sequential vs parallel
//! - The full request path (CSV decode, guard, predict)
//!
//! ```bash
//! cargo bench -p boosters-serve
//! ```

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use boosters_serve::testing::{self, TARGET};
use boosters_serve::utils::Parallelism;
use boosters_serve::{InferenceService, Predictor, UploadedBlob};

// =============================================================================
// Benchmark Groups
// =============================================================================

fn bench_batch_sizes(c: &mut Criterion) {
    let pipeline = testing::fitted_pipeline();
    let mut group = c.benchmark_group("pipeline/batch_size");

    for batch_size in [1usize, 100, 1_000, 10_000] {
        let table = testing::synthetic_multisim(batch_size, 42).split_column(TARGET).0;
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &table, |b, table| {
            b.iter(|| black_box(pipeline.predict(black_box(table))))
        });
    }
    group.finish();
}

fn bench_forest_parallelism(c: &mut Criterion) {
    let pipeline = testing::fitted_pipeline();
    let table = testing::synthetic_multisim(10_000, 7).split_column(TARGET).0;
    let features = pipeline
        .transform()
        .transform(&table, Parallelism::Sequential)
        .expect("synthetic table matches the contract");

    let mut group = c.benchmark_group("forest/parallelism");
    group.throughput(Throughput::Elements(table.n_rows() as u64));
    for (name, parallelism) in [("sequential", Parallelism::Sequential), ("parallel", Parallelism::Parallel)] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(pipeline.forest().predict(black_box(features.view()), parallelism)))
        });
    }
    group.finish();
}

fn bench_request(c: &mut Criterion) {
    let service = InferenceService::new(Arc::new(testing::fitted_pipeline()));
    let csv = testing::to_csv(&testing::synthetic_multisim(1_000, 3).split_column(TARGET).0);

    let mut group = c.benchmark_group("service");
    group.throughput(Throughput::Bytes(csv.len() as u64));
    group.bench_function("csv_1000_rows", |b| {
        b.iter(|| black_box(service.handle(UploadedBlob::new(csv.clone(), "batch.csv"))))
    });
    group.finish();
}

criterion_group!(benches, bench_batch_sizes, bench_forest_parallelism, bench_request);
criterion_main!(benches);
