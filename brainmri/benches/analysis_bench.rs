//! Benchmarks for dataset analysis and augmentation.

use brainmri::charts::histogram_bins;
use brainmri::components::analyze::{BalanceLevel, ColumnStats};
use brainmri::components::augmentation::AugmentationPipeline;
use brainmri::config::schema::AugmentationParams;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn analysis_benchmark(c: &mut Criterion) {
    let values: Vec<f64> = (0..10_000).map(|i| f64::from((i * 37) % 1_000)).collect();

    c.bench_function("column_stats", |b| {
        b.iter(|| ColumnStats::from_values(black_box(&values)))
    });

    c.bench_function("histogram_bins", |b| {
        b.iter(|| histogram_bins(black_box(&values), 20))
    });

    c.bench_function("balance_classify", |b| {
        b.iter(|| BalanceLevel::classify(black_box(155), black_box(98)))
    });
}

fn augmentation_benchmark(c: &mut Criterion) {
    let pipeline = AugmentationPipeline::from_params(&AugmentationParams::default());
    let image: Vec<f32> = (0..3 * 64 * 64).map(|i| (i % 256) as f32).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    c.bench_function("augment_64x64", |b| {
        b.iter(|| pipeline.apply(black_box(&image), [64, 64], &mut rng))
    });
}

criterion_group!(benches, analysis_benchmark, augmentation_benchmark);
criterion_main!(benches);
