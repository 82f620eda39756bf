use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use industrial_ts::data::SeriesDataset;
use industrial_ts::ensemble::{combine, stack_branches};
use industrial_ts::features::{build_generator, FeatureGenerator};
use ndarray::{Array1, Array2, Array3};
use rand::prelude::*;

fn create_series(n_samples: usize, n_channels: usize, length: usize) -> SeriesDataset {
    let mut rng = rand::thread_rng();
    let features = Array3::from_shape_fn((n_samples, n_channels, length), |(i, _, t)| {
        (t as f64 * (0.1 + (i % 3) as f64 * 0.2)).sin() + rng.gen::<f64>() * 0.1
    });
    let target = Array1::from_iter((0..n_samples).map(|i| (i % 3) as f64));
    SeriesDataset::new(features, target).unwrap()
}

fn bench_generators(c: &mut Criterion) {
    let mut group = c.benchmark_group("generators");
    group.sample_size(10);

    let data = create_series(100, 2, 128);
    for name in ["quantile", "window_quantile", "wavelet", "spectral", "topological"] {
        group.bench_with_input(BenchmarkId::new("fit_transform", name), &data, |b, data| {
            b.iter(|| {
                let mut generator = build_generator(name, None).unwrap();
                generator.fit_transform(black_box(data)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_series_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("quantile_length");

    for length in [64, 256, 1024].iter() {
        let data = create_series(200, 1, *length);
        let mut generator = build_generator("quantile", None).unwrap();
        generator.fit(&data).unwrap();
        group.bench_with_input(BenchmarkId::new("transform", length), &data, |b, data| {
            b.iter(|| generator.transform(black_box(data)).unwrap())
        });
    }

    group.finish();
}

fn bench_combine(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let branches: Vec<Array2<f64>> = (0..5)
        .map(|_| Array2::from_shape_fn((5000, 4), |_| rng.gen::<f64>()))
        .collect();
    let stacked = stack_branches(&branches).unwrap();

    c.bench_function("sum_combine", |b| b.iter(|| combine(black_box(&stacked), None).unwrap()));
}

criterion_group!(benches, bench_generators, bench_series_length, bench_combine);
criterion_main!(benches);
