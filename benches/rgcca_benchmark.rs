use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rgcca::{RgccaBuilder, Scheme, Shrinkage};
use std::time::Duration;

fn make_blocks(n: usize, widths: &[usize], seed: u64) -> Vec<Array2<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let latent: Array1<f64> =
        Array1::from_iter((0..n).map(|_| rng.sample::<f64, _>(StandardNormal)));
    widths
        .iter()
        .map(|&p| {
            Array2::from_shape_fn((n, p), |(i, _)| {
                0.6 * latent[i] + 0.4 * rng.sample::<f64, _>(StandardNormal)
            })
        })
        .collect()
}

fn full_connection(j: usize) -> Array2<f64> {
    Array2::from_shape_fn((j, j), |(a, b)| if a == b { 0.0 } else { 1.0 })
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("rgcca_fit");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for &(n, p) in &[(100usize, 20usize), (500, 50), (1000, 100)] {
        let blocks = make_blocks(n, &[p, p, p / 2], 42);
        let model = RgccaBuilder::new(full_connection(3))
            .shrinkage(Shrinkage::Values(vec![1.0, 0.5, 0.5]))
            .scheme(Scheme::Factorial)
            .build();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", n, p)),
            &blocks,
            |b, blocks| b.iter(|| model.fit(blocks).unwrap()),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_fit);
criterion_main!(benches);
