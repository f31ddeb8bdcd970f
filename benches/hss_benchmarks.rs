//! Benchmarks for HSS compression, mat-vec and the ULV solve
//!
//! Run with: cargo bench --bench hss_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fast_hss::{bisection_cluster, compress, HssConfig, HssMatrix};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

fn kernel_matrix(n: usize, shift: f64) -> Array2<f64> {
    let h = 2.0 / (n as f64 - 1.0);
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            shift
        } else {
            let xi = -1.0 + h * i as f64;
            let xj = -1.0 + h * j as f64;
            1.0 / (xi - xj)
        }
    })
}

fn compress_square(a: &Array2<f64>, leafsize: usize, tol: f64) -> HssMatrix {
    let tree = bisection_cluster(0..a.nrows(), leafsize).unwrap();
    compress(a, &tree, &tree, &HssConfig::new(tol, true, leafsize)).unwrap()
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    group.sample_size(10);
    for &n in &[256usize, 512, 1024] {
        let a = kernel_matrix(n, 1e3);
        group.bench_with_input(BenchmarkId::from_parameter(n), &a, |bench, a| {
            bench.iter(|| black_box(compress_square(a, 64, 1e-9)));
        });
    }
    group.finish();
}

fn bench_matvec(c: &mut Criterion) {
    let mut group = c.benchmark_group("matvec");
    for &n in &[256usize, 512, 1024] {
        let a = kernel_matrix(n, 1e3);
        let hss = compress_square(&a, 64, 1e-9);
        let x = Array2::random((n, 4), Uniform::new(-1.0, 1.0));
        group.bench_with_input(BenchmarkId::from_parameter(n), &hss, |bench, hss| {
            bench.iter(|| black_box(hss.matvec(&x).unwrap()));
        });
    }
    group.finish();
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("ulv_solve");
    group.sample_size(10);
    for &n in &[256usize, 512, 1024] {
        let a = kernel_matrix(n, 1e3);
        let hss = compress_square(&a, 64, 1e-9);
        let b = Array2::random((n, 4), Uniform::new(-1.0, 1.0));
        group.bench_with_input(BenchmarkId::from_parameter(n), &hss, |bench, hss| {
            bench.iter(|| black_box(hss.solve(&b).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compress, bench_matvec, bench_solve);
criterion_main!(benches);
