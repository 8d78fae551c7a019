use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use batch_od::linalg::solver::{LinearSolver, SvdPseudoInverse};
use batch_od::linalg::svd::SvdDecomposition;

/// Symmetric positive semi-definite `n × n` matrix, shaped like a normal matrix.
fn random_normal_matrix(rng: &mut StdRng, rows: usize, n: usize) -> DMatrix<f64> {
    let a = DMatrix::from_fn(rows, n, |_, _| rng.random_range(-1.0..1.0));
    a.transpose() * a
}

fn bench_decomposition(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    for n in [6usize, 7] {
        c.bench_function(&format!("svd/normal_matrix_{n}x{n}"), |b| {
            b.iter_batched(
                || random_normal_matrix(&mut rng, 3 * n, n),
                |m| black_box(SvdDecomposition::new(&m).unwrap()),
                BatchSize::SmallInput,
            )
        });
    }

    c.bench_function("svd/tall_300x7", |b| {
        b.iter_batched(
            || DMatrix::from_fn(300, 7, |_, _| rng.random_range(-1.0..1.0)),
            |m| black_box(SvdDecomposition::new(&m).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

fn bench_pseudo_inverse_solve(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let normal = random_normal_matrix(&mut rng, 20, 7);
    let rhs = nalgebra::DVector::from_fn(7, |_, _| rng.random_range(-1.0..1.0));

    c.bench_function("svd/pseudo_inverse_solve_7", |b| {
        b.iter(|| black_box(SvdPseudoInverse.solve(black_box(&normal), black_box(&rhs))))
    });
}

criterion_group!(benches, bench_decomposition, bench_pseudo_inverse_solve);
criterion_main!(benches);
