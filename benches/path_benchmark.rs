// Measures the cost of a full size search: the sequential path against the
// golden-section path, and splicing against the first-order variants, on
// seeded synthetic least-squares problems.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use scope::glm::least_squares;
use scope::synthetic::SparseDesignBuilder;
use scope::{Algorithm, IcType, PathType, SilentReporter, Solver, SolverConfig};

/// `(n_samples, n_features)` of each benchmarked problem.
const PROBLEM_SHAPES: [(usize, usize); 3] = [(200, 20), (500, 50), (1_000, 100)];
/// Largest candidate size searched.
const MAX_SIZE: usize = 10;

fn path_config(n_features: usize, path_type: PathType) -> SolverConfig {
    SolverConfig {
        n_features,
        ic_type: IcType::Bic,
        path_type,
        gs_lower_bound: Some(0),
        gs_upper_bound: Some(MAX_SIZE),
        ..SolverConfig::default()
    }
}

fn bench_path_types(c: &mut Criterion) {
    let mut group = c.benchmark_group("size_path");
    group.sample_size(10);
    for (n, p) in PROBLEM_SHAPES {
        let data = SparseDesignBuilder::new(n, p)
            .with_truth(vec![(0, 3.0), (3, -2.0), (7, 1.5), (11, 1.0)])
            .build();
        let objective = least_squares();
        for (label, path_type) in [("sequential", PathType::Sequential), ("golden", PathType::Gs)] {
            group.bench_with_input(
                BenchmarkId::new(label, format!("{n}x{p}")),
                &path_type,
                |b, &path_type| {
                    b.iter(|| {
                        let mut solver = Solver::new(path_config(p, path_type))
                            .expect("valid benchmark configuration")
                            .with_reporter(SilentReporter);
                        let result = solver.solve(&objective, &data).expect("solve");
                        black_box(result.selected_size)
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_algorithms(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixed_size_search");
    group.sample_size(10);
    let data = SparseDesignBuilder::new(500, 50).build();
    let objective = least_squares().without_hessian();
    let hessian_objective = least_squares();
    for algorithm in [
        Algorithm::Splicing,
        Algorithm::Iht,
        Algorithm::Grahtp,
        Algorithm::Grasp,
        Algorithm::Omp,
    ] {
        let objective = if algorithm == Algorithm::Splicing {
            &hessian_objective
        } else {
            &objective
        };
        group.bench_function(algorithm.name(), |b| {
            b.iter(|| {
                let config = SolverConfig {
                    algorithm,
                    ..SolverConfig::with_size(50, 3)
                };
                let mut solver = Solver::new(config)
                    .expect("valid benchmark configuration")
                    .with_reporter(SilentReporter);
                let result = solver.solve(objective, &data).expect("solve");
                black_box(result.loss)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_path_types, bench_algorithms);
criterion_main!(benches);
