use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, ArrayView1, Axis, array};
use scope::glm::{least_squares, logistic};
use scope::synthetic::SparseDesignBuilder;
use scope::{
    Algorithm, CompiledObjective, ConfigError, ContinuousOptimizer, Family, IcType, Objective,
    OptimizerOutcome, PathType, QuasiNewton, RegressionData, SilentReporter, SmoothProblem,
    SolveError, Solver, SolverConfig, SplicingType,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn gaussian_data(n: usize, p: usize) -> RegressionData {
    SparseDesignBuilder::new(n, p).build()
}

fn solver(config: SolverConfig) -> Solver<RegressionData> {
    Solver::new(config)
        .expect("valid configuration")
        .with_reporter(SilentReporter)
}

fn assert_recovers_truth(params: ArrayView1<f64>, epsilon: f64) {
    assert_abs_diff_eq!(params[0], 3.0, epsilon = epsilon);
    assert_abs_diff_eq!(params[1], -2.0, epsilon = epsilon);
    assert_abs_diff_eq!(params[2], 1.5, epsilon = epsilon);
}

#[test]
fn fixed_size_recovers_the_true_support() {
    let data = SparseDesignBuilder::new(150, 10).with_noise(0.01).build();
    let mut solver = solver(SolverConfig::with_size(10, 3));
    let result = solver.solve(&least_squares(), &data).unwrap();

    assert_eq!(result.support_set, vec![0, 1, 2]);
    assert_eq!(result.support_groups, vec![0, 1, 2]);
    assert_eq!(result.selected_size, 3);
    assert_eq!(result.path.len(), 1);
    assert!(result.converged);
    assert_recovers_truth(result.params.view(), 0.01);
    assert!(result.params.iter().skip(3).all(|&v| v == 0.0));
}

#[test]
fn every_information_criterion_prefers_the_true_size() {
    let data = gaussian_data(120, 10);
    for ic in [IcType::Aic, IcType::Bic, IcType::Gic, IcType::Ebic] {
        let config = SolverConfig {
            ic_type: ic,
            ..SolverConfig::with_sizes(10, vec![0, 3])
        };
        let mut solver = solver(config);
        let result = solver.solve(&least_squares(), &data).unwrap();
        assert_eq!(result.selected_size, 3, "criterion {:?}", ic);
        assert_eq!(result.path.iter().map(|p| p.size).collect::<Vec<_>>(), vec![0, 3]);
        assert!(result.path[1].score < result.path[0].score);
    }
}

#[test]
fn sequential_path_over_default_bounds_selects_the_true_size() {
    let data = gaussian_data(120, 10);
    let config = SolverConfig {
        n_features: 10,
        ic_type: IcType::Bic,
        ..SolverConfig::default()
    };
    let mut solver = solver(config);
    let result = solver.solve(&least_squares(), &data).unwrap();

    assert_eq!(result.selected_size, 3);
    assert_eq!(result.support_set, vec![0, 1, 2]);
    let sizes: Vec<usize> = result.path.iter().map(|p| p.size).collect();
    assert_eq!(sizes, (0..=10).collect::<Vec<_>>());
}

#[test]
fn golden_section_path_visits_fewer_sizes() {
    let data = gaussian_data(120, 10);
    let config = SolverConfig {
        n_features: 10,
        ic_type: IcType::Bic,
        path_type: PathType::Gs,
        gs_lower_bound: Some(0),
        gs_upper_bound: Some(10),
        ..SolverConfig::default()
    };
    let mut solver = solver(config);
    let result = solver.solve(&least_squares(), &data).unwrap();

    assert_eq!(result.selected_size, 3);
    assert_eq!(result.support_set, vec![0, 1, 2]);
    assert!(result.path.len() < 11);
    assert!(result.path.windows(2).all(|w| w[0].size < w[1].size));
}

#[test]
fn explicit_fold_ids_match_contiguous_folds_on_reordered_rows() {
    let data = gaussian_data(100, 8);
    let ids: Vec<usize> = (0..100).map(|i| i % 2).collect();
    let order: Vec<usize> = (0..100).step_by(2).chain((1..100).step_by(2)).collect();
    let reordered = RegressionData {
        x: data.x.select(Axis(0), &order),
        y: data.y.select(Axis(0), &order),
        feature_names: data.feature_names.clone(),
    };

    let by_ids = SolverConfig {
        cv: 2,
        cv_fold_id: Some(ids),
        ..SolverConfig::with_sizes(8, (0..=5).collect())
    };
    let contiguous = SolverConfig {
        cv: 2,
        ..SolverConfig::with_sizes(8, (0..=5).collect())
    };

    let mut first = solver(by_ids);
    let a = first.solve(&least_squares(), &data).unwrap().clone();
    let mut second = solver(contiguous);
    let b = second.solve(&least_squares(), &reordered).unwrap().clone();

    assert_eq!(a.selected_size, b.selected_size);
    assert_eq!(a.score, b.score);
    assert_eq!(a.support_set, b.support_set);
    assert!(a.selected_size >= 3);
    for (pa, pb) in a.path.iter().zip(&b.path) {
        assert_eq!(pa.score, pb.score);
    }
}

#[test]
fn seeded_shuffled_folds_are_reproducible() {
    let data = gaussian_data(90, 8);
    let config = SolverConfig {
        cv: 3,
        cv_shuffle_seed: Some(17),
        ..SolverConfig::with_sizes(8, (1..=5).collect())
    };
    let mut first = solver(config.clone());
    let a = first.solve(&least_squares(), &data).unwrap().clone();
    let mut second = solver(config);
    let b = second.solve(&least_squares(), &data).unwrap();

    assert_eq!(&a, b);
    assert!(a.path.iter().all(|p| p.score.is_finite()));
    assert!(a.support_set.starts_with(&[0, 1, 2]));
}

#[test]
fn cross_validation_needs_a_data_set() {
    let objective: Objective<()> =
        Objective::expression(|x: ArrayView1<f64>, _: &()| x.dot(&x));
    let config = SolverConfig {
        cv: 3,
        ..SolverConfig::with_sizes(4, vec![1, 2])
    };
    let mut solver: Solver<()> = Solver::new(config).unwrap();
    let err = solver.solve(&objective, &()).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Config(ConfigError::CrossValidationNeedsData)
    ));
}

#[test]
fn screening_keeps_forced_features_and_bounds_the_support() {
    let data = gaussian_data(150, 12);
    let config = SolverConfig {
        always_select: vec![7],
        screening_size: Some(5),
        ..SolverConfig::with_size(12, 4)
    };
    let mut solver = solver(config);
    let result = solver.solve(&least_squares(), &data).unwrap();

    let screened = result.screened_groups.clone().expect("screening ran");
    assert_eq!(screened.len(), 5);
    assert!(screened.contains(&7));
    assert!(result.support_groups.iter().all(|g| screened.contains(g)));
    assert_eq!(result.support_set, vec![0, 1, 2, 7]);
}

#[test]
fn screening_smaller_than_the_largest_size_is_rejected() {
    let data = gaussian_data(60, 8);
    let config = SolverConfig {
        screening_size: Some(2),
        ..SolverConfig::with_sizes(8, vec![1, 3])
    };
    let mut solver = solver(config);
    let err = solver.solve(&least_squares(), &data).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Config(ConfigError::ScreeningTooSmall {
            screening_size: 2,
            max_size: 3
        })
    ));
}

#[test]
fn solving_twice_gives_the_same_result() {
    let data = gaussian_data(80, 8);
    let mut solver = solver(SolverConfig::with_sizes(8, (0..=4).collect()));
    let first = solver.solve(&least_squares(), &data).unwrap().clone();
    let second = solver.solve(&least_squares(), &data).unwrap().clone();
    assert_eq!(first, second);
    assert_eq!(solver.support_set(), Some(first.support_set.as_slice()));
    assert_eq!(solver.score(), Some(first.score));
}

#[test]
fn accessors_are_empty_before_the_first_solve() {
    let solver = solver(SolverConfig::with_size(4, 1));
    assert!(solver.result().is_none());
    assert!(solver.support_set().is_none());
    assert!(solver.params().is_none());
}

#[test]
fn gradient_only_objective_uses_quasi_newton() {
    let data = gaussian_data(120, 8);
    let mut solver = solver(SolverConfig::with_size(8, 3));
    let result = solver
        .solve(&least_squares().without_hessian(), &data)
        .unwrap();
    assert_eq!(result.support_set, vec![0, 1, 2]);
    assert_recovers_truth(result.params.view(), 0.05);
}

#[test]
fn value_only_expression_recovers_the_support() {
    let data = gaussian_data(60, 6);
    let objective = Objective::expression(|b: ArrayView1<f64>, d: &RegressionData| {
        let r = &d.y - &d.x.dot(&b);
        0.5 * r.dot(&r)
    });
    let mut solver = solver(SolverConfig::with_size(6, 3));
    let result = solver.solve(&objective, &data).unwrap();
    assert_eq!(result.support_set, vec![0, 1, 2]);
    assert_recovers_truth(result.params.view(), 0.1);
}

/// Least squares evaluated through the external-objective contract.
struct CompiledLeastSquares;

impl CompiledObjective<RegressionData> for CompiledLeastSquares {
    fn value(&self, params: ArrayView1<'_, f64>, data: &RegressionData) -> f64 {
        let r = &data.y - &data.x.dot(&params);
        0.5 * r.dot(&r)
    }

    fn gradient(&self, params: ArrayView1<'_, f64>, data: &RegressionData) -> Array1<f64> {
        let r = &data.y - &data.x.dot(&params);
        -data.x.t().dot(&r)
    }

    fn hessian(&self, _: ArrayView1<'_, f64>, data: &RegressionData) -> Option<Array2<f64>> {
        Some(data.x.t().dot(&data.x))
    }

    fn has_hessian(&self) -> bool {
        true
    }
}

#[test]
fn compiled_objective_matches_the_builtin_loss() {
    let data = gaussian_data(100, 8);
    let mut builtin = solver(SolverConfig::with_size(8, 3));
    let expected = builtin.solve(&least_squares(), &data).unwrap().clone();

    let mut compiled = solver(SolverConfig::with_size(8, 3));
    let result = compiled
        .solve(&Objective::compiled(CompiledLeastSquares), &data)
        .unwrap();
    assert_eq!(result.support_set, expected.support_set);
    for (a, b) in result.params.iter().zip(expected.params.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
}

#[test]
fn hessian_with_a_first_order_variant_is_rejected() {
    let data = gaussian_data(40, 5);
    let config = SolverConfig {
        algorithm: Algorithm::Iht,
        ..SolverConfig::with_size(5, 2)
    };
    let mut solver = solver(config);
    let err = solver.solve(&least_squares(), &data).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Config(ConfigError::UnusedHessian { algorithm: "iht" })
    ));
}

#[test]
fn first_order_variants_recover_the_support() {
    let data = gaussian_data(150, 8);
    for algorithm in [
        Algorithm::Iht,
        Algorithm::Grahtp,
        Algorithm::Grasp,
        Algorithm::Omp,
    ] {
        let config = SolverConfig {
            algorithm,
            ..SolverConfig::with_size(8, 3)
        };
        let mut solver = solver(config);
        let result = solver
            .solve(&least_squares().without_hessian(), &data)
            .unwrap();
        assert_eq!(result.support_set, vec![0, 1, 2], "{:?}", algorithm);
        assert_recovers_truth(result.params.view(), 0.05);
    }
}

/// Quasi-Newton that records how often the search hands it a sub-problem.
struct CountingOptimizer {
    inner: QuasiNewton,
    calls: Arc<AtomicUsize>,
}

impl ContinuousOptimizer for CountingOptimizer {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn minimize(&self, problem: &dyn SmoothProblem, start: Array1<f64>) -> OptimizerOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.minimize(problem, start)
    }
}

#[test]
fn custom_continuous_optimizer_drives_every_sub_problem() {
    let data = SparseDesignBuilder::new(150, 10).with_noise(0.01).build();
    let calls = Arc::new(AtomicUsize::new(0));
    let optimizer = CountingOptimizer {
        inner: QuasiNewton {
            tolerance: 1e-10,
            max_iterations: 500,
        },
        calls: Arc::clone(&calls),
    };
    let mut solver = solver(SolverConfig::with_size(10, 3)).with_optimizer(optimizer);
    let result = solver
        .solve(&least_squares().without_hessian(), &data)
        .unwrap();

    assert!(calls.load(Ordering::SeqCst) > 0);
    assert_eq!(result.support_set, vec![0, 1, 2]);
    let truth: [(usize, f64); 3] = [(0, 3.0), (1, -2.0), (2, 1.5)];
    for (index, value) in truth {
        let relative = (result.params[index] - value).abs() / value.abs();
        assert!(relative < 0.01, "coefficient {index}: {}", result.params[index]);
    }
}

#[test]
fn taper_schedule_recovers_the_support() {
    let data = gaussian_data(120, 10);
    let config = SolverConfig {
        splicing_type: SplicingType::Taper,
        max_exchange_num: 3,
        ..SolverConfig::with_size(10, 3)
    };
    let mut solver = solver(config);
    let result = solver.solve(&least_squares(), &data).unwrap();
    assert_eq!(result.support_set, vec![0, 1, 2]);
}

#[test]
fn grouped_features_are_selected_together() {
    let data = SparseDesignBuilder::new(150, 6)
        .with_truth(vec![(0, 2.0), (1, -1.0), (4, 1.5), (5, 2.5)])
        .build();
    let config = SolverConfig {
        group: Some(vec![0, 0, 1, 1, 2, 2]),
        ..SolverConfig::with_size(6, 2)
    };
    let mut solver = solver(config);
    let result = solver.solve(&least_squares(), &data).unwrap();
    assert_eq!(result.support_groups, vec![0, 2]);
    assert_eq!(result.support_set, vec![0, 1, 4, 5]);
    assert_abs_diff_eq!(result.params[5], 2.5, epsilon = 0.05);
}

#[test]
fn initial_support_and_params_are_accepted() {
    let data = gaussian_data(100, 8);
    let truth = SparseDesignBuilder::new(100, 8).coefficients();

    let mut from_support = solver(SolverConfig::with_size(8, 3)).with_initial_support(vec![2, 0, 1]);
    let a = from_support.solve(&least_squares(), &data).unwrap().clone();
    assert_eq!(a.support_set, vec![0, 1, 2]);
    assert!(a.path[0].model.iterations <= 1);

    let mut from_params = solver(SolverConfig::with_size(8, 3)).with_initial_params(truth);
    let b = from_params.solve(&least_squares(), &data).unwrap();
    assert_eq!(b.support_set, vec![0, 1, 2]);
}

#[test]
fn invalid_initial_values_are_rejected() {
    let data = gaussian_data(40, 4);
    let mut out_of_range = solver(SolverConfig::with_size(4, 1)).with_initial_support(vec![9]);
    assert!(matches!(
        out_of_range.solve(&least_squares(), &data).unwrap_err(),
        SolveError::Config(ConfigError::InitialSupportOutOfRange { group: 9, n_groups: 4 })
    ));

    let mut wrong_length =
        solver(SolverConfig::with_size(4, 1)).with_initial_params(Array1::zeros(3));
    assert!(matches!(
        wrong_length.solve(&least_squares(), &data).unwrap_err(),
        SolveError::Config(ConfigError::InitialParamsLength { expected: 4, found: 3 })
    ));
}

#[test]
fn sub_problem_initializer_is_called() {
    let data = gaussian_data(60, 6);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut solver = solver(SolverConfig::with_size(6, 3)).with_sub_optim_initializer(
        move |_: ArrayView1<'_, f64>, _: &RegressionData, coords: &[usize]| {
            counter.fetch_add(1, Ordering::SeqCst);
            Array1::zeros(coords.len())
        },
    );
    let result = solver.solve(&least_squares(), &data).unwrap();
    assert_eq!(result.support_set, vec![0, 1, 2]);
    assert!(calls.load(Ordering::SeqCst) > 0);
}

#[test]
fn data_free_objective_uses_the_configured_sample_size() {
    let targets = array![4.0, 0.0, -3.0, 0.0, 0.05, 0.0];
    let objective: Objective<()> = Objective::callables(
        {
            let t = targets.clone();
            move |x: ArrayView1<f64>, _: &()| 0.5 * (&x - &t).mapv(|v| v * v).sum()
        },
        move |x: ArrayView1<f64>, _: &()| &x - &targets,
    )
    .with_hessian(|x: ArrayView1<f64>, _: &()| Array2::eye(x.len()));

    let config = SolverConfig {
        n_features: 6,
        ic_type: IcType::Bic,
        sample_size: Some(50),
        gs_lower_bound: Some(0),
        gs_upper_bound: Some(4),
        ..SolverConfig::default()
    };
    let mut solver: Solver<()> = Solver::new(config).unwrap().with_reporter(SilentReporter);
    let result = solver.solve(&objective, &()).unwrap();
    assert_eq!(result.selected_size, 2);
    assert_eq!(result.support_set, vec![0, 2]);
    assert_abs_diff_eq!(result.params[0], 4.0, epsilon = 1e-6);
    assert_abs_diff_eq!(result.params[2], -3.0, epsilon = 1e-6);
}

#[test]
fn data_free_bic_without_a_sample_size_is_rejected() {
    let objective: Objective<()> =
        Objective::expression(|x: ArrayView1<f64>, _: &()| x.dot(&x));
    let config = SolverConfig {
        ic_type: IcType::Bic,
        ..SolverConfig::with_sizes(3, vec![0, 1])
    };
    let mut solver: Solver<()> = Solver::new(config).unwrap();
    assert!(matches!(
        solver.solve(&objective, &()).unwrap_err(),
        SolveError::Config(ConfigError::SampleSizeTooSmall { ic: "bic", .. })
    ));
}

#[test]
fn parallel_lanes_match_the_sequential_run() {
    let data = gaussian_data(90, 8);
    let base = SolverConfig {
        cv: 3,
        ..SolverConfig::with_sizes(8, (1..=5).collect())
    };
    let mut sequential = solver(base.clone());
    let expected = sequential.solve(&least_squares(), &data).unwrap().clone();

    let mut parallel = solver(SolverConfig {
        thread_count: 2,
        ..base
    });
    let result = parallel.solve(&least_squares(), &data).unwrap();
    assert_eq!(*result, expected);
}

#[test]
fn logistic_loss_recovers_the_support() {
    let data = SparseDesignBuilder::new(500, 8)
        .with_family(Family::Binomial)
        .build();
    let mut solver = solver(SolverConfig::with_size(8, 3));
    let result = solver.solve(&logistic(), &data).unwrap();
    assert_eq!(result.support_set, vec![0, 1, 2]);
    assert!(result.params[0] > 0.0 && result.params[1] < 0.0 && result.params[2] > 0.0);
}
