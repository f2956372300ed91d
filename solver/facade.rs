//! # Solver Facade
//!
//! [`Solver`] is the single entry point for every variant. A call to
//! [`Solver::solve`] runs these stages:
//!
//! 1. validate the configuration against the objective and the data;
//! 2. optionally screen the group universe down to `screening_size`;
//! 3. build one lane for the full data and one per training fold;
//! 4. walk the size path, exploring every lane at each visited size and
//!    scoring the size by information criterion or held-out loss;
//! 5. report the full-data model at the best size.
//!
//! Lanes are independent, so with `thread_count > 1` they are explored on a
//! dedicated rayon pool. Scores are assembled in lane order, so the outcome is
//! the same as a sequential run.

use crate::config::{Algorithm, ConfigError, IcType, SolverConfig};
use crate::data::Dataset;
use crate::groups::{self, GroupLayout};
use crate::objective::Objective;
use crate::path::{Lane, SizeOracle, WarmStart, search_sizes};
use crate::problem::{CandidateModel, Problem, SupportExplorer};
use crate::report::{LogReporter, Reporter};
use crate::screening::screen;
use crate::selection::{Criterion, FoldAssignment, cv_score, ic_score};
use crate::splicing::Splicing;
use crate::suboptim::{
    ContinuousOptimizer, SubOptimInit, SubOptimizerBridge, default_optimizer, finite_or_infinity,
};
use crate::variants::{Grahtp, Grasp, Iht, Omp};
use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolveError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to build the worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("No candidate support size could be scored.")]
    NoCandidate,
}

/// One visited size on the path, with the full-data model and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPoint {
    pub size: usize,
    pub score: f64,
    pub model: CandidateModel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    /// Selected coordinates, sorted.
    pub support_set: Vec<usize>,
    /// Selected groups, sorted.
    pub support_groups: Vec<usize>,
    pub params: Array1<f64>,
    pub selected_size: usize,
    pub score: f64,
    pub loss: f64,
    pub converged: bool,
    /// The universe after screening, when screening ran.
    pub screened_groups: Option<Vec<usize>>,
    /// Visited sizes in increasing order.
    pub path: Vec<PathPoint>,
}

pub fn explorer_for<D>(algorithm: Algorithm) -> Box<dyn SupportExplorer<D>> {
    match algorithm {
        Algorithm::Splicing => Box::new(Splicing),
        Algorithm::Iht => Box::new(Iht),
        Algorithm::Grahtp => Box::new(Grahtp),
        Algorithm::Grasp => Box::new(Grasp),
        Algorithm::Omp => Box::new(Omp),
    }
}

pub struct Solver<D> {
    config: SolverConfig,
    layout: GroupLayout,
    initial_support: Option<Vec<usize>>,
    initial_params: Option<Array1<f64>>,
    sub_optim_init: Option<Box<SubOptimInit<D>>>,
    optimizer: Option<Box<dyn ContinuousOptimizer>>,
    reporter: Box<dyn Reporter>,
    result: Option<SolveResult>,
}

impl<D: Dataset> Solver<D> {
    pub fn new(config: SolverConfig) -> Result<Self, ConfigError> {
        let layout = config.validate()?;
        Ok(Self {
            config,
            layout,
            initial_support: None,
            initial_params: None,
            sub_optim_init: None,
            optimizer: None,
            reporter: Box::new(LogReporter),
            result: None,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Starts every lane from these groups instead of the forced groups.
    pub fn with_initial_support(mut self, groups: Vec<usize>) -> Self {
        self.initial_support = Some(groups::normalize(groups));
        self
    }

    /// Starts every lane from these parameters, thresholded by group norm.
    pub fn with_initial_params(mut self, params: Array1<f64>) -> Self {
        self.initial_params = Some(params);
        self
    }

    /// Supplies the starting values of each restricted sub-problem.
    pub fn with_sub_optim_initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(ArrayView1<'_, f64>, &D, &[usize]) -> Array1<f64> + Send + Sync + 'static,
    {
        self.sub_optim_init = Some(Box::new(init));
        self
    }

    pub fn with_optimizer<O: ContinuousOptimizer + 'static>(mut self, optimizer: O) -> Self {
        self.optimizer = Some(Box::new(optimizer));
        self
    }

    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Runs the search and keeps the result; a later call replaces it.
    pub fn solve(
        &mut self,
        objective: &Objective<D>,
        data: &D,
    ) -> Result<&SolveResult, SolveError> {
        let result = self.run(objective, data)?;
        self.reporter.selected(&result);
        let stored: &SolveResult = self.result.insert(result);
        Ok(stored)
    }

    pub fn result(&self) -> Option<&SolveResult> {
        self.result.as_ref()
    }

    pub fn support_set(&self) -> Option<&[usize]> {
        self.result.as_ref().map(|r| r.support_set.as_slice())
    }

    pub fn support_groups(&self) -> Option<&[usize]> {
        self.result.as_ref().map(|r| r.support_groups.as_slice())
    }

    pub fn params(&self) -> Option<ArrayView1<'_, f64>> {
        self.result.as_ref().map(|r| r.params.view())
    }

    pub fn score(&self) -> Option<f64> {
        self.result.as_ref().map(|r| r.score)
    }

    fn run(&self, objective: &Objective<D>, data: &D) -> Result<SolveResult, SolveError> {
        let config = &self.config;
        let layout = &self.layout;
        let n_groups = layout.n_groups();
        let explorer = explorer_for::<D>(config.algorithm);
        if !explorer.uses_second_order() && objective.supplies_hessian_callable() {
            return Err(ConfigError::UnusedHessian {
                algorithm: config.algorithm.name(),
            }
            .into());
        }

        let n_samples = resolve_sample_size(config.sample_size, data.n_samples())?;
        let forced = layout.groups_of(&config.always_select);
        let sizes = config.candidate_sizes(n_groups, forced.len(), n_samples.unwrap_or(0))?;
        let max_size = sizes.last().copied().unwrap_or(0);

        let criterion = if config.cv > 1 {
            let n = data
                .n_samples()
                .ok_or(ConfigError::CrossValidationNeedsData)?;
            let folds = match (&config.cv_fold_id, config.cv_shuffle_seed) {
                (Some(ids), _) => FoldAssignment::from_ids(ids, n, config.cv)?,
                (None, Some(seed)) => FoldAssignment::shuffled(n, config.cv, seed)?,
                (None, None) => FoldAssignment::contiguous(n, config.cv)?,
            };
            Criterion::CrossValidation(folds)
        } else {
            if sizes.len() > 1 {
                check_ic_sample_size(config.ic_type, n_samples)?;
            }
            Criterion::Information {
                ic: config.ic_type,
                coef: config.ic_coef,
                n_samples: n_samples.unwrap_or(0),
                n_features: layout.n_features(),
            }
        };
        let seed = self.warm_start(n_groups)?;

        let optimizer_box;
        let optimizer: &dyn ContinuousOptimizer = match &self.optimizer {
            Some(custom) => custom.as_ref(),
            None => {
                optimizer_box = default_optimizer(&config.sub_optimizer, objective.provides_hessian());
                optimizer_box.as_ref()
            }
        };
        let bridge = SubOptimizerBridge::new(optimizer, self.sub_optim_init.as_deref());
        log::info!(
            "Solving with {} ({} objective, {} sub-optimizer) over {} groups; sizes {:?}; criterion {}.",
            explorer.name(),
            objective.mode_name(),
            bridge.optimizer_name(),
            n_groups,
            sizes,
            criterion.describe()
        );

        let all_groups = layout.all_groups();
        let full_problem = Problem {
            objective,
            data,
            layout,
            universe: &all_groups,
            forced: &forced,
            bridge,
            config,
        };
        let screened = match config.effective_screening(n_groups) {
            Some(budget) => {
                let kept = screen(&full_problem, budget, max_size)?;
                self.reporter.screened(&kept, n_groups);
                Some(kept)
            }
            None => None,
        };
        let universe: &[usize] = screened.as_deref().unwrap_or(&all_groups);

        let (train_sets, test_sets): (Vec<D>, Vec<D>) = match &criterion {
            Criterion::CrossValidation(folds) => (0..folds.n_folds())
                .map(|k| {
                    (
                        data.subset(&folds.train_indices(k)),
                        data.subset(&folds.test_indices(k)),
                    )
                })
                .unzip(),
            Criterion::Information { .. } => (Vec::new(), Vec::new()),
        };
        let mut lanes: Vec<Lane<'_, D>> = Vec::with_capacity(1 + train_sets.len());
        for lane_data in std::iter::once(data).chain(train_sets.iter()) {
            let problem = Problem {
                data: lane_data,
                universe,
                ..full_problem
            };
            lanes.push(Lane::new(problem, seed.clone()));
        }

        let pool = if config.thread_count > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.thread_count)
                    .build()?,
            )
        } else {
            None
        };

        let mut oracle = PathOracle {
            lanes: &mut lanes,
            test_sets: &test_sets,
            objective,
            explorer: explorer.as_ref(),
            criterion: &criterion,
            pool: pool.as_ref(),
            reporter: self.reporter.as_ref(),
            points: Vec::new(),
        };
        let best = search_sizes(&mut oracle, &sizes, config.path_type).ok_or(SolveError::NoCandidate)?;
        let selected_size = sizes[best];
        let mut path = oracle.points;
        path.sort_by_key(|point| point.size);
        let chosen = path
            .iter()
            .find(|point| point.size == selected_size)
            .cloned()
            .ok_or(SolveError::NoCandidate)?;

        Ok(SolveResult {
            support_set: chosen.model.coordinates,
            support_groups: chosen.model.support,
            params: chosen.model.params,
            selected_size,
            score: chosen.score,
            loss: chosen.model.loss,
            converged: chosen.model.converged,
            screened_groups: screened,
            path,
        })
    }

    fn warm_start(&self, n_groups: usize) -> Result<WarmStart, ConfigError> {
        if let Some(support) = &self.initial_support {
            if let Some(&group) = support.iter().find(|&&g| g >= n_groups) {
                return Err(ConfigError::InitialSupportOutOfRange { group, n_groups });
            }
            return Ok(WarmStart::Support(support.clone()));
        }
        if let Some(params) = &self.initial_params {
            let expected = self.layout.n_features();
            if params.len() != expected {
                return Err(ConfigError::InitialParamsLength {
                    expected,
                    found: params.len(),
                });
            }
            return Ok(WarmStart::Params(params.clone()));
        }
        Ok(WarmStart::Cold)
    }
}

/// The configured sample size wins for data-free objectives; with data the
/// two must agree.
fn resolve_sample_size(
    configured: Option<usize>,
    found: Option<usize>,
) -> Result<Option<usize>, ConfigError> {
    match (configured, found) {
        (Some(configured), Some(found)) if configured != found => {
            Err(ConfigError::SampleSizeMismatch { configured, found })
        }
        (Some(n), _) | (None, Some(n)) => Ok(Some(n)),
        (None, None) => Ok(None),
    }
}

fn check_ic_sample_size(ic: IcType, n_samples: Option<usize>) -> Result<(), ConfigError> {
    let required = match ic {
        IcType::Aic => return Ok(()),
        IcType::Bic | IcType::Ebic => 1,
        IcType::Gic => 3,
    };
    let found = n_samples.unwrap_or(0);
    if found < required {
        return Err(ConfigError::SampleSizeTooSmall {
            ic: ic.name(),
            required,
            found,
        });
    }
    Ok(())
}

struct PathOracle<'s, 'a, D> {
    lanes: &'s mut [Lane<'a, D>],
    test_sets: &'s [D],
    objective: &'a Objective<D>,
    explorer: &'s dyn SupportExplorer<D>,
    criterion: &'s Criterion,
    pool: Option<&'s rayon::ThreadPool>,
    reporter: &'s dyn Reporter,
    points: Vec<PathPoint>,
}

impl<D: Dataset> SizeOracle for PathOracle<'_, '_, D> {
    fn score(&mut self, size: usize) -> f64 {
        let explorer = self.explorer;
        let lanes = &mut *self.lanes;
        let models: Vec<CandidateModel> = match self.pool {
            Some(pool) => pool.install(|| {
                lanes
                    .par_iter_mut()
                    .map(|lane| lane.evaluate(explorer, size).clone())
                    .collect()
            }),
            None => lanes
                .iter_mut()
                .map(|lane| lane.evaluate(explorer, size).clone())
                .collect(),
        };
        let full = &models[0];

        let score = match self.criterion {
            Criterion::Information {
                ic,
                coef,
                n_samples,
                n_features,
            } => ic_score(
                *ic,
                *coef,
                full.loss,
                full.coordinates.len(),
                *n_samples,
                *n_features,
            ),
            Criterion::CrossValidation(_) => {
                let held_out: Vec<f64> = models[1..]
                    .iter()
                    .zip(self.test_sets)
                    .map(|(model, test)| {
                        finite_or_infinity(self.objective.value(model.params.view(), test))
                    })
                    .collect();
                cv_score(&held_out)
            }
        };

        let point = PathPoint {
            size,
            score,
            model: full.clone(),
        };
        self.reporter
            .candidate_evaluated(&point, &self.criterion.describe());
        self.points.push(point);
        score
    }
}
