//! First-order support explorers.
//!
//! These share the splicing contracts but only ever look at the gradient:
//!
//! - [`Iht`]: projected gradient descent onto the top-k groups, with
//!   backtracking on the step, then one restricted refit on the final support.
//! - [`Grahtp`]: a thresholded gradient step picks the support, which is then
//!   refit exactly; repeats until the support stops changing.
//! - [`Grasp`]: merges the `2k` groups with the largest gradient into the
//!   support, refits on the union, prunes back to `k` and refits.
//! - [`Omp`]: greedy forward selection by gradient group norm.

use crate::groups;
use crate::importance::{threshold_support, with_forced};
use crate::problem::{CandidateModel, Problem, StartPoint, SupportExplorer, improves};
use ndarray::{Array1, ArrayView1};

const MIN_STEP: f64 = 1e-12;

/// Support of `target` groups picked from a gradient step away from `params`.
fn stepped_support<D>(
    problem: &Problem<'_, D>,
    params: ArrayView1<f64>,
    gradient: &Array1<f64>,
    step: f64,
    target: usize,
) -> (Vec<usize>, Array1<f64>) {
    let moved = &params - &(gradient * step);
    let support = threshold_support(
        problem.layout,
        problem.universe,
        problem.forced,
        moved.view(),
        target,
    );
    (support, moved)
}

fn initial_support<D>(problem: &Problem<'_, D>, start: &StartPoint, target: usize) -> Vec<usize> {
    let support = with_forced(problem, &start.support);
    if support.len() == target {
        return support;
    }
    let gradient = problem.gradient(start.params.view());
    let masked = problem.layout.mask(start.params.view(), &support);
    stepped_support(
        problem,
        masked.view(),
        &gradient,
        problem.config.step_size,
        target,
    )
    .0
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Iht;

impl<D> SupportExplorer<D> for Iht {
    fn name(&self) -> &'static str {
        "iht"
    }

    fn uses_second_order(&self) -> bool {
        false
    }

    fn explore(&self, problem: &Problem<'_, D>, start: StartPoint, size: usize) -> CandidateModel {
        let config = problem.config;
        let target = problem.target_size(size);
        let mut support = initial_support(problem, &start, target);
        let mut fit = problem.fit(&support, start.params.view());
        let mut params = fit.params.clone();
        let mut loss = fit.loss;
        let mut iterations = 0;

        while iterations < config.max_iter {
            iterations += 1;
            let gradient = problem.gradient(params.view());
            let mut step = config.step_size;
            let mut next = None;
            while step >= MIN_STEP {
                let (trial_support, moved) =
                    stepped_support(problem, params.view(), &gradient, step, target);
                let trial_params = problem.layout.mask(moved.view(), &trial_support);
                let trial_loss = problem.loss(trial_params.view());
                if trial_loss.is_finite() && trial_loss <= loss {
                    next = Some((trial_support, trial_params, trial_loss));
                    break;
                }
                step *= 0.5;
            }
            let Some((next_support, next_params, next_loss)) = next else {
                break;
            };
            let settled =
                next_support == support && !improves(loss, next_loss, config.splicing_tolerance);
            support = next_support;
            params = next_params;
            loss = next_loss;
            if settled {
                break;
            }
        }

        // Debias on the final support.
        let refit = problem.fit(&support, params.view());
        if refit.loss <= loss || !loss.is_finite() {
            fit = refit;
        } else {
            fit.params = params;
            fit.loss = loss;
        }
        problem.candidate(size, support, fit, iterations)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Grahtp;

impl<D> SupportExplorer<D> for Grahtp {
    fn name(&self) -> &'static str {
        "grahtp"
    }

    fn uses_second_order(&self) -> bool {
        false
    }

    fn explore(&self, problem: &Problem<'_, D>, start: StartPoint, size: usize) -> CandidateModel {
        let config = problem.config;
        let target = problem.target_size(size);
        let mut support = initial_support(problem, &start, target);
        let mut fit = problem.fit(&support, start.params.view());
        let mut iterations = 0;

        while iterations < config.max_iter {
            iterations += 1;
            let gradient = problem.gradient(fit.params.view());
            let mut step = config.step_size;
            let mut next = None;
            while step >= MIN_STEP {
                let (trial_support, moved) =
                    stepped_support(problem, fit.params.view(), &gradient, step, target);
                if trial_support == support {
                    break;
                }
                let trial = problem.fit(&trial_support, moved.view());
                if improves(fit.loss, trial.loss, config.splicing_tolerance) {
                    next = Some((trial_support, trial));
                    break;
                }
                step *= 0.5;
            }
            match next {
                Some((next_support, next_fit)) => {
                    support = next_support;
                    fit = next_fit;
                }
                None => break,
            }
        }
        problem.candidate(size, support, fit, iterations)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Grasp;

impl<D> SupportExplorer<D> for Grasp {
    fn name(&self) -> &'static str {
        "grasp"
    }

    fn uses_second_order(&self) -> bool {
        false
    }

    fn explore(&self, problem: &Problem<'_, D>, start: StartPoint, size: usize) -> CandidateModel {
        let config = problem.config;
        let layout = problem.layout;
        let target = problem.target_size(size);
        let mut support = initial_support(problem, &start, target);
        let mut fit = problem.fit(&support, start.params.view());
        let mut iterations = 0;

        while iterations < config.max_iter {
            iterations += 1;
            let gradient = problem.gradient(fit.params.view());
            let inactive = problem.inactive(&support);
            let mut scored: Vec<(usize, f64)> = inactive
                .iter()
                .map(|&g| (g, layout.group_norm(g, gradient.view())))
                .collect();
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
            let merged = groups::normalize(
                support
                    .iter()
                    .copied()
                    .chain(scored.iter().take(2 * target).map(|&(g, _)| g))
                    .collect(),
            );
            if merged == support {
                break;
            }
            let wide = problem.fit(&merged, fit.params.view());
            let pruned = threshold_support(
                layout,
                problem.universe,
                problem.forced,
                wide.params.view(),
                target,
            );
            let trial = problem.fit(&pruned, wide.params.view());
            if pruned != support && improves(fit.loss, trial.loss, config.splicing_tolerance) {
                support = pruned;
                fit = trial;
            } else {
                break;
            }
        }
        problem.candidate(size, support, fit, iterations)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Omp;

impl<D> SupportExplorer<D> for Omp {
    fn name(&self) -> &'static str {
        "omp"
    }

    fn uses_second_order(&self) -> bool {
        false
    }

    fn explore(&self, problem: &Problem<'_, D>, start: StartPoint, size: usize) -> CandidateModel {
        let layout = problem.layout;
        let target = problem.target_size(size);
        // Grow from a smaller warm support when there is one; otherwise
        // restart from the forced groups.
        let warm = with_forced(problem, &start.support);
        let (mut support, warm_params) = if warm.len() <= target {
            (warm, start.params)
        } else {
            (problem.forced.to_vec(), Array1::zeros(problem.n_features()))
        };
        let mut fit = problem.fit(&support, warm_params.view());
        let mut iterations = 0;

        while support.len() < target {
            iterations += 1;
            let gradient = problem.gradient(fit.params.view());
            let best = problem
                .inactive(&support)
                .into_iter()
                .map(|g| (g, layout.group_norm(g, gradient.view())))
                .fold(None::<(usize, f64)>, |best, (g, score)| match best {
                    Some((_, top)) if top >= score => best,
                    _ => Some((g, score)),
                });
            let Some((group, _)) = best else {
                break;
            };
            support = groups::normalize(support.into_iter().chain([group]).collect());
            fit = problem.fit(&support, fit.params.view());
        }
        problem.candidate(size, support, fit, iterations)
    }
}
