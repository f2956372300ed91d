//! # Sub-optimizer Bridge
//!
//! Once a support is fixed, the remaining problem is an unconstrained smooth
//! minimization over the support's coordinates. This module owns that step:
//!
//! - [`SmoothProblem`] is the minimal contract a continuous optimizer sees.
//! - [`ContinuousOptimizer`] is the pluggable optimizer seam. [`QuasiNewton`]
//!   drives `wolfe_bfgs`; [`Newton`] is a damped Newton method on top of the
//!   faer Cholesky bridge.
//! - [`SubOptimizerBridge`] projects onto a support, picks the starting point,
//!   runs the optimizer and maps the result back to the full parameter vector.
//!
//! Numerical trouble never escapes as an error. The best iterate seen is kept,
//! the fit is flagged as not converged, and a non-finite loss is recorded as
//! `+∞` so that it can never win a comparison against a finite candidate.

use crate::config::{OptimizerKind, SubOptimizerConfig};
use crate::linalg::solve_regularized;
use crate::objective::{Objective, Restricted};
use ndarray::{Array1, Array2, ArrayView1};
use std::cell::RefCell;
use wolfe_bfgs::{Bfgs, BfgsSolution};

/// Sentinel cost handed to the line search in place of non-finite losses.
const LARGE_COST: f64 = 1e10;
/// Armijo sufficient-decrease constant for the damped Newton line search.
const ARMIJO: f64 = 1e-4;
const MIN_STEP: f64 = 1e-10;

/// A smooth function over `dim()` free coordinates.
pub trait SmoothProblem {
    fn dim(&self) -> usize;
    fn value(&self, x: ArrayView1<f64>) -> f64;
    fn gradient(&self, x: ArrayView1<f64>) -> Array1<f64>;
    /// Analytic hessian when one is available.
    fn hessian(&self, x: ArrayView1<f64>) -> Option<Array2<f64>>;
    /// Hessian derived from lower-order information.
    fn derived_hessian(&self, x: ArrayView1<f64>) -> Array2<f64>;
}

impl<D> SmoothProblem for Restricted<'_, D> {
    fn dim(&self) -> usize {
        Restricted::dim(self)
    }

    fn value(&self, x: ArrayView1<f64>) -> f64 {
        Restricted::value(self, x)
    }

    fn gradient(&self, x: ArrayView1<f64>) -> Array1<f64> {
        Restricted::gradient(self, x)
    }

    fn hessian(&self, x: ArrayView1<f64>) -> Option<Array2<f64>> {
        Restricted::hessian(self, x)
    }

    fn derived_hessian(&self, x: ArrayView1<f64>) -> Array2<f64> {
        Restricted::derived_hessian(self, x)
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerOutcome {
    pub point: Array1<f64>,
    pub value: f64,
    pub converged: bool,
    pub iterations: usize,
}

pub trait ContinuousOptimizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn minimize(&self, problem: &dyn SmoothProblem, start: Array1<f64>) -> OptimizerOutcome;
}

/// BFGS with a strong-Wolfe line search, via `wolfe_bfgs`.
#[derive(Debug, Clone)]
pub struct QuasiNewton {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl ContinuousOptimizer for QuasiNewton {
    fn name(&self) -> &'static str {
        "quasi-newton"
    }

    fn minimize(&self, problem: &dyn SmoothProblem, start: Array1<f64>) -> OptimizerOutcome {
        let start_value = problem.value(start.view());
        if problem.dim() == 0 {
            return OptimizerOutcome {
                point: start,
                value: start_value,
                converged: true,
                iterations: 0,
            };
        }

        // wolfe_bfgs reports failures without the iterate it reached, so the
        // best finite point is tracked here.
        let best = RefCell::new((start.clone(), finite_or_infinity(start_value)));
        let cost_and_grad = |x: &Array1<f64>| -> (f64, Array1<f64>) {
            let cost = problem.value(x.view());
            let grad = problem.gradient(x.view());
            if cost.is_finite() && grad.iter().all(|g| g.is_finite()) {
                let mut slot = best.borrow_mut();
                if cost < slot.1 {
                    *slot = (x.clone(), cost);
                }
                (cost, grad)
            } else {
                log::warn!(
                    "Non-finite loss or gradient during quasi-Newton step (loss = {}); returning a large finite value.",
                    cost
                );
                (
                    LARGE_COST,
                    grad.mapv(|g| if g.is_finite() { g } else { 0.0 }),
                )
            }
        };

        let run = Bfgs::new(start, cost_and_grad)
            .with_tolerance(self.tolerance)
            .with_max_iterations(self.max_iterations)
            .run();
        let (best_point, best_value) = best.into_inner();
        match run {
            Ok(BfgsSolution {
                final_point,
                iterations,
                ..
            }) => {
                let value = problem.value(final_point.view());
                if value.is_finite() && value <= best_value {
                    OptimizerOutcome {
                        point: final_point,
                        value,
                        converged: true,
                        iterations,
                    }
                } else {
                    OptimizerOutcome {
                        point: best_point,
                        value: best_value,
                        converged: best_value.is_finite(),
                        iterations,
                    }
                }
            }
            Err(e) => {
                log::debug!("Quasi-Newton stopped early: {:?}", e);
                OptimizerOutcome {
                    point: best_point,
                    value: best_value,
                    converged: false,
                    iterations: self.max_iterations,
                }
            }
        }
    }
}

/// Damped Newton with Armijo backtracking. Uses the analytic hessian when
/// present and a derived one otherwise; singular systems are ridge-regularized.
#[derive(Debug, Clone)]
pub struct Newton {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl ContinuousOptimizer for Newton {
    fn name(&self) -> &'static str {
        "newton"
    }

    fn minimize(&self, problem: &dyn SmoothProblem, start: Array1<f64>) -> OptimizerOutcome {
        let mut x = start;
        let mut f = problem.value(x.view());
        if problem.dim() == 0 || !f.is_finite() {
            let converged = f.is_finite();
            return OptimizerOutcome {
                point: x,
                value: finite_or_infinity(f),
                converged,
                iterations: 0,
            };
        }

        for iteration in 0..self.max_iterations {
            let g = problem.gradient(x.view());
            if !g.iter().all(|v| v.is_finite()) {
                log::warn!("Non-finite gradient in Newton step {}.", iteration);
                return OptimizerOutcome {
                    point: x,
                    value: f,
                    converged: false,
                    iterations: iteration,
                };
            }
            let scale = f.abs().max(1.0);
            if g.dot(&g).sqrt() <= self.tolerance {
                return OptimizerOutcome {
                    point: x,
                    value: f,
                    converged: true,
                    iterations: iteration,
                };
            }

            let h = problem
                .hessian(x.view())
                .unwrap_or_else(|| problem.derived_hessian(x.view()));
            let direction = match solve_regularized(&h, &g) {
                Ok(d) if g.dot(&d) > 0.0 => d,
                // Not a descent direction: fall back to steepest descent.
                _ => g.clone(),
            };
            let decrement = g.dot(&direction);
            if 0.5 * decrement <= self.tolerance * scale {
                return OptimizerOutcome {
                    point: x,
                    value: f,
                    converged: true,
                    iterations: iteration,
                };
            }

            let mut step = 1.0;
            let mut accepted = None;
            while step >= MIN_STEP {
                let candidate = &x - &(&direction * step);
                let value = problem.value(candidate.view());
                if value.is_finite() && value <= f - ARMIJO * step * decrement {
                    accepted = Some((candidate, value));
                    break;
                }
                step *= 0.5;
            }
            match accepted {
                Some((candidate, value)) => {
                    let improvement = f - value;
                    x = candidate;
                    f = value;
                    if improvement <= f64::EPSILON * scale {
                        return OptimizerOutcome {
                            point: x,
                            value: f,
                            converged: true,
                            iterations: iteration + 1,
                        };
                    }
                }
                None => {
                    log::debug!(
                        "Newton line search stalled at iteration {} (decrement {:.3e}).",
                        iteration,
                        decrement
                    );
                    return OptimizerOutcome {
                        point: x,
                        value: f,
                        converged: false,
                        iterations: iteration,
                    };
                }
            }
        }

        OptimizerOutcome {
            point: x,
            value: f,
            converged: false,
            iterations: self.max_iterations,
        }
    }
}

/// The optimizer chosen for a run when the caller does not inject one.
pub fn default_optimizer(
    config: &SubOptimizerConfig,
    provides_hessian: bool,
) -> Box<dyn ContinuousOptimizer> {
    let newton = matches!(config.kind, OptimizerKind::Newton)
        || (matches!(config.kind, OptimizerKind::Auto) && provides_hessian);
    if newton {
        Box::new(Newton {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
        })
    } else {
        Box::new(QuasiNewton {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
        })
    }
}

/// Produces the starting values of the support coordinates for a sub-problem,
/// given the warm full-length parameters, the data and the coordinates.
pub type SubOptimInit<D> = dyn Fn(ArrayView1<'_, f64>, &D, &[usize]) -> Array1<f64> + Send + Sync;

/// Result of one restricted fit. `params` is full length and zero outside the
/// support.
#[derive(Debug, Clone)]
pub struct SubFit {
    pub params: Array1<f64>,
    pub loss: f64,
    pub converged: bool,
}

pub struct SubOptimizerBridge<'a, D> {
    optimizer: &'a dyn ContinuousOptimizer,
    init: Option<&'a SubOptimInit<D>>,
}

impl<D> Clone for SubOptimizerBridge<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for SubOptimizerBridge<'_, D> {}

impl<'a, D> SubOptimizerBridge<'a, D> {
    pub fn new(optimizer: &'a dyn ContinuousOptimizer, init: Option<&'a SubOptimInit<D>>) -> Self {
        Self { optimizer, init }
    }

    pub fn optimizer_name(&self) -> &'static str {
        self.optimizer.name()
    }

    /// Minimizes the objective over `coords`, every other coordinate fixed at
    /// zero.
    pub fn fit(
        &self,
        objective: &Objective<D>,
        data: &D,
        coords: &[usize],
        warm: ArrayView1<f64>,
    ) -> SubFit {
        let zeros = Array1::zeros(warm.len());
        if coords.is_empty() {
            let loss = objective.value(zeros.view(), data);
            return SubFit {
                params: zeros,
                loss: finite_or_infinity(loss),
                converged: loss.is_finite(),
            };
        }

        let restricted = objective.restrict(data, zeros.view(), coords);
        let start = self.starting_point(&restricted, data, coords, warm);
        let outcome = self.optimizer.minimize(&restricted, start);

        let params = restricted.embed(outcome.point.view());
        if !params.iter().all(|v| v.is_finite()) || !outcome.value.is_finite() {
            return SubFit {
                params: Array1::zeros(warm.len()),
                loss: f64::INFINITY,
                converged: false,
            };
        }
        SubFit {
            params,
            loss: outcome.value,
            converged: outcome.converged,
        }
    }

    fn starting_point(
        &self,
        restricted: &Restricted<'_, D>,
        data: &D,
        coords: &[usize],
        warm: ArrayView1<f64>,
    ) -> Array1<f64> {
        let fallback = || restricted.project(warm);
        match self.init {
            Some(init) => {
                let proposed = init(warm, data, coords);
                if proposed.len() == coords.len() && proposed.iter().all(|v| v.is_finite()) {
                    proposed
                } else {
                    log::warn!(
                        "Sub-problem initializer returned {} values for {} coordinates; using warm parameters.",
                        proposed.len(),
                        coords.len()
                    );
                    fallback()
                }
            }
            None => fallback(),
        }
    }
}

pub(crate) fn finite_or_infinity(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::sync::{Arc, Mutex};

    fn bowl() -> Objective<()> {
        // (x0 - 1)^2 + 4 (x1 + 2)^2 + (x2 - 3)^2 + x0 x1 / 2
        Objective::callables(
            |x: ArrayView1<f64>, _: &()| {
                (x[0] - 1.0).powi(2)
                    + 4.0 * (x[1] + 2.0).powi(2)
                    + (x[2] - 3.0).powi(2)
                    + 0.5 * x[0] * x[1]
            },
            |x: ArrayView1<f64>, _: &()| {
                array![
                    2.0 * (x[0] - 1.0) + 0.5 * x[1],
                    8.0 * (x[1] + 2.0) + 0.5 * x[0],
                    2.0 * (x[2] - 3.0)
                ]
            },
        )
    }

    fn optimizers() -> Vec<Box<dyn ContinuousOptimizer>> {
        vec![
            Box::new(QuasiNewton {
                tolerance: 1e-10,
                max_iterations: 200,
            }),
            Box::new(Newton {
                tolerance: 1e-10,
                max_iterations: 50,
            }),
        ]
    }

    #[test]
    fn restricted_fit_zeroes_inactive_coordinates() {
        let objective = bowl();
        for optimizer in optimizers() {
            let bridge = SubOptimizerBridge::new(optimizer.as_ref(), None);
            let fit = bridge.fit(&objective, &(), &[2], array![5.0, 5.0, 0.0].view());
            assert_eq!(fit.params[0], 0.0);
            assert_eq!(fit.params[1], 0.0);
            assert_abs_diff_eq!(fit.params[2], 3.0, epsilon = 1e-5);
            assert_abs_diff_eq!(fit.loss, 1.0 + 16.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn coupled_coordinates_reach_the_joint_minimum() {
        let objective = bowl();
        // Stationarity: 2(x0 - 1) + x1/2 = 0 and 8(x1 + 2) + x0/2 = 0.
        let det = 2.0 * 8.0 - 0.25;
        let x0 = (2.0 * 8.0 + 0.5 * 16.0) / det;
        let x1 = (2.0 * -16.0 - 0.5 * 2.0) / det;
        for optimizer in optimizers() {
            let bridge = SubOptimizerBridge::new(optimizer.as_ref(), None);
            let fit = bridge.fit(&objective, &(), &[0, 1], Array1::zeros(3).view());
            assert_abs_diff_eq!(fit.params[0], x0, epsilon = 1e-5);
            assert_abs_diff_eq!(fit.params[1], x1, epsilon = 1e-5);
            assert_eq!(fit.params[2], 0.0);
        }
    }

    #[test]
    fn empty_support_evaluates_at_zero() {
        let objective = bowl();
        let optimizer = Newton {
            tolerance: 1e-8,
            max_iterations: 10,
        };
        let bridge = SubOptimizerBridge::new(&optimizer, None);
        let fit = bridge.fit(&objective, &(), &[], array![1.0, 1.0, 1.0].view());
        assert_eq!(fit.params, Array1::<f64>::zeros(3));
        assert_abs_diff_eq!(fit.loss, 1.0 + 16.0 + 9.0, epsilon = 1e-12);
        assert!(fit.converged);
    }

    #[test]
    fn non_finite_loss_is_recorded_as_infinity() {
        let objective: Objective<()> = Objective::callables(
            |_: ArrayView1<f64>, _: &()| f64::NAN,
            |x: ArrayView1<f64>, _: &()| Array1::zeros(x.len()),
        );
        let optimizer = QuasiNewton {
            tolerance: 1e-8,
            max_iterations: 5,
        };
        let bridge = SubOptimizerBridge::new(&optimizer, None);
        let fit = bridge.fit(&objective, &(), &[0], Array1::zeros(2).view());
        assert_eq!(fit.loss, f64::INFINITY);
        assert!(!fit.converged);
    }

    #[test]
    fn injected_initializer_supplies_the_start() {
        let objective = bowl();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let init: Box<SubOptimInit<()>> = Box::new(move |warm, _, coords| {
            recorder.lock().unwrap().push(coords.to_vec());
            coords.iter().map(|&c| warm[c] + 1.0).collect::<Array1<f64>>()
        });
        let optimizer = Newton {
            tolerance: 1e-10,
            max_iterations: 50,
        };
        let bridge = SubOptimizerBridge::new(&optimizer, Some(init.as_ref()));
        let fit = bridge.fit(&objective, &(), &[2], Array1::zeros(3).view());
        assert_abs_diff_eq!(fit.params[2], 3.0, epsilon = 1e-6);
        assert_eq!(seen.lock().unwrap().as_slice(), &[vec![2]]);
    }

    #[test]
    fn auto_prefers_newton_only_with_a_hessian() {
        let config = SubOptimizerConfig::default();
        assert_eq!(default_optimizer(&config, true).name(), "newton");
        assert_eq!(default_optimizer(&config, false).name(), "quasi-newton");
        let forced = SubOptimizerConfig {
            kind: OptimizerKind::QuasiNewton,
            ..SubOptimizerConfig::default()
        };
        assert_eq!(default_optimizer(&forced, true).name(), "quasi-newton");
    }
}
