//! # Objective Adapter
//!
//! A loss reaches the search through one of three provisioning modes, kept as a
//! tagged enum so nothing downstream needs to know which one is active:
//!
//! - [`Objective::Expression`]: only the loss value is supplied. Gradients and
//!   curvature blocks are derived numerically (central differences through
//!   `finitediff`).
//! - [`Objective::Callables`]: value and gradient callables, plus an optional
//!   hessian callable. Without one, the bridge switches to quasi-Newton.
//! - [`Objective::Compiled`]: an externally built objective behind the
//!   [`CompiledObjective`] trait (a foreign library, a code-generated kernel,
//!   a process boundary).
//!
//! Every mode evaluates on a full-length parameter vector and a data slice of
//! type `D`. Data-free losses use `D = ()`.

use finitediff::FiniteDiff;
use ndarray::{Array1, Array2, ArrayView1};

pub type ValueFn<D> = dyn Fn(ArrayView1<'_, f64>, &D) -> f64 + Send + Sync;
pub type GradientFn<D> = dyn Fn(ArrayView1<'_, f64>, &D) -> Array1<f64> + Send + Sync;
pub type HessianFn<D> = dyn Fn(ArrayView1<'_, f64>, &D) -> Array2<f64> + Send + Sync;

/// Contract for objectives evaluated outside this crate's closures.
pub trait CompiledObjective<D>: Send + Sync {
    fn value(&self, params: ArrayView1<'_, f64>, data: &D) -> f64;

    fn gradient(&self, params: ArrayView1<'_, f64>, data: &D) -> Array1<f64>;

    /// Full hessian, or `None` when the objective only has first-order
    /// information.
    fn hessian(&self, params: ArrayView1<'_, f64>, data: &D) -> Option<Array2<f64>>;

    fn has_hessian(&self) -> bool {
        false
    }
}

pub enum Objective<D> {
    Expression(Box<ValueFn<D>>),
    Callables {
        value: Box<ValueFn<D>>,
        gradient: Box<GradientFn<D>>,
        hessian: Option<Box<HessianFn<D>>>,
    },
    Compiled(Box<dyn CompiledObjective<D>>),
}

impl<D> Objective<D> {
    pub fn expression<F>(value: F) -> Self
    where
        F: Fn(ArrayView1<'_, f64>, &D) -> f64 + Send + Sync + 'static,
    {
        Objective::Expression(Box::new(value))
    }

    pub fn callables<F, G>(value: F, gradient: G) -> Self
    where
        F: Fn(ArrayView1<'_, f64>, &D) -> f64 + Send + Sync + 'static,
        G: Fn(ArrayView1<'_, f64>, &D) -> Array1<f64> + Send + Sync + 'static,
    {
        Objective::Callables {
            value: Box::new(value),
            gradient: Box::new(gradient),
            hessian: None,
        }
    }

    pub fn compiled<C>(objective: C) -> Self
    where
        C: CompiledObjective<D> + 'static,
    {
        Objective::Compiled(Box::new(objective))
    }

    /// Attaches a hessian callable. Only meaningful for the callables mode;
    /// other modes are returned untouched.
    pub fn with_hessian<H>(self, hessian: H) -> Self
    where
        H: Fn(ArrayView1<'_, f64>, &D) -> Array2<f64> + Send + Sync + 'static,
    {
        match self {
            Objective::Callables {
                value, gradient, ..
            } => Objective::Callables {
                value,
                gradient,
                hessian: Some(Box::new(hessian)),
            },
            other => other,
        }
    }

    /// Drops a hessian callable, for solvers that only use first-order steps.
    pub fn without_hessian(self) -> Self {
        match self {
            Objective::Callables {
                value, gradient, ..
            } => Objective::Callables {
                value,
                gradient,
                hessian: None,
            },
            other => other,
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Objective::Expression(_) => "expression",
            Objective::Callables { .. } => "callables",
            Objective::Compiled(_) => "compiled",
        }
    }

    /// True when the caller handed over a hessian callable explicitly.
    pub fn supplies_hessian_callable(&self) -> bool {
        matches!(
            self,
            Objective::Callables {
                hessian: Some(_),
                ..
            }
        )
    }

    /// True when an analytic hessian is available in any mode.
    pub fn provides_hessian(&self) -> bool {
        match self {
            Objective::Expression(_) => false,
            Objective::Callables { hessian, .. } => hessian.is_some(),
            Objective::Compiled(inner) => inner.has_hessian(),
        }
    }

    pub fn value(&self, params: ArrayView1<f64>, data: &D) -> f64 {
        match self {
            Objective::Expression(value) => value(params, data),
            Objective::Callables { value, .. } => value(params, data),
            Objective::Compiled(inner) => inner.value(params, data),
        }
    }

    pub fn gradient(&self, params: ArrayView1<f64>, data: &D) -> Array1<f64> {
        match self {
            Objective::Expression(value) => {
                let point = params.to_vec();
                let f = |x: &Vec<f64>| value(ArrayView1::from(x.as_slice()), data);
                Array1::from(point.central_diff(&f))
            }
            Objective::Callables { gradient, .. } => gradient(params, data),
            Objective::Compiled(inner) => inner.gradient(params, data),
        }
    }

    /// Analytic hessian, if the active mode has one.
    pub fn hessian(&self, params: ArrayView1<f64>, data: &D) -> Option<Array2<f64>> {
        match self {
            Objective::Expression(_) => None,
            Objective::Callables { hessian, .. } => hessian.as_ref().map(|h| h(params, data)),
            Objective::Compiled(inner) => {
                if inner.has_hessian() {
                    inner.hessian(params, data)
                } else {
                    None
                }
            }
        }
    }

    /// View of the objective as a function of `coords` only; every other
    /// coordinate is held at its value in `base`.
    pub fn restrict<'a>(
        &'a self,
        data: &'a D,
        base: ArrayView1<'a, f64>,
        coords: &'a [usize],
    ) -> Restricted<'a, D> {
        Restricted {
            objective: self,
            data,
            base,
            coords,
        }
    }

    /// Diagonal curvature blocks `H[b, b]` at `params`, one per coordinate block.
    ///
    /// With an analytic hessian the full matrix is formed once and sliced;
    /// otherwise each block is differentiated on its own.
    pub fn curvature_blocks(
        &self,
        params: ArrayView1<f64>,
        data: &D,
        blocks: &[&[usize]],
    ) -> Vec<Array2<f64>> {
        if let Some(full) = self.hessian(params, data) {
            return blocks.iter().map(|b| slice_block(&full, b)).collect();
        }
        let base = params.to_owned();
        blocks
            .iter()
            .map(|b| {
                let restricted = self.restrict(data, base.view(), b);
                let point = restricted.project(base.view());
                restricted.derived_hessian(point.view())
            })
            .collect()
    }
}

/// An objective seen through a subset of its coordinates.
pub struct Restricted<'a, D> {
    objective: &'a Objective<D>,
    data: &'a D,
    base: ArrayView1<'a, f64>,
    coords: &'a [usize],
}

impl<D> Restricted<'_, D> {
    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    pub fn coords(&self) -> &[usize] {
        self.coords
    }

    /// Full-length vector equal to `base` except on the restricted coordinates.
    pub fn embed(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let mut full = self.base.to_owned();
        for (k, &c) in self.coords.iter().enumerate() {
            full[c] = x[k];
        }
        full
    }

    pub fn project(&self, full: ArrayView1<f64>) -> Array1<f64> {
        self.coords.iter().map(|&c| full[c]).collect()
    }

    pub fn value(&self, x: ArrayView1<f64>) -> f64 {
        let full = self.embed(x);
        self.objective.value(full.view(), self.data)
    }

    pub fn gradient(&self, x: ArrayView1<f64>) -> Array1<f64> {
        match self.objective {
            Objective::Expression(value) => {
                let point = x.to_vec();
                let f = |v: &Vec<f64>| {
                    let full = self.embed(ArrayView1::from(v.as_slice()));
                    value(full.view(), self.data)
                };
                Array1::from(point.central_diff(&f))
            }
            _ => {
                let full = self.embed(x);
                let g = self.objective.gradient(full.view(), self.data);
                self.project(g.view())
            }
        }
    }

    /// Analytic restricted hessian, when the objective has one.
    pub fn hessian(&self, x: ArrayView1<f64>) -> Option<Array2<f64>> {
        let full = self.embed(x);
        self.objective
            .hessian(full.view(), self.data)
            .map(|h| slice_block(&h, self.coords))
    }

    /// Restricted hessian derived numerically and symmetrized.
    ///
    /// With an analytic gradient, the gradient is differenced once through
    /// `finitediff`. Value-only expressions are differenced twice directly on
    /// the loss with a fourth-root step, since nesting two square-root-step
    /// difference schemes loses all precision.
    pub fn derived_hessian(&self, x: ArrayView1<f64>) -> Array2<f64> {
        let n = self.dim();
        if n == 0 {
            return Array2::zeros((0, 0));
        }
        let h = match self.objective {
            Objective::Expression(_) => self.second_differences(x),
            _ => {
                let point = x.to_vec();
                let g = |v: &Vec<f64>| self.gradient(ArrayView1::from(v.as_slice())).to_vec();
                let rows = point.central_hessian(&g);
                Array2::from_shape_fn((n, n), |(i, j)| rows[i][j])
            }
        };
        (&h + &h.t()) * 0.5
    }

    fn second_differences(&self, x: ArrayView1<f64>) -> Array2<f64> {
        let n = self.dim();
        let step = f64::EPSILON.powf(0.25);
        let f0 = self.value(x);
        let shifted = |moves: &[(usize, f64)]| {
            let mut v = x.to_owned();
            for &(i, delta) in moves {
                v[i] += delta;
            }
            self.value(v.view())
        };
        let mut h = Array2::zeros((n, n));
        for i in 0..n {
            let hi = step * x[i].abs().max(1.0);
            let plus = shifted(&[(i, hi)]);
            let minus = shifted(&[(i, -hi)]);
            h[(i, i)] = (plus - 2.0 * f0 + minus) / (hi * hi);
            for j in 0..i {
                let hj = step * x[j].abs().max(1.0);
                let pp = shifted(&[(i, hi), (j, hj)]);
                let pm = shifted(&[(i, hi), (j, -hj)]);
                let mp = shifted(&[(i, -hi), (j, hj)]);
                let mm = shifted(&[(i, -hi), (j, -hj)]);
                let value = (pp - pm - mp + mm) / (4.0 * hi * hj);
                h[(i, j)] = value;
                h[(j, i)] = value;
            }
        }
        h
    }
}

fn slice_block(full: &Array2<f64>, coords: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((coords.len(), coords.len()), |(i, j)| {
        full[(coords[i], coords[j])]
    })
}
