//! Built-in generalized linear model losses over [`RegressionData`].
//!
//! Each loss is a negative log-likelihood summed over samples (not averaged),
//! so that information-criterion penalties are on the same scale as the fit
//! term. Gradients and hessians are analytic:
//!
//! - Gaussian / identity: `½‖y − Xβ‖²`, gradient `−Xᵀr`, hessian `XᵀX`.
//! - Binomial / logit: `Σ log(1 + e^η) − yη`, gradient `Xᵀ(μ − y)`, hessian
//!   `XᵀWX` with `W = μ(1 − μ)`.
//! - Poisson / log: `Σ e^η − yη`, gradient `Xᵀ(μ − y)`, hessian `XᵀWX` with
//!   `W = μ`.

use crate::data::RegressionData;
use crate::objective::Objective;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Linear predictors beyond this magnitude are clamped before exponentiation.
const ETA_LIMIT: f64 = 700.0;
/// Floor on IRLS-style weights; keeps the hessian positive definite.
const MIN_WEIGHT: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    #[default]
    Gaussian,
    Binomial,
    Poisson,
}

impl Family {
    pub fn name(self) -> &'static str {
        match self {
            Family::Gaussian => "gaussian",
            Family::Binomial => "binomial",
            Family::Poisson => "poisson",
        }
    }

    pub fn objective(self) -> Objective<RegressionData> {
        match self {
            Family::Gaussian => least_squares(),
            Family::Binomial => logistic(),
            Family::Poisson => poisson(),
        }
    }
}

fn linear_predictor(beta: ArrayView1<f64>, data: &RegressionData) -> Array1<f64> {
    data.x.dot(&beta)
}

/// `Xᵀ diag(w) X`.
fn weighted_gram(data: &RegressionData, weights: &Array1<f64>) -> Array2<f64> {
    let scaled = &data.x * &weights.view().insert_axis(Axis(1));
    data.x.t().dot(&scaled)
}

fn softplus(eta: f64) -> f64 {
    if eta > 0.0 {
        eta + (-eta).exp().ln_1p()
    } else {
        eta.exp().ln_1p()
    }
}

fn sigmoid(eta: f64) -> f64 {
    let e = eta.clamp(-ETA_LIMIT, ETA_LIMIT);
    1.0 / (1.0 + (-e).exp())
}

pub fn least_squares() -> Objective<RegressionData> {
    Objective::callables(
        |beta: ArrayView1<f64>, data: &RegressionData| {
            let r = &data.y - &linear_predictor(beta, data);
            0.5 * r.dot(&r)
        },
        |beta: ArrayView1<f64>, data: &RegressionData| {
            let r = &data.y - &linear_predictor(beta, data);
            -data.x.t().dot(&r)
        },
    )
    .with_hessian(|_: ArrayView1<f64>, data: &RegressionData| data.x.t().dot(&data.x))
}

pub fn logistic() -> Objective<RegressionData> {
    Objective::callables(
        |beta: ArrayView1<f64>, data: &RegressionData| {
            let eta = linear_predictor(beta, data);
            eta.iter()
                .zip(data.y.iter())
                .map(|(&e, &y)| softplus(e) - y * e)
                .sum()
        },
        |beta: ArrayView1<f64>, data: &RegressionData| {
            let mu = linear_predictor(beta, data).mapv(sigmoid);
            data.x.t().dot(&(&mu - &data.y))
        },
    )
    .with_hessian(|beta: ArrayView1<f64>, data: &RegressionData| {
        let w = linear_predictor(beta, data).mapv(|e| {
            let mu = sigmoid(e);
            (mu * (1.0 - mu)).max(MIN_WEIGHT)
        });
        weighted_gram(data, &w)
    })
}

pub fn poisson() -> Objective<RegressionData> {
    Objective::callables(
        |beta: ArrayView1<f64>, data: &RegressionData| {
            let eta = linear_predictor(beta, data);
            eta.iter()
                .zip(data.y.iter())
                .map(|(&e, &y)| e.min(ETA_LIMIT).exp() - y * e)
                .sum()
        },
        |beta: ArrayView1<f64>, data: &RegressionData| {
            let mu = linear_predictor(beta, data).mapv(|e| e.min(ETA_LIMIT).exp());
            data.x.t().dot(&(&mu - &data.y))
        },
    )
    .with_hessian(|beta: ArrayView1<f64>, data: &RegressionData| {
        let w = linear_predictor(beta, data).mapv(|e| e.min(ETA_LIMIT).exp().max(MIN_WEIGHT));
        weighted_gram(data, &w)
    })
}
