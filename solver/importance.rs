//! # Group Importance
//!
//! Second-order sacrifice scores drive splicing and screening:
//!
//! - backward importance of an active group `g`: the loss increase from
//!   zeroing it, `½ βᵍᵀ Hᵍᵍ βᵍ`;
//! - forward importance of an inactive group `g`: the loss decrease from a
//!   Newton step on it, `½ gᵍᵀ (Hᵍᵍ)⁻¹ gᵍ`.
//!
//! Curvature blocks come from the objective adapter, so an analytic hessian,
//! a differenced gradient and a value-only expression are all handled here
//! the same way. Ties are always broken by the smaller group id.

use crate::groups::GroupLayout;
use crate::linalg::solve_regularized;
use crate::problem::Problem;
use ndarray::{Array1, Array2, ArrayView1};
use std::cmp::Ordering;

/// Active groups ordered by increasing backward importance, and inactive
/// candidates ordered by decreasing forward importance.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    pub removable: Vec<(usize, f64)>,
    pub candidates: Vec<(usize, f64)>,
}

/// Ranks the non-forced active groups and the inactive universe groups at
/// `params`. `limit` caps the number of inactive candidates kept.
pub fn rank<D>(
    problem: &Problem<'_, D>,
    support: &[usize],
    params: ArrayView1<f64>,
    limit: Option<usize>,
) -> Ranking {
    let layout = problem.layout;
    let active: Vec<usize> = support
        .iter()
        .copied()
        .filter(|&g| !problem.is_forced(g))
        .collect();
    let inactive = problem.inactive(support);

    let gradient = if inactive.is_empty() {
        Array1::zeros(params.len())
    } else {
        problem.gradient(params)
    };
    let wanted: Vec<&[usize]> = active
        .iter()
        .chain(inactive.iter())
        .map(|&g| layout.members(g))
        .collect();
    let blocks = problem
        .objective
        .curvature_blocks(params, problem.data, &wanted);
    let (active_blocks, inactive_blocks) = blocks.split_at(active.len());

    let mut removable: Vec<(usize, f64)> = active
        .iter()
        .zip(active_blocks)
        .map(|(&g, h)| (g, backward(&slice(layout, g, params), h)))
        .collect();
    removable.sort_by(ascending);

    let mut candidates: Vec<(usize, f64)> = inactive
        .iter()
        .zip(inactive_blocks)
        .map(|(&g, h)| (g, forward(&slice(layout, g, gradient.view()), h)))
        .collect();
    candidates.sort_by(descending);
    if let Some(limit) = limit {
        candidates.truncate(limit);
    }

    Ranking {
        removable,
        candidates,
    }
}

/// Forward importance of every group in `groups` at `params`, in input order.
pub fn forward_scores<D>(
    problem: &Problem<'_, D>,
    groups: &[usize],
    params: ArrayView1<f64>,
) -> Vec<f64> {
    let layout = problem.layout;
    let gradient = problem.gradient(params);
    let wanted: Vec<&[usize]> = groups.iter().map(|&g| layout.members(g)).collect();
    problem
        .objective
        .curvature_blocks(params, problem.data, &wanted)
        .iter()
        .zip(groups)
        .map(|(h, &g)| forward(&slice(layout, g, gradient.view()), h))
        .collect()
}

/// Reshapes `support` to exactly `target` groups using second-order
/// importance at `params`: drops the least important removable groups, or
/// adds the most promising inactive ones. Forced groups are always kept.
pub fn resize_support<D>(
    problem: &Problem<'_, D>,
    support: &[usize],
    params: ArrayView1<f64>,
    target: usize,
) -> Vec<usize> {
    let mut support = with_forced(problem, support);
    if support.len() == target {
        return support;
    }
    let ranking = rank(problem, &support, params, None);
    if support.len() > target {
        let excess = support.len() - target;
        let dropped: Vec<usize> = ranking
            .removable
            .iter()
            .take(excess)
            .map(|&(g, _)| g)
            .collect();
        support.retain(|g| !dropped.contains(g));
    } else {
        let missing = target - support.len();
        support.extend(ranking.candidates.iter().take(missing).map(|&(g, _)| g));
        support.sort_unstable();
    }
    support
}

/// Forced groups plus the `target − |forced|` universe groups with the largest
/// norm in `values`.
pub fn threshold_support(
    layout: &GroupLayout,
    universe: &[usize],
    forced: &[usize],
    values: ArrayView1<f64>,
    target: usize,
) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = universe
        .iter()
        .copied()
        .filter(|g| forced.binary_search(g).is_err())
        .map(|g| (g, layout.group_norm(g, values)))
        .collect();
    scored.sort_by(descending);
    let room = target.saturating_sub(forced.len());
    let mut support: Vec<usize> = forced.to_vec();
    support.extend(scored.into_iter().take(room).map(|(g, _)| g));
    support.sort_unstable();
    support
}

/// Union of `support` (restricted to the universe) and the forced groups.
pub fn with_forced<D>(problem: &Problem<'_, D>, support: &[usize]) -> Vec<usize> {
    let mut merged: Vec<usize> = support
        .iter()
        .copied()
        .filter(|g| problem.universe.binary_search(g).is_ok())
        .chain(problem.forced.iter().copied())
        .collect();
    merged.sort_unstable();
    merged.dedup();
    merged
}

fn slice(layout: &GroupLayout, group: usize, values: ArrayView1<f64>) -> Array1<f64> {
    layout.members(group).iter().map(|&c| values[c]).collect()
}

fn backward(beta: &Array1<f64>, h: &Array2<f64>) -> f64 {
    let quadratic = 0.5 * beta.dot(&h.dot(beta));
    if quadratic.is_finite() && quadratic >= 0.0 {
        return quadratic;
    }
    let diagonal: f64 = beta
        .iter()
        .zip(h.diag())
        .map(|(b, d)| 0.5 * d.abs() * b * b)
        .sum();
    if diagonal.is_finite() { diagonal } else { 0.0 }
}

fn forward(g: &Array1<f64>, h: &Array2<f64>) -> f64 {
    if let Ok(step) = solve_regularized(h, g) {
        let quadratic = 0.5 * g.dot(&step);
        if quadratic.is_finite() && quadratic >= 0.0 {
            return quadratic;
        }
    }
    let diagonal: f64 = g
        .iter()
        .zip(h.diag())
        .map(|(gi, d)| 0.5 * gi * gi / d.abs().max(f64::EPSILON))
        .sum();
    if diagonal.is_finite() { diagonal } else { 0.0 }
}

/// Ascending by score, then by group id.
fn ascending(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    a.1.partial_cmp(&b.1)
        .unwrap_or(Ordering::Equal)
        .then(a.0.cmp(&b.0))
}

/// Descending by score, then ascending by group id.
fn descending(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then(a.0.cmp(&b.0))
}
