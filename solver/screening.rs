//! Pre-search screening: shrink the universe to the groups that look most
//! useful from the forced-only fit.

use crate::config::ConfigError;
use crate::importance::forward_scores;
use crate::problem::Problem;
use ndarray::Array1;
use std::cmp::Ordering;

/// Keeps the forced groups plus the `screening_size − |forced|` other groups
/// with the highest forward importance at the forced-only fit. Returns the
/// kept groups, sorted.
pub fn screen<D>(
    problem: &Problem<'_, D>,
    screening_size: usize,
    max_size: usize,
) -> Result<Vec<usize>, ConfigError> {
    if screening_size < max_size {
        return Err(ConfigError::ScreeningTooSmall {
            screening_size,
            max_size,
        });
    }
    let fit = problem.fit(problem.forced, Array1::zeros(problem.n_features()).view());
    let others = problem.inactive(problem.forced);
    let scores = forward_scores(problem, &others, fit.params.view());

    let mut ranked: Vec<(usize, f64)> = others.into_iter().zip(scores).collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    let room = screening_size.saturating_sub(problem.forced.len());
    let mut kept: Vec<usize> = problem.forced.to_vec();
    kept.extend(ranked.into_iter().take(room).map(|(g, _)| g));
    kept.sort_unstable();
    log::info!(
        "Screening kept {} of {} groups.",
        kept.len(),
        problem.universe.len()
    );
    Ok(kept)
}
