//! # Path Search
//!
//! Walks the ordered candidate sizes. The sequential path scores every size;
//! the golden-section path narrows a bracket of size indices by comparing two
//! interior points, then scores the remaining bracket (at most three sizes)
//! exhaustively. Scores are memoized, so a size is never explored twice.
//!
//! A [`Lane`] is one data slice (the full data, or one training fold) with its
//! own warm-start cache: each new size starts from the evaluated size nearest
//! to it.

use crate::config::PathType;
use crate::importance::threshold_support;
use crate::problem::{CandidateModel, Problem, StartPoint, SupportExplorer};
use ndarray::Array1;
use std::collections::BTreeMap;

/// Interior point offset of a golden-section step, as a fraction of the bracket.
const GOLDEN_OFFSET: f64 = 0.381_966_011_250_105;

/// Produces the selection score of a support size. Lower is better.
pub trait SizeOracle {
    fn score(&mut self, size: usize) -> f64;
}

/// Returns the index into `sizes` of the best-scoring size. Ties go to the
/// smaller size; non-finite scores never beat finite ones.
pub fn search_sizes(oracle: &mut dyn SizeOracle, sizes: &[usize], path: PathType) -> Option<usize> {
    if sizes.is_empty() {
        return None;
    }
    let mut memo: BTreeMap<usize, f64> = BTreeMap::new();
    let mut visit = |index: usize, memo: &mut BTreeMap<usize, f64>| -> f64 {
        *memo.entry(index).or_insert_with(|| {
            let score = oracle.score(sizes[index]);
            if score.is_nan() { f64::INFINITY } else { score }
        })
    };

    match path {
        PathType::Sequential => {
            for index in 0..sizes.len() {
                visit(index, &mut memo);
            }
        }
        PathType::Gs => {
            let (mut lo, mut hi) = (0, sizes.len() - 1);
            while hi - lo > 2 {
                let offset = ((GOLDEN_OFFSET * (hi - lo) as f64).floor() as usize).max(1);
                let (a, b) = (lo + offset, hi - offset);
                let (score_a, score_b) = (visit(a, &mut memo), visit(b, &mut memo));
                log::debug!(
                    "Golden-section bracket [{}, {}]: size {} -> {:.6}, size {} -> {:.6}",
                    sizes[lo],
                    sizes[hi],
                    sizes[a],
                    score_a,
                    sizes[b],
                    score_b
                );
                if score_a <= score_b {
                    hi = b;
                } else {
                    lo = a;
                }
            }
            for index in lo..=hi {
                visit(index, &mut memo);
            }
        }
    }

    // BTreeMap iterates in index order, so the first minimum is the smallest size.
    memo.into_iter()
        .fold(None::<(usize, f64)>, |best, (index, score)| match best {
            Some((_, top)) if top <= score => best,
            _ => Some((index, score)),
        })
        .map(|(index, _)| index)
}

/// The starting point a lane uses before it has evaluated any size.
#[derive(Debug, Clone)]
pub enum WarmStart {
    Cold,
    /// Groups to start from; resized by the explorer.
    Support(Vec<usize>),
    /// Parameters thresholded by group norm to each requested size.
    Params(Array1<f64>),
}

pub struct Lane<'a, D> {
    pub problem: Problem<'a, D>,
    seed: WarmStart,
    evaluated: BTreeMap<usize, CandidateModel>,
}

impl<'a, D> Lane<'a, D> {
    pub fn new(problem: Problem<'a, D>, seed: WarmStart) -> Self {
        Self {
            problem,
            seed,
            evaluated: BTreeMap::new(),
        }
    }

    pub fn model(&self, size: usize) -> Option<&CandidateModel> {
        self.evaluated.get(&size)
    }

    /// Explores `size` unless it is cached, warm starting from the nearest
    /// evaluated size (the smaller one on ties).
    pub fn evaluate(&mut self, explorer: &dyn SupportExplorer<D>, size: usize) -> &CandidateModel {
        if !self.evaluated.contains_key(&size) {
            let start = self.start_for(size);
            let model = explorer.explore(&self.problem, start, size);
            self.evaluated.insert(size, model);
        }
        &self.evaluated[&size]
    }

    fn start_for(&self, size: usize) -> StartPoint {
        let below = self.evaluated.range(..size).next_back();
        let above = self.evaluated.range(size..).next();
        let nearest = match (below, above) {
            (Some((&lo, low)), Some((&hi, high))) => {
                if size - lo <= hi - size {
                    Some(low)
                } else {
                    Some(high)
                }
            }
            (Some((_, low)), None) => Some(low),
            (None, Some((_, high))) => Some(high),
            (None, None) => None,
        };
        if let Some(model) = nearest {
            return StartPoint::from(model);
        }

        let problem = &self.problem;
        match &self.seed {
            WarmStart::Cold => StartPoint::cold(problem.forced, problem.n_features()),
            WarmStart::Support(support) => StartPoint {
                support: support.clone(),
                params: Array1::zeros(problem.n_features()),
            },
            WarmStart::Params(params) => {
                let support = threshold_support(
                    problem.layout,
                    problem.universe,
                    problem.forced,
                    params.view(),
                    problem.target_size(size),
                );
                StartPoint {
                    params: problem.layout.mask(params.view(), &support),
                    support,
                }
            }
        }
    }
}
