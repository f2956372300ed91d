//! Shared search state: the problem seen by every support explorer, the start
//! point it receives, and the candidate model it returns.

use crate::config::SolverConfig;
use crate::groups::{self, GroupLayout};
use crate::objective::Objective;
use crate::suboptim::{SubFit, SubOptimizerBridge};
use ndarray::{Array1, ArrayView1};

/// One lane's view of the search: an objective on a fixed data slice, the
/// group layout, and the groups a support may draw from.
pub struct Problem<'a, D> {
    pub objective: &'a Objective<D>,
    pub data: &'a D,
    pub layout: &'a GroupLayout,
    /// Groups eligible for the support, sorted. All groups unless screened.
    pub universe: &'a [usize],
    /// Groups present in every support, sorted.
    pub forced: &'a [usize],
    pub bridge: SubOptimizerBridge<'a, D>,
    pub config: &'a SolverConfig,
}

impl<D> Clone for Problem<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for Problem<'_, D> {}

impl<'a, D> Problem<'a, D> {
    pub fn n_features(&self) -> usize {
        self.layout.n_features()
    }

    /// Support size actually searched for a requested size: never below the
    /// forced groups and never above the universe.
    pub fn target_size(&self, size: usize) -> usize {
        size.max(self.forced.len()).min(self.universe.len())
    }

    pub fn is_forced(&self, group: usize) -> bool {
        self.forced.binary_search(&group).is_ok()
    }

    /// Universe groups outside `support` (both sorted).
    pub fn inactive(&self, support: &[usize]) -> Vec<usize> {
        groups::difference(self.universe, support)
    }

    /// Fits the parameters restricted to the coordinates of `support`.
    pub fn fit(&self, support: &[usize], warm: ArrayView1<f64>) -> SubFit {
        let coords = self.layout.coordinates(support);
        self.bridge.fit(self.objective, self.data, &coords, warm)
    }

    pub fn gradient(&self, params: ArrayView1<f64>) -> Array1<f64> {
        self.objective.gradient(params, self.data)
    }

    pub fn loss(&self, params: ArrayView1<f64>) -> f64 {
        crate::suboptim::finite_or_infinity(self.objective.value(params, self.data))
    }

    pub fn candidate(
        &self,
        size: usize,
        support: Vec<usize>,
        fit: SubFit,
        iterations: usize,
    ) -> CandidateModel {
        CandidateModel {
            size,
            coordinates: self.layout.coordinates(&support),
            support,
            params: fit.params,
            loss: fit.loss,
            converged: fit.converged,
            iterations,
        }
    }
}

/// Where an explorer begins: a support of any size and full-length parameters.
#[derive(Debug, Clone)]
pub struct StartPoint {
    pub support: Vec<usize>,
    pub params: Array1<f64>,
}

impl StartPoint {
    pub fn cold(forced: &[usize], n_features: usize) -> Self {
        Self {
            support: forced.to_vec(),
            params: Array1::zeros(n_features),
        }
    }
}

impl From<&CandidateModel> for StartPoint {
    fn from(model: &CandidateModel) -> Self {
        Self {
            support: model.support.clone(),
            params: model.params.clone(),
        }
    }
}

/// The converged result of exploring one support size.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateModel {
    /// Requested size, in groups.
    pub size: usize,
    /// Selected groups, sorted.
    pub support: Vec<usize>,
    /// Coordinates of the selected groups, sorted.
    pub coordinates: Vec<usize>,
    /// Full-length parameters, zero outside `coordinates`.
    pub params: Array1<f64>,
    pub loss: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// A fixed-size support search. Every solver variant is one of these.
pub trait SupportExplorer<D>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the explorer consumes curvature information.
    fn uses_second_order(&self) -> bool;

    fn explore(&self, problem: &Problem<'_, D>, start: StartPoint, size: usize) -> CandidateModel;
}

/// Whether `trial` improves on `current` by more than `tolerance · |current|`.
/// A finite trial always beats a non-finite current loss.
pub fn improves(current: f64, trial: f64, tolerance: f64) -> bool {
    if !trial.is_finite() {
        return false;
    }
    if !current.is_finite() {
        return true;
    }
    trial < current && current - trial > tolerance * current.abs()
}
