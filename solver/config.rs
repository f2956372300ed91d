// solver/config.rs

//! # Solver Configuration
//!
//! Everything a caller can tune about a `solve` lives in [`SolverConfig`]. The
//! struct is plain data: it can be built in code, or deserialized from a TOML
//! file with the same field names the CLI accepts. Validation that needs only
//! the configuration itself happens in [`SolverConfig::validate`]; checks that
//! depend on the objective or the data set are performed by the facade right
//! before the search starts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::groups::GroupLayout;

/// Configuration errors. All of them are raised before any search starts and
/// describe the constraint that was violated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("n_features must be at least 1.")]
    NoFeatures,

    #[error("The group mapping has {found} entries, but n_features is {expected}.")]
    GroupLengthMismatch { expected: usize, found: usize },

    #[error(
        "Group ids must cover 0..{n_groups} without gaps; group {missing} has no coordinates."
    )]
    GroupIdsNotContiguous { n_groups: usize, missing: usize },

    #[error("always_select index {index} is out of range for {n_features} features.")]
    AlwaysSelectOutOfRange { index: usize, n_features: usize },

    #[error("No candidate support sizes were configured.")]
    EmptySizes,

    #[error("Invalid size bounds: lower bound {lower} exceeds upper bound {upper}.")]
    InvalidBounds { lower: usize, upper: usize },

    #[error("Candidate support size {size} exceeds the number of groups ({max}).")]
    SizeOutOfRange { size: usize, max: usize },

    #[error(
        "always_select forces {forced} groups into every support, but the smallest candidate size is {min_size}."
    )]
    InfeasibleAlwaysSelect { forced: usize, min_size: usize },

    #[error(
        "screening_size {screening_size} is smaller than the largest candidate support size {max_size}."
    )]
    ScreeningTooSmall { screening_size: usize, max_size: usize },

    #[error("The number of folds must be at least 1, got {0}.")]
    InvalidFoldCount(usize),

    #[error("Cross-validation with {folds} folds needs at least {folds} samples, found {samples}.")]
    TooFewSamplesForFolds { folds: usize, samples: usize },

    #[error("Cross-validation needs a data set with a sample count; the objective is data-free.")]
    CrossValidationNeedsData,

    #[error("cv_fold_id has {found} entries, but there are {expected} samples.")]
    FoldAssignmentLength { expected: usize, found: usize },

    #[error("cv_fold_id[{index}] = {fold} is outside [0, {folds}).")]
    FoldIdOutOfRange { index: usize, fold: usize, folds: usize },

    #[error("cv_fold_id is set, but cv is 1; fold ids need cv > 1.")]
    FoldIdsWithoutCrossValidation,

    #[error("Fold {0} receives no samples.")]
    EmptyFold(usize),

    #[error("sample_size is {configured}, but the data set has {found} samples.")]
    SampleSizeMismatch { configured: usize, found: usize },

    #[error("The {ic} criterion needs a sample size of at least {required}, found {found}.")]
    SampleSizeTooSmall {
        ic: &'static str,
        required: usize,
        found: usize,
    },

    #[error(
        "A hessian callable was supplied, but the {algorithm} solver never uses second-order information."
    )]
    UnusedHessian { algorithm: &'static str },

    #[error("Initial support group {group} is out of range for {n_groups} groups.")]
    InitialSupportOutOfRange { group: usize, n_groups: usize },

    #[error("Initial parameters have length {found}, but n_features is {expected}.")]
    InitialParamsLength { expected: usize, found: usize },

    #[error("The setting '{name}' must be a positive finite number, got {value}.")]
    NonPositiveSetting { name: &'static str, value: f64 },

    #[error("Failed to read configuration file: {0}")]
    Io(String),

    #[error("Failed to parse TOML configuration: {0}")]
    Toml(String),
}

/// Which local-search family explores supports of a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Swap active/inactive groups ranked by second-order importance.
    #[default]
    Splicing,
    /// Iterative hard thresholding of gradient steps.
    Iht,
    /// Gradient hard thresholding pursuit: threshold, then refit on the support.
    Grahtp,
    /// Gradient support pursuit: merge the top-2k gradient groups, refit, prune.
    Grasp,
    /// Greedy forward selection by gradient magnitude.
    Omp,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Splicing => "splicing",
            Algorithm::Iht => "iht",
            Algorithm::Grahtp => "grahtp",
            Algorithm::Grasp => "grasp",
            Algorithm::Omp => "omp",
        }
    }
}

/// How candidate support sizes are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    /// Every size, in increasing order.
    #[default]
    Sequential,
    /// Golden-section narrowing over the ordered sizes.
    Gs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IcType {
    #[default]
    Aic,
    Bic,
    Gic,
    Ebic,
}

impl IcType {
    pub fn name(self) -> &'static str {
        match self {
            IcType::Aic => "aic",
            IcType::Bic => "bic",
            IcType::Gic => "gic",
            IcType::Ebic => "ebic",
        }
    }
}

/// Exchange-size schedule across splicing iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SplicingType {
    /// Every iteration starts from `max_exchange_num` swaps.
    #[default]
    Fixed,
    /// The starting exchange size halves after each iteration.
    Taper,
}

/// Which continuous optimizer solves the sub-problem on a fixed support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizerKind {
    /// Newton when the objective provides a hessian, quasi-Newton otherwise.
    #[default]
    Auto,
    QuasiNewton,
    Newton,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SubOptimizerConfig {
    pub kind: OptimizerKind,
    /// Gradient-norm tolerance handed to the continuous optimizer.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SubOptimizerConfig {
    fn default() -> Self {
        Self {
            kind: OptimizerKind::Auto,
            tolerance: 1e-8,
            max_iterations: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub n_features: usize,
    /// Explicit candidate sizes (in groups). Takes precedence over the bounds.
    pub sparsity: Option<Vec<usize>>,
    pub gs_lower_bound: Option<usize>,
    pub gs_upper_bound: Option<usize>,
    /// Sample count used by the information criteria when the data set cannot
    /// report one (data-free losses).
    pub sample_size: Option<usize>,
    pub algorithm: Algorithm,
    pub path_type: PathType,
    pub ic_type: IcType,
    pub ic_coef: f64,
    /// Number of folds; 1 selects by information criterion.
    pub cv: usize,
    pub cv_fold_id: Option<Vec<usize>>,
    /// Shuffle samples with this seed before contiguous fold assignment.
    pub cv_shuffle_seed: Option<u64>,
    /// Group id of every coordinate; singleton groups when absent.
    pub group: Option<Vec<usize>>,
    /// Coordinates whose groups belong to every support.
    pub always_select: Vec<usize>,
    /// Number of groups kept by screening. `None` or 0 disables it.
    pub screening_size: Option<usize>,
    pub splicing_type: SplicingType,
    /// Inactive groups considered per splicing iteration; 0 means all of them.
    pub important_search: usize,
    pub max_exchange_num: usize,
    pub max_iter: usize,
    pub splicing_tolerance: f64,
    /// Initial step length for the thresholded-gradient variants.
    pub step_size: f64,
    pub thread_count: usize,
    pub sub_optimizer: SubOptimizerConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            n_features: 1,
            sparsity: None,
            gs_lower_bound: None,
            gs_upper_bound: None,
            sample_size: None,
            algorithm: Algorithm::Splicing,
            path_type: PathType::Sequential,
            ic_type: IcType::Aic,
            ic_coef: 1.0,
            cv: 1,
            cv_fold_id: None,
            cv_shuffle_seed: None,
            group: None,
            always_select: Vec::new(),
            screening_size: None,
            splicing_type: SplicingType::Fixed,
            important_search: 128,
            max_exchange_num: 5,
            max_iter: 20,
            splicing_tolerance: 1e-6,
            step_size: 1.0,
            thread_count: 1,
            sub_optimizer: SubOptimizerConfig::default(),
        }
    }
}

impl SolverConfig {
    /// A configuration searching exactly one support size.
    pub fn with_size(n_features: usize, size: usize) -> Self {
        Self {
            n_features,
            sparsity: Some(vec![size]),
            ..Self::default()
        }
    }

    /// A configuration searching the given candidate sizes.
    pub fn with_sizes(n_features: usize, sizes: Vec<usize>) -> Self {
        Self {
            n_features,
            sparsity: Some(sizes),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Builds the coordinate universe described by `n_features` and `group`.
    pub fn layout(&self) -> Result<GroupLayout, ConfigError> {
        match &self.group {
            Some(assignment) => GroupLayout::from_assignment(assignment, self.n_features),
            None => GroupLayout::singletons(self.n_features),
        }
    }

    /// Resolves the ordered, de-duplicated list of candidate sizes in groups.
    ///
    /// `sample_size` is the count used for the default upper bound; `forced` is
    /// the number of always-selected groups.
    pub fn candidate_sizes(
        &self,
        n_groups: usize,
        forced: usize,
        sample_size: usize,
    ) -> Result<Vec<usize>, ConfigError> {
        let mut sizes = match &self.sparsity {
            Some(list) => list.clone(),
            None => {
                let lower = self.gs_lower_bound.unwrap_or(forced);
                let upper = self
                    .gs_upper_bound
                    .unwrap_or_else(|| default_upper_bound(n_groups, sample_size).max(lower));
                if lower > upper {
                    return Err(ConfigError::InvalidBounds { lower, upper });
                }
                (lower..=upper).collect()
            }
        };
        sizes.sort_unstable();
        sizes.dedup();

        let (Some(&min_size), Some(&max_size)) = (sizes.first(), sizes.last()) else {
            return Err(ConfigError::EmptySizes);
        };
        if max_size > n_groups {
            return Err(ConfigError::SizeOutOfRange {
                size: max_size,
                max: n_groups,
            });
        }
        if forced > min_size {
            return Err(ConfigError::InfeasibleAlwaysSelect { forced, min_size });
        }
        Ok(sizes)
    }

    /// Screening budget, or `None` when screening is disabled.
    pub fn effective_screening(&self, n_groups: usize) -> Option<usize> {
        match self.screening_size {
            Some(size) if size > 0 && size < n_groups => Some(size),
            _ => None,
        }
    }

    /// Checks everything that does not depend on the objective or the data.
    pub fn validate(&self) -> Result<GroupLayout, ConfigError> {
        let layout = self.layout()?;
        for &index in &self.always_select {
            if index >= self.n_features {
                return Err(ConfigError::AlwaysSelectOutOfRange {
                    index,
                    n_features: self.n_features,
                });
            }
        }
        if self.cv == 0 {
            return Err(ConfigError::InvalidFoldCount(0));
        }
        if self.cv == 1 && self.cv_fold_id.is_some() {
            return Err(ConfigError::FoldIdsWithoutCrossValidation);
        }
        for (name, value) in [
            ("ic_coef", self.ic_coef),
            ("step_size", self.step_size),
            ("sub_optimizer.tolerance", self.sub_optimizer.tolerance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositiveSetting { name, value });
            }
        }
        if !(self.splicing_tolerance.is_finite() && self.splicing_tolerance >= 0.0) {
            return Err(ConfigError::NonPositiveSetting {
                name: "splicing_tolerance",
                value: self.splicing_tolerance,
            });
        }
        Ok(layout)
    }
}

/// Default largest support size: `n / (ln p · ln ln n)` groups, capped by the
/// group count. Data-free problems (fewer than three samples) may use every
/// group.
fn default_upper_bound(n_groups: usize, sample_size: usize) -> usize {
    if sample_size < 3 {
        return n_groups;
    }
    let n = sample_size as f64;
    let p = (n_groups.max(2)) as f64;
    let denom = p.ln() * n.ln().ln();
    let bound = if denom > 0.0 { (n / denom).floor() } else { n };
    (bound as usize).clamp(1, n_groups.max(1)).min(n_groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_sizes_are_sorted_and_deduplicated() {
        let config = SolverConfig::with_sizes(10, vec![3, 0, 3, 1]);
        let sizes = config.candidate_sizes(10, 0, 100).unwrap();
        assert_eq!(sizes, vec![0, 1, 3]);
    }

    #[test]
    fn bounds_produce_inclusive_range() {
        let config = SolverConfig {
            n_features: 8,
            gs_lower_bound: Some(2),
            gs_upper_bound: Some(4),
            ..SolverConfig::default()
        };
        assert_eq!(config.candidate_sizes(8, 0, 50).unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let config = SolverConfig {
            n_features: 8,
            gs_lower_bound: Some(5),
            gs_upper_bound: Some(2),
            ..SolverConfig::default()
        };
        assert_eq!(
            config.candidate_sizes(8, 0, 50),
            Err(ConfigError::InvalidBounds { lower: 5, upper: 2 })
        );
    }

    #[test]
    fn oversized_candidates_are_rejected() {
        let config = SolverConfig::with_sizes(4, vec![2, 5]);
        assert_eq!(
            config.candidate_sizes(4, 0, 50),
            Err(ConfigError::SizeOutOfRange { size: 5, max: 4 })
        );
    }

    #[test]
    fn always_select_larger_than_smallest_size_is_infeasible() {
        let config = SolverConfig::with_sizes(6, vec![1, 3]);
        assert_eq!(
            config.candidate_sizes(6, 2, 50),
            Err(ConfigError::InfeasibleAlwaysSelect {
                forced: 2,
                min_size: 1
            })
        );
    }

    #[test]
    fn default_bounds_start_at_forced_count() {
        let config = SolverConfig {
            n_features: 6,
            ..SolverConfig::default()
        };
        let sizes = config.candidate_sizes(6, 2, 1).unwrap();
        assert_eq!(sizes, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn default_upper_bound_respects_sample_size() {
        assert_eq!(default_upper_bound(10, 1), 10);
        let bound = default_upper_bound(100, 200);
        assert!(bound >= 1 && bound <= 100);
        assert!(default_upper_bound(3, 10_000) <= 3);
    }

    #[test]
    fn screening_zero_or_full_is_disabled() {
        let mut config = SolverConfig::with_size(10, 2);
        assert_eq!(config.effective_screening(10), None);
        config.screening_size = Some(0);
        assert_eq!(config.effective_screening(10), None);
        config.screening_size = Some(10);
        assert_eq!(config.effective_screening(10), None);
        config.screening_size = Some(4);
        assert_eq!(config.effective_screening(10), Some(4));
    }

    #[test]
    fn validate_rejects_out_of_range_always_select() {
        let config = SolverConfig {
            n_features: 3,
            always_select: vec![3],
            ..SolverConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::AlwaysSelectOutOfRange {
                index: 3,
                n_features: 3
            }
        );
    }

    #[test]
    fn fold_ids_without_folds_are_rejected() {
        let config = SolverConfig {
            cv_fold_id: Some(vec![0, 1, 0, 1]),
            ..SolverConfig::with_size(4, 1)
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::FoldIdsWithoutCrossValidation
        );
        let with_folds = SolverConfig { cv: 2, ..config };
        assert!(with_folds.validate().is_ok());
    }

    #[test]
    fn toml_round_trip_keeps_settings() {
        let text = r#"
            n_features = 12
            sparsity = [0, 2, 4]
            path_type = "gs"
            ic_type = "ebic"
            splicing_type = "taper"
            always_select = [1]

            [sub_optimizer]
            kind = "quasi-newton"
            max_iterations = 50
        "#;
        let config = SolverConfig::from_toml_str(text).unwrap();
        assert_eq!(config.n_features, 12);
        assert_eq!(config.path_type, PathType::Gs);
        assert_eq!(config.ic_type, IcType::Ebic);
        assert_eq!(config.splicing_type, SplicingType::Taper);
        assert_eq!(config.sub_optimizer.kind, OptimizerKind::QuasiNewton);
        assert_eq!(config.sub_optimizer.max_iterations, 50);

        let rendered = config.to_toml_string().unwrap();
        let reparsed = SolverConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SolverConfig::from_toml_str("n_features = 3\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
