#![deny(dead_code)]
#![deny(unused_imports)]

//! Best-subset selection by splicing.
//!
//! Given a smooth loss over a (possibly grouped) coordinate space, find the
//! support of bounded size that minimizes it, and choose the size by an
//! information criterion or cross-validation.

pub mod config;
pub mod data;
pub mod facade;
pub mod glm;
pub mod groups;
pub mod importance;
pub mod linalg;
pub mod objective;
pub mod path;
pub mod problem;
pub mod report;
pub mod screening;
pub mod selection;
pub mod splicing;
pub mod suboptim;
pub mod synthetic;
pub mod variants;

pub use config::{
    Algorithm, ConfigError, IcType, OptimizerKind, PathType, SolverConfig, SplicingType,
    SubOptimizerConfig,
};
pub use data::{DataError, Dataset, RegressionData, load_regression_csv};
pub use facade::{PathPoint, SolveError, SolveResult, Solver};
pub use glm::Family;
pub use objective::{CompiledObjective, Objective};
pub use problem::{CandidateModel, StartPoint, SupportExplorer};
pub use report::{LogReporter, Reporter, SilentReporter};
pub use suboptim::{ContinuousOptimizer, Newton, OptimizerOutcome, QuasiNewton, SmoothProblem};
