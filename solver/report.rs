//! Progress reporting hooks. The library never installs a logger; the default
//! [`LogReporter`] forwards to the `log` facade and the binary decides where
//! that output goes.

use crate::facade::{PathPoint, SolveResult};

pub trait Reporter: Send + Sync {
    fn screened(&self, _: &[usize], _: usize) {}

    fn candidate_evaluated(&self, _: &PathPoint, _: &str) {}

    fn selected(&self, _: &SolveResult) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn screened(&self, kept: &[usize], n_groups: usize) {
        log::info!("Screening reduced {} groups to {:?}", n_groups, kept);
    }

    fn candidate_evaluated(&self, point: &PathPoint, criterion: &str) {
        log::debug!(
            "Size {:>3}: {} = {:.6}, loss = {:.6}, support = {:?}{}",
            point.size,
            criterion,
            point.score,
            point.model.loss,
            point.model.support,
            if point.model.converged {
                ""
            } else {
                " (not converged)"
            }
        );
    }

    fn selected(&self, result: &SolveResult) {
        log::info!(
            "Selected size {} with score {:.6} and loss {:.6}; support = {:?}",
            result.selected_size,
            result.score,
            result.loss,
            result.support_set
        );
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {}
