//! # Splicing
//!
//! Local search over supports of one fixed size. Each outer iteration ranks
//! the active and inactive groups by second-order importance and tries to
//! swap the `c` least useful active groups for the `c` most promising
//! inactive ones, refitting after every trial. The first exchange that lowers
//! the loss by more than `splicing_tolerance · |loss|` is kept; when no
//! exchange size helps, the support is a local optimum and the search stops.
//!
//! The exchange budget follows the configured schedule:
//!
//! | schedule | start of each outer iteration      | retry within an iteration |
//! |----------|------------------------------------|---------------------------|
//! | fixed    | `max_exchange_num`                 | `c − 1`                   |
//! | taper    | previous start halved, rounded up  | `⌊c / 2⌋`                 |

use crate::config::SplicingType;
use crate::groups;
use crate::importance::{rank, resize_support};
use crate::problem::{CandidateModel, Problem, StartPoint, SupportExplorer, improves};
use crate::suboptim::SubFit;

#[derive(Debug, Clone, Copy, Default)]
pub struct Splicing;

impl<D> SupportExplorer<D> for Splicing {
    fn name(&self) -> &'static str {
        "splicing"
    }

    fn uses_second_order(&self) -> bool {
        true
    }

    fn explore(&self, problem: &Problem<'_, D>, start: StartPoint, size: usize) -> CandidateModel {
        let config = problem.config;
        let target = problem.target_size(size);
        let mut support = resize_support(problem, &start.support, start.params.view(), target);
        let mut fit = problem.fit(&support, start.params.view());
        log::trace!(
            "Splicing size {}: initial support {:?}, loss {:.6}",
            target,
            support,
            fit.loss
        );

        let limit = match config.important_search {
            0 => None,
            n => Some(n),
        };
        let mut exchange = config.max_exchange_num.max(1);
        let mut iterations = 0;
        let mut stable = false;

        while iterations < config.max_iter {
            let ranking = rank(problem, &support, fit.params.view(), limit);
            let widest = exchange
                .min(ranking.removable.len())
                .min(ranking.candidates.len());
            iterations += 1;

            let mut accepted: Option<(Vec<usize>, SubFit)> = None;
            let mut c = widest;
            while c >= 1 {
                let outgoing: Vec<usize> = ranking.removable[..c].iter().map(|&(g, _)| g).collect();
                let incoming = ranking.candidates[..c].iter().map(|&(g, _)| g);
                let trial_support = groups::normalize(
                    support
                        .iter()
                        .copied()
                        .filter(|g| !outgoing.contains(g))
                        .chain(incoming)
                        .collect(),
                );
                let trial = problem.fit(&trial_support, fit.params.view());
                if improves(fit.loss, trial.loss, config.splicing_tolerance) {
                    log::trace!(
                        "Splicing size {}: exchanged {} groups, loss {:.6} -> {:.6}",
                        target,
                        c,
                        fit.loss,
                        trial.loss
                    );
                    accepted = Some((trial_support, trial));
                    break;
                }
                c = match config.splicing_type {
                    SplicingType::Fixed => c - 1,
                    SplicingType::Taper => c / 2,
                };
            }

            match accepted {
                Some((next_support, next_fit)) => {
                    support = next_support;
                    fit = next_fit;
                }
                None => {
                    stable = true;
                    break;
                }
            }
            if config.splicing_type == SplicingType::Taper {
                exchange = exchange.div_ceil(2).max(1);
            }
        }

        if !stable {
            log::debug!(
                "Splicing size {} stopped at max_iter = {} with loss {:.6}",
                target,
                config.max_iter,
                fit.loss
            );
        }
        problem.candidate(size, support, fit, iterations)
    }
}
