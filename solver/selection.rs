//! # Model Selection
//!
//! Scores candidate sizes either with an information criterion computed on
//! the full-data fit, or with K-fold cross-validation. Lower is better.

use crate::config::{ConfigError, IcType};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Information-criterion score of a fit with loss `loss` and `active` non-zero
/// coordinates, on `n` samples and `p` features.
///
/// | criterion | score                          |
/// |-----------|--------------------------------|
/// | AIC       | `2L + 2·c·s`                   |
/// | BIC       | `2L + c·s·ln n`                |
/// | GIC       | `2L + c·s·ln p·ln ln n`        |
/// | EBIC      | `2L + c·s·(ln n + 2 ln p)`     |
pub fn ic_score(ic: IcType, coef: f64, loss: f64, active: usize, n: usize, p: usize) -> f64 {
    if !loss.is_finite() {
        return f64::INFINITY;
    }
    let s = active as f64;
    let n = n.max(1) as f64;
    let p = p.max(1) as f64;
    let penalty = match ic {
        IcType::Aic => 2.0 * s,
        IcType::Bic => s * n.ln(),
        IcType::Gic => s * p.ln() * n.ln().ln(),
        IcType::Ebic => s * (n.ln() + 2.0 * p.ln()),
    };
    2.0 * loss + coef * penalty
}

/// How a size is scored.
#[derive(Debug, Clone)]
pub enum Criterion {
    Information {
        ic: IcType,
        coef: f64,
        n_samples: usize,
        n_features: usize,
    },
    CrossValidation(FoldAssignment),
}

impl Criterion {
    pub fn describe(&self) -> String {
        match self {
            Criterion::Information { ic, .. } => ic.name().to_uppercase(),
            Criterion::CrossValidation(folds) => format!("{}-fold CV", folds.n_folds()),
        }
    }
}

/// Mean held-out loss across folds; `+∞` if any fold failed.
pub fn cv_score(test_losses: &[f64]) -> f64 {
    if test_losses.is_empty() || test_losses.iter().any(|l| !l.is_finite()) {
        return f64::INFINITY;
    }
    test_losses.iter().sum::<f64>() / test_losses.len() as f64
}

/// Sample-to-fold mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldAssignment {
    fold_of: Vec<usize>,
    n_folds: usize,
}

impl FoldAssignment {
    /// Contiguous blocks of `⌊n / k⌋` samples; the remainder wraps onto the
    /// first folds one sample each.
    pub fn contiguous(n_samples: usize, n_folds: usize) -> Result<Self, ConfigError> {
        check_fold_count(n_samples, n_folds)?;
        let block = n_samples / n_folds;
        let fold_of = (0..n_samples)
            .map(|i| {
                if i < block * n_folds {
                    i / block
                } else {
                    i - block * n_folds
                }
            })
            .collect();
        Ok(Self { fold_of, n_folds })
    }

    /// Contiguous assignment over a seeded permutation of the samples.
    pub fn shuffled(n_samples: usize, n_folds: usize, seed: u64) -> Result<Self, ConfigError> {
        let ordered = Self::contiguous(n_samples, n_folds)?;
        let mut order: Vec<usize> = (0..n_samples).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
        let mut fold_of = vec![0; n_samples];
        for (position, &sample) in order.iter().enumerate() {
            fold_of[sample] = ordered.fold_of[position];
        }
        Ok(Self { fold_of, n_folds })
    }

    /// User-supplied fold ids, validated for length, range and non-empty folds.
    pub fn from_ids(ids: &[usize], n_samples: usize, n_folds: usize) -> Result<Self, ConfigError> {
        check_fold_count(n_samples, n_folds)?;
        if ids.len() != n_samples {
            return Err(ConfigError::FoldAssignmentLength {
                expected: n_samples,
                found: ids.len(),
            });
        }
        let mut counts = vec![0usize; n_folds];
        for (index, &fold) in ids.iter().enumerate() {
            if fold >= n_folds {
                return Err(ConfigError::FoldIdOutOfRange {
                    index,
                    fold,
                    folds: n_folds,
                });
            }
            counts[fold] += 1;
        }
        if let Some(empty) = counts.iter().position(|&c| c == 0) {
            return Err(ConfigError::EmptyFold(empty));
        }
        Ok(Self {
            fold_of: ids.to_vec(),
            n_folds,
        })
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    pub fn fold_of(&self, sample: usize) -> usize {
        self.fold_of[sample]
    }

    /// Samples outside `fold`, in sample order.
    pub fn train_indices(&self, fold: usize) -> Vec<usize> {
        (0..self.fold_of.len())
            .filter(|&i| self.fold_of[i] != fold)
            .collect()
    }

    /// Samples in `fold`, in sample order.
    pub fn test_indices(&self, fold: usize) -> Vec<usize> {
        (0..self.fold_of.len())
            .filter(|&i| self.fold_of[i] == fold)
            .collect()
    }
}

fn check_fold_count(n_samples: usize, n_folds: usize) -> Result<(), ConfigError> {
    if n_folds < 2 {
        return Err(ConfigError::InvalidFoldCount(n_folds));
    }
    if n_samples < n_folds {
        return Err(ConfigError::TooFewSamplesForFolds {
            folds: n_folds,
            samples: n_samples,
        });
    }
    Ok(())
}
