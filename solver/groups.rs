//! Coordinate universe: the partition of parameters into selectable groups.
//!
//! Supports are always expressed as sorted lists of group ids. Ungrouped
//! problems are the degenerate case where every coordinate is its own group.

use crate::config::ConfigError;
use ndarray::{Array1, ArrayView1};

#[derive(Debug, Clone, PartialEq)]
pub struct GroupLayout {
    /// Coordinates of each group, ascending.
    members: Vec<Vec<usize>>,
    /// Group id of each coordinate.
    group_of: Vec<usize>,
}

impl GroupLayout {
    pub fn singletons(n_features: usize) -> Result<Self, ConfigError> {
        if n_features == 0 {
            return Err(ConfigError::NoFeatures);
        }
        Ok(Self {
            members: (0..n_features).map(|j| vec![j]).collect(),
            group_of: (0..n_features).collect(),
        })
    }

    /// Builds a layout from a per-coordinate group id. Ids must cover
    /// `0..n_groups` without gaps; coordinates of one group need not be adjacent.
    pub fn from_assignment(assignment: &[usize], n_features: usize) -> Result<Self, ConfigError> {
        if n_features == 0 {
            return Err(ConfigError::NoFeatures);
        }
        if assignment.len() != n_features {
            return Err(ConfigError::GroupLengthMismatch {
                expected: n_features,
                found: assignment.len(),
            });
        }
        let n_groups = assignment.iter().max().map_or(0, |&g| g + 1);
        let mut members = vec![Vec::new(); n_groups];
        for (coord, &g) in assignment.iter().enumerate() {
            members[g].push(coord);
        }
        if let Some(missing) = members.iter().position(Vec::is_empty) {
            return Err(ConfigError::GroupIdsNotContiguous { n_groups, missing });
        }
        Ok(Self {
            members,
            group_of: assignment.to_vec(),
        })
    }

    pub fn n_groups(&self) -> usize {
        self.members.len()
    }

    pub fn n_features(&self) -> usize {
        self.group_of.len()
    }

    pub fn members(&self, group: usize) -> &[usize] {
        &self.members[group]
    }

    pub fn all_groups(&self) -> Vec<usize> {
        (0..self.n_groups()).collect()
    }

    /// Sorted coordinates covered by a set of groups.
    pub fn coordinates(&self, groups: &[usize]) -> Vec<usize> {
        let mut coords: Vec<usize> = groups
            .iter()
            .flat_map(|&g| self.members[g].iter().copied())
            .collect();
        coords.sort_unstable();
        coords
    }

    /// Groups containing the given coordinates, sorted and de-duplicated.
    pub fn groups_of(&self, coords: &[usize]) -> Vec<usize> {
        let mut groups: Vec<usize> = coords.iter().map(|&c| self.group_of[c]).collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }

    pub fn group_norm(&self, group: usize, values: ArrayView1<f64>) -> f64 {
        self.members[group]
            .iter()
            .map(|&c| values[c] * values[c])
            .sum::<f64>()
            .sqrt()
    }

    /// Copy of `values` with every coordinate outside `groups` set to zero.
    pub fn mask(&self, values: ArrayView1<f64>, groups: &[usize]) -> Array1<f64> {
        let mut masked = Array1::zeros(values.len());
        for &g in groups {
            for &c in &self.members[g] {
                masked[c] = values[c];
            }
        }
        masked
    }
}

/// Normalizes a support: sorted, without duplicates.
pub fn normalize(mut support: Vec<usize>) -> Vec<usize> {
    support.sort_unstable();
    support.dedup();
    support
}

/// `a` minus `b`, both sorted.
pub fn difference(a: &[usize], b: &[usize]) -> Vec<usize> {
    a.iter()
        .copied()
        .filter(|g| b.binary_search(g).is_err())
        .collect()
}
