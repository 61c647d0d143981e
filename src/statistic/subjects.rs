use super::Relabeling;
use crate::error::{ClusterStatsError, ComputeError, Result};
use crate::table::NodeScalarTable;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::ops::Range;

/// Subject values for every vertex, pooled across groups
///
/// Each input table column is one subject. Values are stored node-major so a
/// vertex's subjects are contiguous; groups occupy consecutive subject ranges
/// in input order.
#[derive(Debug, Clone)]
pub struct SubjectMatrix {
    node_count: usize,
    subject_count: usize,
    values: Vec<f32>,
    group_sizes: Vec<usize>,
}

impl SubjectMatrix {
    /// Pool the columns of each group table
    ///
    /// # Errors
    ///
    /// [`ClusterStatsError::Configuration`] for an empty group list, a group
    /// without columns, or tables with differing node counts.
    pub fn from_groups(groups: &[&dyn NodeScalarTable]) -> Result<Self> {
        let first = groups.first().ok_or_else(|| {
            ClusterStatsError::Configuration("at least one input group is required".to_string())
        })?;
        let node_count = first.node_count();
        if node_count == 0 {
            return Err(ClusterStatsError::Configuration(
                "input tables have zero nodes".to_string(),
            ));
        }

        let mut group_sizes = Vec::with_capacity(groups.len());
        for (g, table) in groups.iter().enumerate() {
            if table.column_count() == 0 {
                return Err(ClusterStatsError::Configuration(format!(
                    "input group {} has no columns",
                    g
                )));
            }
            if table.node_count() != node_count {
                return Err(ClusterStatsError::Configuration(format!(
                    "input group {} has {} nodes, group 0 has {}",
                    g,
                    table.node_count(),
                    node_count
                )));
            }
            group_sizes.push(table.column_count());
        }

        let subject_count: usize = group_sizes.iter().sum();
        let mut values = Vec::with_capacity(node_count * subject_count);
        for node in 0..node_count {
            for table in groups {
                for column in 0..table.column_count() {
                    values.push(table.value_at(node, column));
                }
            }
        }

        Ok(Self {
            node_count,
            subject_count,
            values,
            group_sizes,
        })
    }

    /// Build directly from node-major values
    pub fn from_rows(node_count: usize, group_sizes: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        let subject_count: usize = group_sizes.iter().sum();
        if values.len() != node_count * subject_count {
            return Err(ClusterStatsError::Configuration(format!(
                "expected {} values for {} nodes x {} subjects, got {}",
                node_count * subject_count,
                node_count,
                subject_count,
                values.len()
            )));
        }
        Ok(Self {
            node_count,
            subject_count,
            values,
            group_sizes,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn subject_count(&self) -> usize {
        self.subject_count
    }

    pub fn group_sizes(&self) -> &[usize] {
        &self.group_sizes
    }

    /// Subject index range of each group
    pub fn group_ranges(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.group_sizes
            .iter()
            .map(|&size| {
                let range = start..start + size;
                start += size;
                range
            })
            .collect()
    }

    pub fn row(&self, node: usize) -> &[f32] {
        let start = node * self.subject_count;
        &self.values[start..start + self.subject_count]
    }

    /// Reject a relabeling that does not cover every subject exactly
    pub fn check(&self, relabeling: &Relabeling) -> std::result::Result<(), ComputeError> {
        check_relabeling(relabeling, self.subject_count)
    }

    /// Write the relabeled subject values of `node` into `out`
    pub fn gather(&self, node: usize, relabeling: &Relabeling, out: &mut Vec<f32>) {
        let row = self.row(node);
        out.clear();
        match relabeling {
            Relabeling::Identity => out.extend_from_slice(row),
            Relabeling::Permutation(order) => out.extend(order.iter().map(|&s| row[s])),
            Relabeling::SignFlip(signs) => {
                out.extend(row.iter().zip(signs).map(|(v, s)| v * s))
            }
        }
    }

    /// Random reassignment of subjects to group slots
    pub fn shuffled(&self, rng: &mut StdRng) -> Relabeling {
        random_permutation(self.subject_count, rng)
    }

    /// Random sign per subject
    pub fn sign_flipped(&self, rng: &mut StdRng) -> Relabeling {
        let signs = (0..self.subject_count)
            .map(|_| if rng.gen_bool(0.5) { 1.0 } else { -1.0 })
            .collect();
        Relabeling::SignFlip(signs)
    }
}

/// Uniform random permutation of `subject_count` subjects
pub(crate) fn random_permutation(subject_count: usize, rng: &mut StdRng) -> Relabeling {
    let mut order: Vec<usize> = (0..subject_count).collect();
    order.shuffle(rng);
    Relabeling::Permutation(order)
}

/// Reject a relabeling that does not cover `subject_count` subjects exactly
pub(crate) fn check_relabeling(
    relabeling: &Relabeling,
    subject_count: usize,
) -> std::result::Result<(), ComputeError> {
    match relabeling {
        Relabeling::Identity => Ok(()),
        Relabeling::Permutation(order) => {
            if order.len() != subject_count {
                return Err(ComputeError::InvalidInput(format!(
                    "permutation covers {} subjects, expected {}",
                    order.len(),
                    subject_count
                )));
            }
            let mut seen = vec![false; subject_count];
            for &s in order {
                if s >= subject_count || seen[s] {
                    return Err(ComputeError::InvalidInput(format!(
                        "permutation is not a bijection at subject {}",
                        s
                    )));
                }
                seen[s] = true;
            }
            Ok(())
        }
        Relabeling::SignFlip(signs) if signs.len() != subject_count => {
            Err(ComputeError::InvalidInput(format!(
                "sign flip covers {} subjects, expected {}",
                signs.len(),
                subject_count
            )))
        }
        Relabeling::SignFlip(_) => Ok(()),
    }
}
