use super::subjects::{check_relabeling, random_permutation};
use super::{ensure_finite, guarded_ratio, ComputeContext, Relabeling, StatisticComputer, StatisticMaps};
use crate::error::{ClusterStatsError, ComputeError, Result};
use crate::mesh::distance;
use crate::special::{t_p_value, Tails};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Output of the coordinate-difference test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateMode {
    /// Summed distance of each group's mean position from the average of the means
    #[default]
    Distance,
    /// Distance divided by its standard error
    TMap,
}

/// Group differences in 3-D vertex position
///
/// Each subject contributes one coordinate set (a position per vertex) on the
/// shared topology. Vertices without neighbors map to 0.
pub struct CoordinateDifference {
    node_count: usize,
    subjects: Vec<Vec<[f32; 3]>>,
    group_sizes: Vec<usize>,
    mode: CoordinateMode,
}

impl CoordinateDifference {
    /// # Arguments
    /// * `groups` - Coordinate sets per group, each set one position per vertex
    /// * `node_count` - Vertex count of the fiducial surface
    /// * `mode` - Distance or T-map output
    ///
    /// # Errors
    /// Fewer than two groups, an empty group, a T-map group with a single
    /// subject, or a coordinate set of the wrong length.
    pub fn new(groups: Vec<Vec<Vec<[f32; 3]>>>, node_count: usize, mode: CoordinateMode) -> Result<Self> {
        if groups.len() < 2 {
            return Err(ClusterStatsError::Configuration(format!(
                "coordinate difference needs at least 2 groups, got {}",
                groups.len()
            )));
        }
        let min_size = match mode {
            CoordinateMode::Distance => 1,
            CoordinateMode::TMap => 2,
        };
        let mut group_sizes = Vec::with_capacity(groups.len());
        let mut subjects = Vec::new();
        for (g, group) in groups.into_iter().enumerate() {
            if group.len() < min_size {
                return Err(ClusterStatsError::Configuration(format!(
                    "coordinate group {} has {} coordinate sets, needs at least {}",
                    g,
                    group.len(),
                    min_size
                )));
            }
            for (s, coords) in group.iter().enumerate() {
                if coords.len() != node_count {
                    return Err(ClusterStatsError::Geometry(format!(
                        "coordinate set {} of group {} has {} nodes, surface has {}",
                        s,
                        g,
                        coords.len(),
                        node_count
                    )));
                }
            }
            group_sizes.push(group.len());
            subjects.extend(group);
        }

        Ok(Self {
            node_count,
            subjects,
            group_sizes,
            mode,
        })
    }

    fn mean_position(&self, node: usize, members: &[usize]) -> [f64; 3] {
        let mut sum = [0.0f64; 3];
        for &s in members {
            let p = self.subjects[s][node];
            for axis in 0..3 {
                sum[axis] += f64::from(p[axis]);
            }
        }
        sum.map(|c| c / members.len() as f64)
    }
}

impl StatisticComputer for CoordinateDifference {
    fn name(&self) -> String {
        match self.mode {
            CoordinateMode::Distance => "Coordinate Difference (distance)".to_string(),
            CoordinateMode::TMap => "Coordinate Difference (T-map)".to_string(),
        }
    }

    fn statistic_label(&self) -> &'static str {
        match self.mode {
            CoordinateMode::Distance => "Distance",
            CoordinateMode::TMap => "T-Map",
        }
    }

    fn node_count(&self) -> usize {
        self.node_count
    }

    fn describe_inputs(&self) -> Vec<String> {
        self.group_sizes
            .iter()
            .enumerate()
            .map(|(g, size)| format!("Group {} Coordinate Sets: {}", g + 1, size))
            .collect()
    }

    fn relabel(&self, rng: &mut StdRng) -> Relabeling {
        random_permutation(self.subjects.len(), rng)
    }

    fn compute(
        &self,
        relabeling: &Relabeling,
        ctx: &ComputeContext<'_>,
    ) -> std::result::Result<StatisticMaps, ComputeError> {
        check_relabeling(relabeling, self.subjects.len())?;
        let order: Vec<usize> = match relabeling {
            Relabeling::Identity => (0..self.subjects.len()).collect(),
            Relabeling::Permutation(order) => order.clone(),
            Relabeling::SignFlip(_) => {
                return Err(ComputeError::InvalidInput(
                    "coordinate difference cannot apply sign flips".to_string(),
                ))
            }
        };

        let mut groups = Vec::with_capacity(self.group_sizes.len());
        let mut start = 0;
        for &size in &self.group_sizes {
            groups.push(&order[start..start + size]);
            start += size;
        }

        let k = groups.len() as f64;
        let mut distances = vec![0.0f32; self.node_count];
        let mut variances = vec![vec![0.0f32; self.node_count]; groups.len()];

        for node in 0..self.node_count {
            if !ctx.mesh.has_neighbors(node) {
                continue;
            }
            let means: Vec<[f64; 3]> = groups.iter().map(|g| self.mean_position(node, g)).collect();
            let mut center = [0.0f64; 3];
            for m in &means {
                for axis in 0..3 {
                    center[axis] += m[axis] / k;
                }
            }
            let center32 = center.map(|c| c as f32);
            distances[node] = means
                .iter()
                .map(|m| distance(&m.map(|c| c as f32), &center32))
                .sum();

            if self.mode == CoordinateMode::TMap {
                for (g, members) in groups.iter().enumerate() {
                    let mean = means[g].map(|c| c as f32);
                    let ss: f32 = members
                        .iter()
                        .map(|&s| distance(&self.subjects[s][node], &mean).powi(2))
                        .sum();
                    variances[g][node] = ss / (members.len() - 1) as f32;
                }
            }
        }

        let statistic = match self.mode {
            CoordinateMode::Distance => distances,
            CoordinateMode::TMap => {
                let smoothed: Vec<Vec<f32>> = variances.into_iter().map(|v| ctx.smooth(v)).collect();
                let mut t = Vec::with_capacity(self.node_count);
                for node in 0..self.node_count {
                    let se: f64 = smoothed
                        .iter()
                        .zip(&groups)
                        .map(|(v, g)| f64::from(v[node].max(0.0)) / g.len() as f64)
                        .sum::<f64>()
                        .sqrt();
                    t.push(guarded_ratio(f64::from(distances[node]), se, node, "coordinate deviation")? as f32);
                }
                t
            }
        };
        ensure_finite(&statistic)?;

        let mut maps = StatisticMaps::statistic_only(statistic);
        if self.mode == CoordinateMode::TMap {
            let dof = (self.subjects.len() - groups.len()) as f32;
            if ctx.request.dof {
                maps.dof = Some(vec![dof; self.node_count]);
            }
            if ctx.request.p_value {
                maps.p_value = Some(
                    maps.statistic
                        .iter()
                        .map(|&t| t_p_value(t, dof, Tails::One))
                        .collect(),
                );
            }
        }
        Ok(maps)
    }

    fn clusters_negative(&self) -> bool {
        false
    }

    fn requires_single_piece(&self) -> bool {
        true
    }
}
