use super::definition::{Cluster, ClusterSizeFilter, Sign, ThresholdSpec};
use crate::distortion::DistortionCorrector;
use crate::mesh::SurfaceMesh;
use std::collections::VecDeque;

/// Grows threshold-passing connected components over mesh adjacency
///
/// Seeds are visited in ascending vertex order, so discovery order is
/// reproducible. Vertices without neighbors never join a cluster, and
/// components below the size filter are dropped.
pub struct ClusterFinder<'a> {
    mesh: &'a dyn SurfaceMesh,
    corrector: &'a DistortionCorrector,
    filter: ClusterSizeFilter,
}

impl<'a> ClusterFinder<'a> {
    pub fn new(mesh: &'a dyn SurfaceMesh, corrector: &'a DistortionCorrector) -> Self {
        Self {
            mesh,
            corrector,
            filter: ClusterSizeFilter::default(),
        }
    }

    pub fn with_size_filter(mut self, filter: ClusterSizeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Find all clusters of one sign in `map`
    ///
    /// # Arguments
    /// * `map` - Statistic value per vertex
    /// * `threshold` - Cluster-forming thresholds
    /// * `sign` - Which side of the threshold to cluster
    /// * `column_index` - Recorded on each cluster for reporting
    ///
    /// # Returns
    /// Clusters in discovery order with p-values of 1.0 and names filled in.
    /// An empty list when no vertex passes or the side is disabled.
    pub fn find_clusters(
        &self,
        map: &[f32],
        threshold: &ThresholdSpec,
        sign: Sign,
        column_index: usize,
    ) -> Vec<Cluster> {
        let mut clusters = Vec::new();
        if !threshold.is_enabled(sign) {
            return clusters;
        }

        let (threshold_min, threshold_max) = threshold.range(sign);
        self.for_each_component(map, threshold, sign, |members| {
            let cluster = self.describe(members, sign, column_index, threshold_min, threshold_max);
            if self.filter.accepts(cluster.node_count(), cluster.raw_area) {
                clusters.push(cluster);
            }
        });

        tracing::debug!(?sign, count = clusters.len(), "clusters found");
        clusters
    }

    /// Largest corrected area of any cluster of one sign, 0 when none
    ///
    /// Used on every permutation iteration, so no [`Cluster`] is built.
    pub fn max_corrected_area(&self, map: &[f32], threshold: &ThresholdSpec, sign: Sign) -> f32 {
        if !threshold.is_enabled(sign) {
            return 0.0;
        }
        let mut largest = 0.0f32;
        let filtering = self.filter.is_enabled();
        self.for_each_component(map, threshold, sign, |members| {
            if filtering {
                let raw: f32 = members.iter().map(|&v| self.mesh.area_of(v)).sum();
                if !self.filter.accepts(members.len(), raw) {
                    return;
                }
            }
            let area: f32 = members
                .iter()
                .map(|&v| self.corrector.correct(v, self.mesh.area_of(v)))
                .sum();
            largest = largest.max(area);
        });
        largest
    }

    /// Copy of `map` with every vertex outside a kept cluster set to 0
    ///
    /// Both enabled signs are clustered. Useful for displaying only the
    /// supra-threshold regions that survive the size filter.
    pub fn mask(&self, map: &[f32], threshold: &ThresholdSpec) -> Vec<f32> {
        let mut keep = vec![false; map.len()];
        for sign in [Sign::Positive, Sign::Negative] {
            for cluster in self.find_clusters(map, threshold, sign, 0) {
                for v in cluster.vertices {
                    keep[v] = true;
                }
            }
        }
        map.iter()
            .zip(&keep)
            .map(|(&value, &kept)| if kept { value } else { 0.0 })
            .collect()
    }

    fn for_each_component<F>(&self, map: &[f32], threshold: &ThresholdSpec, sign: Sign, mut emit: F)
    where
        F: FnMut(&mut Vec<usize>),
    {
        let node_count = self.mesh.node_count().min(map.len());
        let passes = |v: usize| threshold.passes(map[v], sign) && self.mesh.has_neighbors(v);

        let mut visited = vec![false; node_count];
        let mut queue = VecDeque::new();
        let mut members = Vec::new();

        for seed in 0..node_count {
            if visited[seed] || !passes(seed) {
                continue;
            }
            visited[seed] = true;
            queue.push_back(seed);
            members.clear();

            while let Some(v) = queue.pop_front() {
                members.push(v);
                for &n in self.mesh.neighbors_of(v) {
                    if n < node_count && !visited[n] && passes(n) {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                }
            }
            emit(&mut members);
        }
    }

    fn describe(
        &self,
        members: &mut Vec<usize>,
        sign: Sign,
        column_index: usize,
        threshold_min: f32,
        threshold_max: f32,
    ) -> Cluster {
        members.sort_unstable();

        let mut raw_area = 0.0f32;
        let mut corrected_area = 0.0f32;
        let mut weighted = [0.0f64; 3];
        let mut plain = [0.0f64; 3];

        for &v in members.iter() {
            let area = self.mesh.area_of(v);
            raw_area += area;
            corrected_area += self.corrector.correct(v, area);
            let pos = self.mesh.position_of(v);
            for axis in 0..3 {
                weighted[axis] += f64::from(pos[axis]) * f64::from(area);
                plain[axis] += f64::from(pos[axis]);
            }
        }

        // zero total area falls back to the unweighted mean
        let centroid = if raw_area > 0.0 {
            weighted.map(|c| (c / f64::from(raw_area)) as f32)
        } else {
            plain.map(|c| (c / members.len() as f64) as f32)
        };

        Cluster {
            sign,
            column_index,
            vertices: members.clone(),
            raw_area,
            corrected_area,
            centroid,
            p_value: 1.0,
            threshold_min,
            threshold_max,
            name: Cluster::make_name(sign, corrected_area, members.len()),
        }
    }
}
