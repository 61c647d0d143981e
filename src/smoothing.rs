//! Variance smoothing across mesh adjacency
//!
//! Each pass blends every vertex with the mean of its direct neighbors:
//! `out = (1 - strength) * in + strength * mean(neighbors)`. Passes read a
//! snapshot of the previous pass, so the result does not depend on vertex
//! order. Vertices without neighbors keep their value.

use crate::error::{ClusterStatsError, Result};
use crate::mesh::SurfaceMesh;
use serde::{Deserialize, Serialize};

/// Number of smoothing passes and the neighbor blend fraction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarianceSmoothingSpec {
    /// 0 disables smoothing
    pub iterations: usize,
    /// Fraction taken from the neighbor average, in [0, 1]
    pub strength: f32,
}

impl Default for VarianceSmoothingSpec {
    fn default() -> Self {
        Self {
            iterations: 0,
            strength: 0.5,
        }
    }
}

impl VarianceSmoothingSpec {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(iterations: usize, strength: f32) -> Self {
        Self {
            iterations,
            strength,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.iterations > 0
    }

    pub fn validate(&self) -> Result<()> {
        if !self.strength.is_finite() || !(0.0..=1.0).contains(&self.strength) {
            return Err(ClusterStatsError::Configuration(format!(
                "variance smoothing strength must be in [0, 1], got {}",
                self.strength
            )));
        }
        Ok(())
    }
}

/// Iterative neighbor-average diffusion of a per-vertex map
#[derive(Debug, Clone, Copy)]
pub struct VarianceSmoother {
    spec: VarianceSmoothingSpec,
}

impl VarianceSmoother {
    pub fn new(spec: VarianceSmoothingSpec) -> Self {
        Self { spec }
    }

    /// Smooth `values` over `mesh`; returns the input unchanged when disabled
    ///
    /// # Example
    /// ```
    /// use surface_clusters::mesh::TriangleMesh;
    /// use surface_clusters::smoothing::{VarianceSmoother, VarianceSmoothingSpec};
    ///
    /// let mesh = TriangleMesh::new(
    ///     vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    ///     vec![[0, 1, 2]],
    /// )
    /// .unwrap();
    /// let smoother = VarianceSmoother::new(VarianceSmoothingSpec::new(1, 1.0));
    /// let out = smoother.smooth(&mesh, vec![3.0, 0.0, 0.0]);
    /// assert_eq!(out, vec![0.0, 1.5, 1.5]);
    /// ```
    pub fn smooth(&self, mesh: &dyn SurfaceMesh, values: Vec<f32>) -> Vec<f32> {
        if !self.spec.is_enabled() || self.spec.strength == 0.0 {
            return values;
        }

        let keep = 1.0 - self.spec.strength;
        let mut current = values;
        let mut next = current.clone();

        for _ in 0..self.spec.iterations {
            for (node, out) in next.iter_mut().enumerate() {
                let neighbors = mesh.neighbors_of(node);
                if neighbors.is_empty() {
                    *out = current[node];
                    continue;
                }
                let sum: f32 = neighbors.iter().map(|&n| current[n]).sum();
                let mean = sum / neighbors.len() as f32;
                *out = current[node] * keep + mean * self.spec.strength;
            }
            std::mem::swap(&mut current, &mut next);
        }
        current
    }
}
