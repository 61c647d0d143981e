// Per-vertex statistic computers
//
// Every test variant implements StatisticComputer. The engine and the null
// distribution builder only see the trait object: they ask for a random
// relabeling of the subjects, then for the statistic map under that
// relabeling. Relabeling::Identity is the real data.
//
// Degrees-of-freedom and p-value maps are produced only when requested, and
// auxiliary maps (group means) only for the real data.

mod anova;
mod coordinate;
mod inter_hemispheric;
mod kruskal_wallis;
mod ranks;
mod subjects;
mod t_test;

pub use anova::{AnovaEffect, AnovaModel, OneWayAnova, TwoWayAnova};
pub use coordinate::{CoordinateDifference, CoordinateMode};
pub use inter_hemispheric::InterHemisphericT;
pub use kruskal_wallis::KruskalWallis;
pub use ranks::average_ranks;
pub use subjects::SubjectMatrix;
pub use t_test::{OneSampleT, PairedT, TwoSampleT, VarianceMode};

use crate::error::ComputeError;
use crate::mesh::SurfaceMesh;
use crate::smoothing::{VarianceSmoother, VarianceSmoothingSpec};
use rand::rngs::StdRng;

/// Assignment of subjects used for one statistic computation
#[derive(Debug, Clone, PartialEq)]
pub enum Relabeling {
    /// Subjects in their original groups
    Identity,
    /// Slot `k` receives original subject `order[k]`; group sizes stay fixed
    Permutation(Vec<usize>),
    /// Subject `k` is multiplied by `signs[k]` (matched-pairs designs)
    SignFlip(Vec<f32>),
}

/// Which optional maps to produce alongside the statistic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapRequest {
    pub dof: bool,
    pub p_value: bool,
}

impl MapRequest {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            dof: true,
            p_value: true,
        }
    }

    pub fn needs_dof(&self) -> bool {
        self.dof || self.p_value
    }
}

/// Everything a computation needs besides the subject data
pub struct ComputeContext<'a> {
    pub mesh: &'a dyn SurfaceMesh,
    pub smoothing: VarianceSmoothingSpec,
    pub request: MapRequest,
    /// `None` for the real data, `Some(i)` inside permutation iteration `i`
    pub iteration: Option<usize>,
}

impl<'a> ComputeContext<'a> {
    pub fn real(mesh: &'a dyn SurfaceMesh, smoothing: VarianceSmoothingSpec, request: MapRequest) -> Self {
        Self {
            mesh,
            smoothing,
            request,
            iteration: None,
        }
    }

    /// Context for permutation iteration `i`; optional maps are never needed
    pub fn permutation(mesh: &'a dyn SurfaceMesh, smoothing: VarianceSmoothingSpec, iteration: usize) -> Self {
        Self {
            mesh,
            smoothing,
            request: MapRequest::none(),
            iteration: Some(iteration),
        }
    }

    pub fn is_real(&self) -> bool {
        self.iteration.is_none()
    }

    /// Apply the configured variance smoothing to a per-vertex map
    pub fn smooth(&self, map: Vec<f32>) -> Vec<f32> {
        VarianceSmoother::new(self.smoothing).smooth(self.mesh, map)
    }
}

/// Output of one statistic computation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticMaps {
    pub statistic: Vec<f32>,
    pub dof: Option<Vec<f32>>,
    pub p_value: Option<Vec<f32>>,
    /// Named extra maps for the real data, e.g. group means
    pub auxiliary: Vec<(String, Vec<f32>)>,
}

impl StatisticMaps {
    pub fn statistic_only(statistic: Vec<f32>) -> Self {
        Self {
            statistic,
            ..Default::default()
        }
    }
}

/// Post-processing of shuffled maps before clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullNormalization {
    None,
    /// Divide real and shuffled maps by the per-vertex standard deviation of
    /// the shuffled statistic
    NodeSigma,
}

/// One concrete statistical test
pub trait StatisticComputer: Send + Sync {
    /// Human-readable test name for reports
    fn name(&self) -> String;

    /// Column name of the statistic map, e.g. "T-Map"
    fn statistic_label(&self) -> &'static str;

    fn node_count(&self) -> usize;

    /// Lines describing the inputs, for the report header
    fn describe_inputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Draw a random relabeling of the subjects
    fn relabel(&self, rng: &mut StdRng) -> Relabeling;

    fn compute(
        &self,
        relabeling: &Relabeling,
        ctx: &ComputeContext<'_>,
    ) -> Result<StatisticMaps, ComputeError>;

    /// Whether negative values are meaningful cluster candidates
    fn clusters_negative(&self) -> bool {
        true
    }

    fn null_normalization(&self) -> NullNormalization {
        NullNormalization::None
    }

    /// Whether the mesh must be one connected piece
    fn requires_single_piece(&self) -> bool {
        false
    }
}

/// Reject NaN or infinite entries
pub(crate) fn ensure_finite(map: &[f32]) -> Result<(), ComputeError> {
    match map.iter().position(|v| !v.is_finite()) {
        Some(node) => Err(ComputeError::NonFinite { node }),
        None => Ok(()),
    }
}

/// Ratio that treats 0/0 as 0 and x/0 as degenerate
pub(crate) fn guarded_ratio(
    numerator: f64,
    denominator: f64,
    node: usize,
    what: &str,
) -> Result<f64, ComputeError> {
    if denominator > 0.0 {
        Ok(numerator / denominator)
    } else if numerator == 0.0 {
        Ok(0.0)
    } else {
        Err(ComputeError::Degenerate {
            node,
            detail: format!("zero {} with nonzero effect {}", what, numerator),
        })
    }
}

/// Sample mean and variance (n - 1 denominator; 0 variance when n < 2)
pub(crate) fn mean_and_variance(values: &[f32]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let ss: f64 = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum();
    (mean, ss / (n - 1) as f64)
}
