use crate::error::{ClusterStatsError, Result};
use serde::{Deserialize, Serialize};

/// Which side of the threshold a cluster lies on
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    /// Prefix used in cluster names
    pub fn name_prefix(self) -> &'static str {
        match self {
            Sign::Positive => "plus_",
            Sign::Negative => "minus_",
        }
    }
}

/// Cluster-forming thresholds and the significance target
///
/// A vertex passes the positive side when its value lies in
/// `[positive_threshold, positive_max_threshold]` and the negative side when
/// it lies in `[negative_min_threshold, negative_threshold]`. The outer limits
/// default to infinity. Setting a threshold to an unreachable value
/// (infinity) disables that side.
///
/// # Example TOML
/// ```toml
/// [threshold]
/// negative_threshold = -2.5
/// positive_threshold = 2.5
/// positive_max_threshold = 12.0
/// target_p_value = 0.05
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ThresholdSpec {
    pub negative_threshold: f32,
    pub positive_threshold: f32,
    pub negative_min_threshold: f32,
    pub positive_max_threshold: f32,
    pub target_p_value: f32,
}

impl Default for ThresholdSpec {
    fn default() -> Self {
        Self::new(-2.5, 2.5, 0.05)
    }
}

impl ThresholdSpec {
    pub fn new(negative_threshold: f32, positive_threshold: f32, target_p_value: f32) -> Self {
        Self {
            negative_threshold,
            positive_threshold,
            negative_min_threshold: f32::NEG_INFINITY,
            positive_max_threshold: f32::INFINITY,
            target_p_value,
        }
    }

    /// Bound each side from the outside as well
    pub fn with_limits(mut self, negative_min_threshold: f32, positive_max_threshold: f32) -> Self {
        self.negative_min_threshold = negative_min_threshold;
        self.positive_max_threshold = positive_max_threshold;
        self
    }

    /// Positive clustering only
    pub fn positive_only(positive_threshold: f32, target_p_value: f32) -> Self {
        Self::new(f32::NEG_INFINITY, positive_threshold, target_p_value)
    }

    pub fn validate(&self) -> Result<()> {
        if self.negative_threshold.is_nan() || self.negative_threshold > 0.0 {
            return Err(ClusterStatsError::Configuration(format!(
                "negative threshold must be <= 0, got {}",
                self.negative_threshold
            )));
        }
        if self.positive_threshold.is_nan() || self.positive_threshold < 0.0 {
            return Err(ClusterStatsError::Configuration(format!(
                "positive threshold must be >= 0, got {}",
                self.positive_threshold
            )));
        }
        if self.positive_max_threshold.is_nan() || self.positive_max_threshold < self.positive_threshold {
            return Err(ClusterStatsError::Configuration(format!(
                "positive max threshold {} is below positive threshold {}",
                self.positive_max_threshold, self.positive_threshold
            )));
        }
        if self.negative_min_threshold.is_nan() || self.negative_min_threshold > self.negative_threshold {
            return Err(ClusterStatsError::Configuration(format!(
                "negative min threshold {} is above negative threshold {}",
                self.negative_min_threshold, self.negative_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.target_p_value) {
            return Err(ClusterStatsError::Configuration(format!(
                "target p-value must be in [0, 1], got {}",
                self.target_p_value
            )));
        }
        Ok(())
    }

    pub fn is_enabled(&self, sign: Sign) -> bool {
        match sign {
            Sign::Positive => self.positive_threshold.is_finite(),
            Sign::Negative => self.negative_threshold.is_finite(),
        }
    }

    pub fn passes(&self, value: f32, sign: Sign) -> bool {
        match sign {
            Sign::Positive => value >= self.positive_threshold && value <= self.positive_max_threshold,
            Sign::Negative => value <= self.negative_threshold && value >= self.negative_min_threshold,
        }
    }

    /// Value range `(min, max)` admitted by one side; unbounded ends are `±f32::MAX`
    pub fn range(&self, sign: Sign) -> (f32, f32) {
        match sign {
            Sign::Positive => (self.positive_threshold, self.positive_max_threshold.min(f32::MAX)),
            Sign::Negative => (self.negative_min_threshold.max(-f32::MAX), self.negative_threshold),
        }
    }
}

/// Minimum size a component must reach to count as a cluster
///
/// Applied to observed and permutation clusters alike. The defaults keep
/// every component.
///
/// # Example TOML
/// ```toml
/// [cluster_filter]
/// min_nodes = 5
/// min_area = 20.0
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct ClusterSizeFilter {
    pub min_nodes: usize,
    /// Raw (uncorrected) surface area
    pub min_area: f32,
}

impl ClusterSizeFilter {
    pub fn new(min_nodes: usize, min_area: f32) -> Self {
        Self { min_nodes, min_area }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_area.is_finite() || self.min_area < 0.0 {
            return Err(ClusterStatsError::Configuration(format!(
                "minimum cluster area must be finite and >= 0, got {}",
                self.min_area
            )));
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.min_nodes > 0 || self.min_area > 0.0
    }

    pub fn accepts(&self, node_count: usize, raw_area: f32) -> bool {
        node_count >= self.min_nodes && raw_area >= self.min_area
    }
}

/// A connected set of threshold-passing vertices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub sign: Sign,
    /// Column of the statistic map the cluster was found in
    pub column_index: usize,
    /// Member vertices, ascending
    pub vertices: Vec<usize>,
    pub raw_area: f32,
    pub corrected_area: f32,
    /// Area-weighted mean position of the members
    pub centroid: [f32; 3],
    /// Fraction of null samples at least as large; 1.0 until assigned
    pub p_value: f32,
    pub threshold_min: f32,
    pub threshold_max: f32,
    pub name: String,
}

impl Cluster {
    pub fn node_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn min_vertex(&self) -> usize {
        self.vertices.first().copied().unwrap_or(usize::MAX)
    }

    pub fn is_significant(&self, target_p_value: f32) -> bool {
        self.p_value <= target_p_value
    }

    /// Threshold value shown in reports: the finite side of the range
    pub fn display_threshold(&self) -> f32 {
        match self.sign {
            Sign::Positive => self.threshold_min,
            Sign::Negative => self.threshold_max,
        }
    }

    /// Name encoding sign, corrected area, and vertex count
    pub fn make_name(sign: Sign, corrected_area: f32, node_count: usize) -> String {
        format!(
            "{}cluster_area_{:.6}_nodes_{}",
            sign.name_prefix(),
            corrected_area,
            node_count
        )
    }
}
