//! Distortion correction of cluster area
//!
//! Registration and inflation stretch or compress parts of the surface. A
//! per-vertex distortion column records that change, and each vertex's area
//! weight is scaled by a factor derived from it before it is summed into a
//! cluster's corrected area.

use crate::error::{ClusterStatsError, Result};
use crate::table::NodeScalarTable;
use serde::{Deserialize, Serialize};

/// How a distortion value turns into an area factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMode {
    /// Column holds an areal ratio `d`; factor is `1 / d`
    #[default]
    Ratio,
    /// Column holds `log2` of the ratio; factor is `2^d`
    Log2Exponent,
}

impl CorrectionMode {
    /// Factor applied to a vertex area; unusable values fall back to 1
    pub fn factor(self, distortion: f32) -> f32 {
        if !distortion.is_finite() {
            return 1.0;
        }
        match self {
            CorrectionMode::Ratio if distortion > 0.0 => 1.0 / distortion,
            CorrectionMode::Ratio => 1.0,
            CorrectionMode::Log2Exponent => {
                let f = distortion.exp2();
                if f.is_finite() {
                    f
                } else {
                    1.0
                }
            }
        }
    }
}

/// Per-vertex area factors, or the identity when no column is configured
#[derive(Debug, Clone, Default)]
pub struct DistortionCorrector {
    factors: Option<Vec<f32>>,
}

impl DistortionCorrector {
    /// Corrected area equals raw area
    pub fn identity() -> Self {
        Self { factors: None }
    }

    /// Read factors from `column` of `table`
    ///
    /// # Errors
    ///
    /// [`ClusterStatsError::Configuration`] when the column index is out of
    /// range or the table does not cover `node_count` vertices.
    pub fn from_table(
        table: &dyn NodeScalarTable,
        column: usize,
        mode: CorrectionMode,
        node_count: usize,
    ) -> Result<Self> {
        if column >= table.column_count() {
            return Err(ClusterStatsError::Configuration(format!(
                "area correction column {} out of range, table has {} columns",
                column,
                table.column_count()
            )));
        }
        if table.node_count() != node_count {
            return Err(ClusterStatsError::Configuration(format!(
                "distortion table has {} nodes, surface has {}",
                table.node_count(),
                node_count
            )));
        }

        let factors = (0..node_count)
            .map(|node| mode.factor(table.value_at(node, column)))
            .collect();
        tracing::debug!(
            column = table.column_name(column),
            ?mode,
            "loaded distortion correction"
        );
        Ok(Self {
            factors: Some(factors),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.factors.is_none()
    }

    pub fn factor(&self, node: usize) -> f32 {
        self.factors.as_ref().map_or(1.0, |f| f[node])
    }

    /// Corrected area contribution of one vertex
    pub fn correct(&self, node: usize, raw_area: f32) -> f32 {
        raw_area * self.factor(node)
    }
}
