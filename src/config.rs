//! Run configuration file
//!
//! A run is described by one TOML file. Input paths are resolved relative to
//! the directory holding the file.
//!
//! # Example
//!
//! ```toml
//! [run]
//! iterations = 1000
//! threads = 4
//! seed = 7
//! compute_p_value = true
//!
//! [threshold]
//! negative_threshold = -2.5
//! positive_threshold = 2.5
//! target_p_value = 0.05
//!
//! [mesh]
//! path = "surface.json"
//!
//! [test]
//! kind = "two_sample"
//! group_a = "patients.json"
//! group_b = "controls.json"
//! variance = "unpooled"
//!
//! [output]
//! labels = "clusters.labels.json"
//! report = "report.txt"
//! ```

use crate::cluster::{ClusterSizeFilter, ThresholdSpec};
use crate::distortion::CorrectionMode;
use crate::engine::EngineConfig;
use crate::error::{ClusterStatsError, Result};
use crate::io::{load_coordinates, load_scalar_table};
use crate::mesh::SurfaceMesh;
use crate::null_distribution::NullPooling;
use crate::smoothing::VarianceSmoothingSpec;
use crate::special::Tails;
use crate::statistic::{
    AnovaEffect, AnovaModel, CoordinateDifference, CoordinateMode, InterHemisphericT, KruskalWallis,
    MapRequest, OneSampleT, OneWayAnova, PairedT, StatisticComputer, TwoSampleT, TwoWayAnova,
    VarianceMode,
};
use crate::table::{NodeScalarTable, ScalarTable};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// `[run]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub iterations: usize,
    pub threads: usize,
    pub seed: u64,
    pub compute_dof: bool,
    pub compute_p_value: bool,
    pub null_pooling: NullPooling,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            iterations: 1000,
            threads: 1,
            seed: 0,
            compute_dof: false,
            compute_p_value: false,
            null_pooling: NullPooling::PerSign,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSection {
    pub path: PathBuf,
}

/// `[area_correction]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaCorrectionSection {
    pub path: PathBuf,
    #[serde(default)]
    pub column: usize,
    #[serde(default)]
    pub mode: CorrectionMode,
}

/// `[output]` section; a missing report path means stdout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub labels: Option<PathBuf>,
    pub statistics: Option<PathBuf>,
    pub clusters: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// `[test]` section, selected by `kind`
///
/// Every scalar input file is a table with one column per subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestSpec {
    OneSample {
        input: PathBuf,
        #[serde(default)]
        constant: f32,
        #[serde(default)]
        tails: Tails,
    },
    Paired {
        group_a: PathBuf,
        group_b: PathBuf,
        #[serde(default)]
        tails: Tails,
    },
    TwoSample {
        group_a: PathBuf,
        group_b: PathBuf,
        #[serde(default)]
        variance: VarianceMode,
        #[serde(default)]
        wilcoxon: bool,
        #[serde(default)]
        tails: Tails,
    },
    /// Cells in row-major order: cell `(i, j)` is `cells[i * columns + j]`
    TwoWayAnova {
        rows: usize,
        columns: usize,
        #[serde(default)]
        model: AnovaModel,
        #[serde(default)]
        effect: AnovaEffect,
        cells: Vec<PathBuf>,
    },
    OneWayAnova {
        groups: Vec<PathBuf>,
    },
    KruskalWallis {
        groups: Vec<PathBuf>,
    },
    /// Each group lists one coordinate file per subject
    CoordinateDifference {
        groups: Vec<Vec<PathBuf>>,
        #[serde(default)]
        mode: CoordinateMode,
    },
    /// Product of left and right hemisphere T-maps on a shared surface
    InterHemispheric {
        right_a: PathBuf,
        right_b: PathBuf,
        left_a: PathBuf,
        left_b: PathBuf,
        #[serde(default = "hemisphere_variance")]
        variance: VarianceMode,
        /// Fixed shuffles per hemisphere; unset shuffles afresh every iteration
        #[serde(default)]
        shuffle_pool: Option<usize>,
    },
}

fn hemisphere_variance() -> VarianceMode {
    VarianceMode::Unpooled
}

impl TestSpec {
    /// File-count checks that need no file contents
    pub fn validate(&self) -> Result<()> {
        match self {
            TestSpec::TwoWayAnova {
                rows,
                columns,
                cells,
                ..
            } => TwoWayAnova::check_layout(*rows, *columns, cells.len()),
            TestSpec::OneWayAnova { groups } | TestSpec::KruskalWallis { groups } if groups.len() < 2 => {
                Err(ClusterStatsError::Configuration(format!(
                    "{} needs at least 2 group files, got {}",
                    self.kind(),
                    groups.len()
                )))
            }
            TestSpec::CoordinateDifference { groups, .. } => {
                if groups.len() < 2 {
                    return Err(ClusterStatsError::Configuration(format!(
                        "coordinate_difference needs at least 2 groups, got {}",
                        groups.len()
                    )));
                }
                match groups.iter().position(Vec::is_empty) {
                    Some(g) => Err(ClusterStatsError::Configuration(format!(
                        "coordinate_difference group {} lists no coordinate files",
                        g
                    ))),
                    None => Ok(()),
                }
            }
            TestSpec::InterHemispheric { variance, .. } if *variance == VarianceMode::Sigma => {
                Err(ClusterStatsError::Configuration(
                    "inter_hemispheric supports pooled or unpooled variance only".to_string(),
                ))
            }
            TestSpec::InterHemispheric {
                shuffle_pool: Some(0),
                ..
            } => Err(ClusterStatsError::Configuration(
                "inter_hemispheric shuffle_pool must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TestSpec::OneSample { .. } => "one_sample",
            TestSpec::Paired { .. } => "paired",
            TestSpec::TwoSample { .. } => "two_sample",
            TestSpec::TwoWayAnova { .. } => "two_way_anova",
            TestSpec::OneWayAnova { .. } => "one_way_anova",
            TestSpec::KruskalWallis { .. } => "kruskal_wallis",
            TestSpec::CoordinateDifference { .. } => "coordinate_difference",
            TestSpec::InterHemispheric { .. } => "inter_hemispheric",
        }
    }
}

/// Complete description of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub threshold: ThresholdSpec,
    #[serde(default)]
    pub smoothing: VarianceSmoothingSpec,
    #[serde(default)]
    pub cluster_filter: ClusterSizeFilter,
    #[serde(default)]
    pub area_correction: Option<AreaCorrectionSection>,
    pub mesh: MeshSection,
    pub test: TestSpec,
    #[serde(default)]
    pub output: OutputSection,
    /// Directory relative input paths are resolved against
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl RunConfig {
    /// Load a run file; relative paths inside resolve against its directory
    pub fn from_toml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    /// Every check that needs no file contents
    ///
    /// # Errors
    ///
    /// [`ClusterStatsError::Configuration`] for mismatched input counts,
    /// zero iterations, invalid thresholds or smoothing strength.
    pub fn validate(&self) -> Result<()> {
        self.engine_config().validate()?;
        self.test.validate()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            threshold: self.threshold,
            iterations: self.run.iterations,
            threads: self.run.threads,
            seed: self.run.seed,
            smoothing: self.smoothing,
            maps: MapRequest {
                dof: self.run.compute_dof,
                p_value: self.run.compute_p_value,
            },
            null_pooling: self.run.null_pooling,
            cluster_filter: self.cluster_filter,
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn load_tables(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<ScalarTable>> {
        paths
            .iter()
            .map(|p| load_scalar_table(self.resolve(p)))
            .collect()
    }

    /// Load the input files and construct the configured test
    pub fn build_computer(&self, mesh: &dyn SurfaceMesh) -> anyhow::Result<Box<dyn StatisticComputer>> {
        tracing::info!(kind = self.test.kind(), "loading test inputs");
        let computer: Box<dyn StatisticComputer> = match &self.test {
            TestSpec::OneSample {
                input,
                constant,
                tails,
            } => {
                let table = load_scalar_table(self.resolve(input))?;
                Box::new(OneSampleT::new(&table, *constant)?.with_tails(*tails))
            }
            TestSpec::Paired {
                group_a,
                group_b,
                tails,
            } => {
                let a = load_scalar_table(self.resolve(group_a))?;
                let b = load_scalar_table(self.resolve(group_b))?;
                Box::new(PairedT::new(&a, &b)?.with_tails(*tails))
            }
            TestSpec::TwoSample {
                group_a,
                group_b,
                variance,
                wilcoxon,
                tails,
            } => {
                let a = load_scalar_table(self.resolve(group_a))?;
                let b = load_scalar_table(self.resolve(group_b))?;
                Box::new(
                    TwoSampleT::new(&a, &b, *variance)?
                        .with_rank_transform(*wilcoxon)
                        .with_tails(*tails),
                )
            }
            TestSpec::TwoWayAnova {
                rows,
                columns,
                model,
                effect,
                cells,
            } => {
                TwoWayAnova::check_layout(*rows, *columns, cells.len())?;
                let tables = self.load_tables(cells)?;
                Box::new(TwoWayAnova::new(*rows, *columns, *model, *effect, &as_dyn(&tables))?)
            }
            TestSpec::OneWayAnova { groups } => {
                let tables = self.load_tables(groups)?;
                Box::new(OneWayAnova::new(&as_dyn(&tables))?)
            }
            TestSpec::KruskalWallis { groups } => {
                let tables = self.load_tables(groups)?;
                Box::new(KruskalWallis::new(&as_dyn(&tables))?)
            }
            TestSpec::CoordinateDifference { groups, mode } => {
                let mut sets = Vec::with_capacity(groups.len());
                for group in groups {
                    let coords = group
                        .iter()
                        .map(|p| load_coordinates(self.resolve(p)))
                        .collect::<anyhow::Result<Vec<_>>>()?;
                    sets.push(coords);
                }
                Box::new(CoordinateDifference::new(sets, mesh.node_count(), *mode)?)
            }
            TestSpec::InterHemispheric {
                right_a,
                right_b,
                left_a,
                left_b,
                variance,
                shuffle_pool,
            } => {
                let tables = self.load_tables(&[
                    right_a.clone(),
                    right_b.clone(),
                    left_a.clone(),
                    left_b.clone(),
                ])?;
                let test = InterHemisphericT::new(&tables[0], &tables[1], &tables[2], &tables[3], *variance)?;
                match shuffle_pool {
                    Some(size) => Box::new(test.with_shuffle_pool(*size, self.run.seed)?),
                    None => Box::new(test),
                }
            }
        };
        Ok(computer)
    }

    /// Distortion table named by `[area_correction]`, if any
    pub fn load_area_correction(&self) -> anyhow::Result<Option<(ScalarTable, usize, CorrectionMode)>> {
        match &self.area_correction {
            Some(section) => {
                let table = load_scalar_table(self.resolve(&section.path))?;
                Ok(Some((table, section.column, section.mode)))
            }
            None => Ok(None),
        }
    }
}

fn as_dyn(tables: &[ScalarTable]) -> Vec<&dyn NodeScalarTable> {
    tables.iter().map(|t| t as &dyn NodeScalarTable).collect()
}
