// Cluster statistics orchestration
//
// ClusterStatisticsEngine runs the whole pipeline for one statistic computer:
// validate, compute the real map, cluster it, build the permutation null
// distribution, assign p-values, then fill the label table, the statistic
// and cluster tables, and the text report. Only the permutation phase runs
// on worker threads.

mod report;


use crate::cluster::{Cluster, ClusterFinder, ClusterSizeFilter, Sign, ThresholdSpec};
use crate::distortion::{CorrectionMode, DistortionCorrector};
use crate::error::{ClusterStatsError, IterationWarning, Result};
use crate::mesh::SurfaceMesh;
use crate::null_distribution::{normalize, NullDistribution, NullDistributionBuilder, NullPooling, ProgressFn};
use crate::smoothing::VarianceSmoothingSpec;
use crate::statistic::{ComputeContext, MapRequest, NullNormalization, Relabeling, StatisticComputer, StatisticMaps};
use crate::table::{LabelTable, NodeScalarTable, NodeScalarTableMut, ReportSink, ScalarTable};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Progress message before the real statistic is computed
pub const PROGRESS_COMPUTING: &str = "Computing statistic";
/// Progress message once every cluster has its p-value
pub const PROGRESS_CLUSTERING_DONE: &str = "Clustering complete";

/// Column name of the 1 - p map in the cluster table
pub const ONE_MINUS_P_COLUMN: &str = "1 - P";

/// Run parameters that do not depend on the chosen test
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub threshold: ThresholdSpec,
    pub iterations: usize,
    /// Worker threads for the permutation phase; 0 is treated as 1
    pub threads: usize,
    pub seed: u64,
    pub smoothing: VarianceSmoothingSpec,
    pub maps: MapRequest,
    pub null_pooling: NullPooling,
    /// Applied to observed and permutation clusters
    pub cluster_filter: ClusterSizeFilter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdSpec::default(),
            iterations: 1000,
            threads: 1,
            seed: 0,
            smoothing: VarianceSmoothingSpec::default(),
            maps: MapRequest::none(),
            null_pooling: NullPooling::PerSign,
            cluster_filter: ClusterSizeFilter::default(),
        }
    }
}

impl EngineConfig {
    /// Quick exploratory runs
    pub fn exploratory() -> Self {
        Self {
            iterations: 100,
            ..Default::default()
        }
    }

    /// Publication-grade permutation count with every optional map
    pub fn thorough() -> Self {
        Self {
            iterations: 10_000,
            maps: MapRequest::all(),
            ..Default::default()
        }
    }

    /// # Errors
    ///
    /// [`ClusterStatsError::Configuration`] for zero iterations, invalid
    /// thresholds, an invalid smoothing strength or a negative minimum
    /// cluster area.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(ClusterStatsError::Configuration(format!(
                "iterations must be at least 1 to test clusters at p = {}",
                self.threshold.target_p_value
            )));
        }
        self.threshold.validate()?;
        self.cluster_filter.validate()?;
        self.smoothing.validate()
    }

    fn worker_threads(&self) -> usize {
        self.threads.max(1)
    }
}

/// Distortion column used to correct cluster areas
#[derive(Clone, Copy)]
pub struct AreaCorrection<'a> {
    pub table: &'a dyn NodeScalarTable,
    pub column: usize,
    pub mode: CorrectionMode,
}

/// Everything a finished run produced
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRun {
    /// Clusters by descending corrected area, p-values assigned
    pub clusters: Vec<Cluster>,
    /// Per-vertex cluster label, "unassigned" outside every cluster
    pub labels: LabelTable,
    /// Real statistic, optional DOF / p-value maps, auxiliary maps, shuffled map
    pub statistics: ScalarTable,
    /// One column per cluster, the statistic column, and "1 - P"
    pub cluster_table: ScalarTable,
    pub null: NullDistribution,
    pub significant_area_positive: f32,
    pub significant_area_negative: f32,
}

impl ClusterRun {
    pub fn warnings(&self) -> &[IterationWarning] {
        &self.null.warnings
    }

    pub fn significant_clusters(&self, target_p_value: f32) -> impl Iterator<Item = &Cluster> {
        self.clusters
            .iter()
            .filter(move |c| c.is_significant(target_p_value))
    }
}

/// Permutation cluster test over one surface
pub struct ClusterStatisticsEngine<'a> {
    computer: &'a dyn StatisticComputer,
    mesh: &'a dyn SurfaceMesh,
    config: EngineConfig,
    area_correction: Option<AreaCorrection<'a>>,
    progress: Option<Box<ProgressFn<'static>>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> ClusterStatisticsEngine<'a> {
    pub fn new(computer: &'a dyn StatisticComputer, mesh: &'a dyn SurfaceMesh, config: EngineConfig) -> Self {
        Self {
            computer,
            mesh,
            config,
            area_correction: None,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_area_correction(mut self, correction: AreaCorrection<'a>) -> Self {
        self.area_correction = Some(correction);
        self
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(&str, usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Flag polled between permutation iterations
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline, appending the report to `report`
    ///
    /// # Errors
    ///
    /// Configuration and geometry problems are reported before any statistic
    /// is computed. A degenerate real statistic is a
    /// [`ClusterStatsError::Computation`]; failed permutation iterations only
    /// add warnings to the run.
    pub fn execute(&self, report: &mut dyn ReportSink) -> Result<ClusterRun> {
        let corrector = self.validate()?;
        let iterations = self.config.iterations;
        tracing::info!(
            test = %self.computer.name(),
            nodes = self.mesh.node_count(),
            iterations,
            threads = self.config.worker_threads(),
            "starting cluster statistics run"
        );

        self.report_progress(PROGRESS_COMPUTING, 0, iterations);
        let ctx = ComputeContext::real(self.mesh, self.config.smoothing, self.config.maps);
        let mut real = self.computer.compute(&Relabeling::Identity, &ctx)?;
        tracing::info!("real statistic computed");

        let mut builder = NullDistributionBuilder::new(self.computer, self.mesh, &corrector, self.config.threshold)
            .with_seed(self.config.seed)
            .with_size_filter(self.config.cluster_filter)
            .with_smoothing(self.config.smoothing);
        if let Some(progress) = self.progress.as_deref() {
            builder = builder.with_progress(progress);
        }
        if let Some(cancel) = &self.cancel {
            builder = builder.with_cancel_flag(Arc::clone(cancel));
        }

        // Sigma normalization needs every shuffled map before the real map can be clustered
        let presampled = match self.computer.null_normalization() {
            NullNormalization::NodeSigma => {
                let (null, sigma) = builder.build_normalized(iterations, self.config.worker_threads())?;
                normalize(&mut real.statistic, &sigma);
                Some(null)
            }
            NullNormalization::None => None,
        };

        let finder = ClusterFinder::new(self.mesh, &corrector).with_size_filter(self.config.cluster_filter);
        let mut clusters = finder.find_clusters(&real.statistic, &self.config.threshold, Sign::Positive, 0);
        if self.computer.clusters_negative() {
            clusters.extend(finder.find_clusters(&real.statistic, &self.config.threshold, Sign::Negative, 0));
        }
        tracing::info!(count = clusters.len(), "observed clusters");

        let null = match presampled {
            Some(null) => null,
            None => builder.build(iterations, self.config.worker_threads())?,
        };

        let pooling = self.config.null_pooling;
        for cluster in &mut clusters {
            cluster.p_value = null.p_value(cluster.corrected_area, cluster.sign, pooling);
            tracing::debug!(name = %cluster.name, p_value = cluster.p_value, "cluster p-value");
        }
        sort_clusters(&mut clusters);
        disambiguate_names(&mut clusters);

        let target = self.config.threshold.target_p_value;
        let run = ClusterRun {
            labels: label_table(self.mesh.node_count(), &clusters),
            statistics: self.statistic_table(&real, &null),
            cluster_table: self.cluster_table(&real.statistic, &clusters),
            significant_area_positive: null.significant_area(target, Sign::Positive, pooling),
            significant_area_negative: null.significant_area(target, Sign::Negative, pooling),
            clusters,
            null,
        };

        report::write_report(report, self.computer, self.mesh, &self.config, &run)?;
        self.report_progress(PROGRESS_CLUSTERING_DONE, iterations, iterations);
        tracing::info!(
            clusters = run.clusters.len(),
            significant = run.significant_clusters(target).count(),
            failed_iterations = run.null.failed_iterations(),
            "cluster statistics run complete"
        );
        Ok(run)
    }

    /// Input checks that need no statistic computation
    fn validate(&self) -> Result<DistortionCorrector> {
        self.config.validate()?;

        let nodes = self.mesh.node_count();
        if nodes == 0 {
            return Err(ClusterStatsError::Geometry("surface has zero nodes".to_string()));
        }
        if self.computer.node_count() != nodes {
            return Err(ClusterStatsError::Configuration(format!(
                "input data has {} nodes, surface has {}",
                self.computer.node_count(),
                nodes
            )));
        }
        if self.computer.requires_single_piece() {
            self.mesh.require_single_piece()?;
        }

        match &self.area_correction {
            Some(c) => DistortionCorrector::from_table(c.table, c.column, c.mode, nodes),
            None => Ok(DistortionCorrector::identity()),
        }
    }

    fn report_progress(&self, message: &str, completed: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(message, completed, total);
        }
    }

    fn statistic_table(&self, real: &StatisticMaps, null: &NullDistribution) -> ScalarTable {
        let nodes = self.mesh.node_count();
        let label = self.computer.statistic_label();
        let mut table = ScalarTable::new(nodes);

        write_column(&mut table, label, &real.statistic);
        if let Some(dof) = &real.dof {
            write_column(&mut table, "Degrees of Freedom", dof);
        }
        if let Some(p) = &real.p_value {
            write_column(&mut table, "P-Value", p);
        }
        for (name, values) in &real.auxiliary {
            write_column(&mut table, name, values);
        }
        if let Some(shuffled) = &null.shuffled_map {
            write_column(&mut table, &format!("Shuffled {}", label), shuffled);
        }
        table
    }

    fn cluster_table(&self, statistic: &[f32], clusters: &[Cluster]) -> ScalarTable {
        let mut table = ScalarTable::new(self.mesh.node_count());
        for cluster in clusters {
            let column = table.add_column(&cluster.name);
            for &v in &cluster.vertices {
                table.set_value_at(v, column, statistic[v]);
            }
        }
        write_column(&mut table, self.computer.statistic_label(), statistic);
        let one_minus_p = table.add_column(ONE_MINUS_P_COLUMN);
        for cluster in clusters {
            for &v in &cluster.vertices {
                table.set_value_at(v, one_minus_p, 1.0 - cluster.p_value);
            }
        }
        table
    }
}

fn write_column(table: &mut ScalarTable, name: &str, values: &[f32]) {
    let column = table.add_column(name);
    for (node, &value) in values.iter().enumerate() {
        table.set_value_at(node, column, value);
    }
}

/// Descending corrected area, then column, then lowest member vertex
pub fn sort_clusters(clusters: &mut [Cluster]) {
    clusters.sort_by(|a, b| {
        b.corrected_area
            .total_cmp(&a.corrected_area)
            .then(a.column_index.cmp(&b.column_index))
            .then(a.min_vertex().cmp(&b.min_vertex()))
    });
}

/// Suffix repeated names with `_2`, `_3`, ... in sorted order
fn disambiguate_names(clusters: &mut [Cluster]) {
    let mut seen: Vec<String> = Vec::with_capacity(clusters.len());
    for cluster in clusters.iter_mut() {
        if seen.contains(&cluster.name) {
            let base = cluster.name.clone();
            let mut k = 2;
            while seen.contains(&format!("{}_{}", base, k)) {
                k += 1;
            }
            cluster.name = format!("{}_{}", base, k);
        }
        seen.push(cluster.name.clone());
    }
}

fn label_table(node_count: usize, clusters: &[Cluster]) -> LabelTable {
    let mut labels = LabelTable::new(node_count);
    for cluster in clusters {
        let label = labels.add_label(&cluster.name);
        for &v in &cluster.vertices {
            labels.assign(v, label);
        }
    }
    labels
}
