// Text report of a finished run
//
// Layout: header block, one row per cluster, the significant clusters, then
// the warnings section. The warnings section is written even when empty.

use super::{ClusterRun, EngineConfig};
use crate::cluster::{Cluster, Sign};
use crate::error::Result;
use crate::mesh::SurfaceMesh;
use crate::null_distribution::NullPooling;
use crate::statistic::StatisticComputer;
use crate::table::ReportSink;

const CLUSTER_HEADER: [&str; 10] = [
    "Column",
    "Thresh",
    "Num-Nodes",
    "Area",
    "Area-Corrected",
    "COG-X",
    "COG-Y",
    "COG-Z",
    "P-Value",
    "Name",
];

pub(super) fn write_report(
    sink: &mut dyn ReportSink,
    computer: &dyn StatisticComputer,
    mesh: &dyn SurfaceMesh,
    config: &EngineConfig,
    run: &ClusterRun,
) -> Result<()> {
    let threshold = &config.threshold;
    let pooling = match config.null_pooling {
        NullPooling::PerSign => "per sign",
        NullPooling::Pooled => "pooled",
    };

    sink.append_line(&format!("Test: {}", computer.name()))?;
    for line in computer.describe_inputs() {
        sink.append_line(&line)?;
    }
    sink.append_line(&format!("Nodes: {}", mesh.node_count()))?;
    sink.append_line(&format!("Iterations: {}", config.iterations))?;
    sink.append_line(&format!("Seed: {}", config.seed))?;
    sink.append_line(&format!("Negative Threshold: {}", threshold.negative_threshold))?;
    sink.append_line(&format!("Positive Threshold: {}", threshold.positive_threshold))?;
    if threshold.negative_min_threshold.is_finite() {
        sink.append_line(&format!("Negative Min Threshold: {}", threshold.negative_min_threshold))?;
    }
    if threshold.positive_max_threshold.is_finite() {
        sink.append_line(&format!("Positive Max Threshold: {}", threshold.positive_max_threshold))?;
    }
    if config.cluster_filter.is_enabled() {
        sink.append_line(&format!("Minimum Cluster Nodes: {}", config.cluster_filter.min_nodes))?;
        sink.append_line(&format!("Minimum Cluster Area: {}", config.cluster_filter.min_area))?;
    }
    sink.append_line(&format!("Target P-Value: {}", threshold.target_p_value))?;
    sink.append_line(&format!("Null Pooling: {}", pooling))?;
    sink.append_line(&format!(
        "Significant Positive Area: {:.6}",
        run.significant_area_positive
    ))?;
    if computer.clusters_negative() {
        sink.append_line(&format!(
            "Significant Negative Area: {:.6}",
            run.significant_area_negative
        ))?;
    }
    sink.append_line(&format!("Failed Iterations: {}", run.null.failed_iterations()))?;
    sink.append_line("")?;

    sink.append_line("Clusters")?;
    sink.append_line(&CLUSTER_HEADER.join("\t"))?;
    for cluster in &run.clusters {
        sink.append_line(&cluster_row(cluster))?;
    }
    if run.clusters.is_empty() {
        sink.append_line("(none)")?;
    }
    sink.append_line("")?;

    sink.append_line(&format!(
        "Significant Clusters (P-Value <= {})",
        threshold.target_p_value
    ))?;
    let mut any = false;
    for cluster in run.significant_clusters(threshold.target_p_value) {
        any = true;
        let side = match cluster.sign {
            Sign::Positive => "positive",
            Sign::Negative => "negative",
        };
        sink.append_line(&format!(
            "{} ({}, p = {:.6})",
            cluster.name, side, cluster.p_value
        ))?;
    }
    if !any {
        sink.append_line("(none)")?;
    }
    sink.append_line("")?;

    sink.append_line(&format!("Warnings ({})", run.warnings().len()))?;
    for warning in run.warnings() {
        sink.append_line(&warning.to_string())?;
    }
    if run.warnings().is_empty() {
        sink.append_line("(none)")?;
    }
    Ok(())
}

fn cluster_row(cluster: &Cluster) -> String {
    let [x, y, z] = cluster.centroid;
    format!(
        "{}\t{:.3}\t{}\t{:.6}\t{:.6}\t{:.3}\t{:.3}\t{:.3}\t{:.6}\t{}",
        cluster.column_index,
        cluster.display_threshold(),
        cluster.node_count(),
        cluster.raw_area,
        cluster.corrected_area,
        x,
        y,
        z,
        cluster.p_value,
        cluster.name
    )
}
