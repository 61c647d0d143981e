//! Surface Clusters - permutation cluster statistics on triangulated surfaces
//!
//! This library computes a per-vertex statistic (T-tests, ANOVA,
//! Kruskal-Wallis, coordinate differences) over subject data defined on a
//! shared surface mesh, finds spatially contiguous supra-threshold clusters,
//! corrects their area for surface distortion, and assigns each cluster a
//! p-value against a permutation null distribution of maximum cluster area.
//!
//! The entry point is [`engine::ClusterStatisticsEngine`]; the `surfclust`
//! binary drives it from a TOML run file (see [`config`]).

pub mod cli;
pub mod cluster;
pub mod config;
pub mod distortion;
pub mod engine;
pub mod error;
pub mod io;
pub mod mesh;
pub mod null_distribution;
pub mod smoothing;
pub mod special;
pub mod statistic;
pub mod table;

#[cfg(test)]
mod test_support;

pub use error::{ClusterStatsError, Result};
