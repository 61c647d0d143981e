//! CLI argument parsing for surfclust

use crate::config::RunConfig;
use crate::null_distribution::NullPooling;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How observed clusters are compared against the null distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PoolingArg {
    /// Positive clusters against positive maxima, negative against negative
    PerSign,
    /// Every cluster against the larger maximum of each iteration
    Pooled,
}

impl From<PoolingArg> for NullPooling {
    fn from(arg: PoolingArg) -> Self {
        match arg {
            PoolingArg::PerSign => NullPooling::PerSign,
            PoolingArg::Pooled => NullPooling::Pooled,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "surfclust")]
#[command(version)]
#[command(about = "Permutation cluster statistics on triangulated surfaces", long_about = None)]
pub struct Cli {
    /// TOML run file describing inputs, test, thresholds and outputs
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Override the number of permutation iterations
    #[arg(short = 'n', long = "iterations", value_name = "N")]
    pub iterations: Option<usize>,

    /// Override the worker thread count
    #[arg(short = 'j', long = "threads", value_name = "N")]
    pub threads: Option<usize>,

    /// Override the permutation seed
    #[arg(long = "seed", value_name = "SEED")]
    pub seed: Option<u64>,

    /// Override how clusters are compared against the null distribution
    #[arg(long = "null-pooling", value_enum)]
    pub null_pooling: Option<PoolingArg>,

    /// Write the text report here instead of the configured path
    #[arg(short, long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Print permutation progress to stderr
    #[arg(long = "progress")]
    pub progress: bool,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Apply command-line overrides to a loaded run file
    pub fn apply_overrides(&self, config: &mut RunConfig) {
        if let Some(iterations) = self.iterations {
            config.run.iterations = iterations;
        }
        if let Some(threads) = self.threads {
            config.run.threads = threads;
        }
        if let Some(seed) = self.seed {
            config.run.seed = seed;
        }
        if let Some(pooling) = self.null_pooling {
            config.run.null_pooling = pooling.into();
        }
        if let Some(report) = &self.report {
            config.output.report = Some(report.clone());
        }
    }
}
