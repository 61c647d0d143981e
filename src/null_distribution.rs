//! Permutation null distribution of maximum cluster area
//!
//! Each iteration draws a relabeling of the subjects from an RNG seeded by
//! `(seed, iteration)` alone, recomputes the statistic map, clusters it and
//! records the largest corrected area per sign. Workers claim iteration
//! indices from a shared atomic counter and every result lands in slot `i`,
//! so the arrays do not depend on the thread count.
//!
//! A failed iteration records area 0 and an [`IterationWarning`].

use crate::cluster::{ClusterFinder, ClusterSizeFilter, Sign, ThresholdSpec};
use crate::distortion::DistortionCorrector;
use crate::error::{ClusterStatsError, IterationWarning, Result};
use crate::mesh::SurfaceMesh;
use crate::smoothing::VarianceSmoothingSpec;
use crate::statistic::{ComputeContext, StatisticComputer};
use crossbeam::queue::SegQueue;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Progress callback `(message, completed, total)`
pub type ProgressFn<'f> = dyn Fn(&str, usize, usize) + Send + Sync + 'f;

/// Message passed to the progress callback for permutation batches
pub const PERMUTATION_PROGRESS: &str = "Permutation iterations";

/// How observed clusters are compared against the null samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPooling {
    /// Positive clusters against positive maxima, negative against negative
    #[default]
    PerSign,
    /// Every cluster against the larger of both maxima of each iteration
    Pooled,
}

/// Per-iteration RNG derived from the run seed and the iteration index
pub fn iteration_rng(seed: u64, iteration: usize) -> StdRng {
    StdRng::seed_from_u64(splitmix64(seed ^ splitmix64(iteration as u64)))
}

fn splitmix64(value: u64) -> u64 {
    let mut z = value.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Maximum cluster areas of every permutation iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NullDistribution {
    pub max_positive_area: Vec<f32>,
    pub max_negative_area: Vec<f32>,
    /// Failed iterations, ascending by iteration index
    pub warnings: Vec<IterationWarning>,
    /// Statistic map of the last iteration, when it succeeded
    pub shuffled_map: Option<Vec<f32>>,
}

impl NullDistribution {
    pub fn iterations(&self) -> usize {
        self.max_positive_area.len()
    }

    pub fn failed_iterations(&self) -> usize {
        self.warnings.len()
    }

    fn samples(&self, sign: Sign, pooling: NullPooling) -> Vec<f32> {
        match (pooling, sign) {
            (NullPooling::PerSign, Sign::Positive) => self.max_positive_area.clone(),
            (NullPooling::PerSign, Sign::Negative) => self.max_negative_area.clone(),
            (NullPooling::Pooled, _) => self
                .max_positive_area
                .iter()
                .zip(&self.max_negative_area)
                .map(|(p, n)| p.max(*n))
                .collect(),
        }
    }

    /// Fraction of null samples with area at least `corrected_area`
    ///
    /// 1.0 for an empty distribution.
    pub fn p_value(&self, corrected_area: f32, sign: Sign, pooling: NullPooling) -> f32 {
        let samples = self.samples(sign, pooling);
        if samples.is_empty() {
            return 1.0;
        }
        let hits = samples.iter().filter(|&&s| s >= corrected_area).count();
        hits as f32 / samples.len() as f32
    }

    /// Corrected area a cluster must exceed to reach `target_p_value`
    ///
    /// Any cluster strictly larger than the returned area has a p-value at or
    /// below the target. 0.0 when every sample may be exceeded.
    pub fn significant_area(&self, target_p_value: f32, sign: Sign, pooling: NullPooling) -> f32 {
        let mut samples = self.samples(sign, pooling);
        if samples.is_empty() {
            return 0.0;
        }
        samples.sort_by(|a, b| b.total_cmp(a));
        let allowed = (target_p_value.clamp(0.0, 1.0) * samples.len() as f32).floor() as usize;
        samples.get(allowed).copied().unwrap_or(0.0)
    }
}

/// Result of one iteration before assembly
enum Outcome<T> {
    Done(T),
    Failed(IterationWarning),
}

/// Builds the permutation null distribution for one statistic computer
pub struct NullDistributionBuilder<'a> {
    computer: &'a dyn StatisticComputer,
    mesh: &'a dyn SurfaceMesh,
    corrector: &'a DistortionCorrector,
    threshold: ThresholdSpec,
    size_filter: ClusterSizeFilter,
    smoothing: VarianceSmoothingSpec,
    seed: u64,
    progress: Option<&'a ProgressFn<'a>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> NullDistributionBuilder<'a> {
    pub fn new(
        computer: &'a dyn StatisticComputer,
        mesh: &'a dyn SurfaceMesh,
        corrector: &'a DistortionCorrector,
        threshold: ThresholdSpec,
    ) -> Self {
        Self {
            computer,
            mesh,
            corrector,
            threshold,
            size_filter: ClusterSizeFilter::default(),
            smoothing: VarianceSmoothingSpec::disabled(),
            seed: 0,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Components below the filter do not count toward the maximum area
    pub fn with_size_filter(mut self, filter: ClusterSizeFilter) -> Self {
        self.size_filter = filter;
        self
    }

    pub fn with_smoothing(mut self, smoothing: VarianceSmoothingSpec) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_progress(mut self, progress: &'a ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Flag checked before each iteration is claimed
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run `iterations` permutations on `thread_count` workers (minimum 1)
    ///
    /// # Errors
    ///
    /// [`ClusterStatsError::Cancelled`] when the cancel flag is raised before
    /// all iterations finish; [`ClusterStatsError::Computation`] if a worker
    /// panics.
    pub fn build(&self, iterations: usize, thread_count: usize) -> Result<NullDistribution> {
        tracing::info!(iterations, thread_count, "building null distribution");
        let last = iterations.checked_sub(1);
        let outcomes = self.run_parallel(iterations, thread_count, |i| {
            let map = self.shuffled_statistic(i)?;
            let finder = self.finder();
            let positive = finder.max_corrected_area(&map, &self.threshold, Sign::Positive);
            let negative = if self.computer.clusters_negative() {
                finder.max_corrected_area(&map, &self.threshold, Sign::Negative)
            } else {
                0.0
            };
            let kept = (Some(i) == last).then_some(map);
            Ok((positive, negative, kept))
        })?;

        let mut null = NullDistribution {
            max_positive_area: vec![0.0; iterations],
            max_negative_area: vec![0.0; iterations],
            ..Default::default()
        };
        for (i, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Outcome::Done((positive, negative, kept)) => {
                    null.max_positive_area[i] = positive;
                    null.max_negative_area[i] = negative;
                    if kept.is_some() {
                        null.shuffled_map = kept;
                    }
                }
                Outcome::Failed(warning) => null.warnings.push(warning),
            }
        }
        tracing::info!(failed = null.failed_iterations(), "null distribution complete");
        Ok(null)
    }

    /// Two-phase build for per-vertex sigma normalization
    ///
    /// All shuffled maps are computed first. The per-vertex sample standard
    /// deviation across the successful maps then divides every shuffled map
    /// before it is clustered; vertices with sigma 0 are left unchanged.
    ///
    /// # Returns
    /// The null distribution (shuffled map already normalized) and the sigma
    /// map, which the caller applies to the real statistic.
    pub fn build_normalized(
        &self,
        iterations: usize,
        thread_count: usize,
    ) -> Result<(NullDistribution, Vec<f32>)> {
        tracing::info!(iterations, thread_count, "building sigma-normalized null distribution");
        let outcomes = self.run_parallel(iterations, thread_count, |i| self.shuffled_statistic(i))?;

        let maps: Vec<&Vec<f32>> = outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Done(map) => Some(map),
                Outcome::Failed(_) => None,
            })
            .collect();
        let sigma = node_sigma(&maps, self.computer.node_count());

        let finder = self.finder();
        let mut null = NullDistribution {
            max_positive_area: vec![0.0; iterations],
            max_negative_area: vec![0.0; iterations],
            ..Default::default()
        };
        for (i, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Outcome::Done(mut map) => {
                    normalize(&mut map, &sigma);
                    null.max_positive_area[i] =
                        finder.max_corrected_area(&map, &self.threshold, Sign::Positive);
                    if self.computer.clusters_negative() {
                        null.max_negative_area[i] =
                            finder.max_corrected_area(&map, &self.threshold, Sign::Negative);
                    }
                    if i + 1 == iterations {
                        null.shuffled_map = Some(map);
                    }
                }
                Outcome::Failed(warning) => null.warnings.push(warning),
            }
        }
        tracing::info!(failed = null.failed_iterations(), "null distribution complete");
        Ok((null, sigma))
    }

    fn shuffled_statistic(&self, iteration: usize) -> std::result::Result<Vec<f32>, IterationWarning> {
        let mut rng = iteration_rng(self.seed, iteration);
        let relabeling = self.computer.relabel(&mut rng);
        let ctx = ComputeContext::permutation(self.mesh, self.smoothing, iteration);
        self.computer
            .compute(&relabeling, &ctx)
            .map(|maps| maps.statistic)
            .map_err(|err| IterationWarning {
                iteration,
                message: err.to_string(),
            })
    }

    /// Execute `job` for every index on a scoped worker pool
    ///
    /// Results are returned in index order.
    fn run_parallel<T, F>(&self, total: usize, thread_count: usize, job: F) -> Result<Vec<Outcome<T>>>
    where
        T: Send,
        F: Fn(usize) -> std::result::Result<T, IterationWarning> + Sync,
    {
        let workers = thread_count.max(1).min(total.max(1));
        let next = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let results: SegQueue<(usize, Outcome<T>)> = SegQueue::new();
        let batch = (total / 20).max(1);

        let worker = || loop {
            if self.is_cancelled() {
                break;
            }
            let i = next.fetch_add(1, Ordering::SeqCst);
            if i >= total {
                break;
            }
            let outcome = match job(i) {
                Ok(value) => Outcome::Done(value),
                Err(warning) => {
                    tracing::warn!(iteration = i, message = %warning.message, "permutation iteration failed");
                    Outcome::Failed(warning)
                }
            };
            results.push((i, outcome));

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if done % batch == 0 || done == total {
                tracing::debug!(done, total, "permutation batch complete");
                if let Some(progress) = self.progress {
                    progress(PERMUTATION_PROGRESS, done, total);
                }
            }
        };

        crossbeam::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| worker());
            }
        })
        .map_err(|_| ClusterStatsError::Computation("permutation worker panicked".to_string()))?;

        let finished = completed.load(Ordering::SeqCst);
        if finished < total {
            return Err(ClusterStatsError::Cancelled {
                completed: finished,
                total,
            });
        }

        let mut slots: Vec<Option<Outcome<T>>> = (0..total).map(|_| None).collect();
        while let Some((i, outcome)) = results.pop() {
            slots[i] = Some(outcome);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    ClusterStatsError::Computation(format!("permutation iteration {} produced no result", i))
                })
            })
            .collect()
    }

    fn finder(&self) -> ClusterFinder<'a> {
        ClusterFinder::new(self.mesh, self.corrector).with_size_filter(self.size_filter)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Per-vertex sample standard deviation across maps; 0 with fewer than 2 maps
pub fn node_sigma(maps: &[&Vec<f32>], node_count: usize) -> Vec<f32> {
    let n = maps.len();
    if n < 2 {
        return vec![0.0; node_count];
    }
    (0..node_count)
        .map(|node| {
            let mean = maps.iter().map(|m| f64::from(m[node])).sum::<f64>() / n as f64;
            let ss: f64 = maps
                .iter()
                .map(|m| {
                    let d = f64::from(m[node]) - mean;
                    d * d
                })
                .sum();
            (ss / (n - 1) as f64).sqrt() as f32
        })
        .collect()
}

/// Divide each value by its vertex sigma, skipping zero sigma
pub fn normalize(map: &mut [f32], sigma: &[f32]) {
    for (value, &s) in map.iter_mut().zip(sigma) {
        if s > 0.0 {
            *value /= s;
        }
    }
}
