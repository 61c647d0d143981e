use super::{
    average_ranks, ensure_finite, guarded_ratio, mean_and_variance, ComputeContext,
    NullNormalization, Relabeling, StatisticComputer, StatisticMaps, SubjectMatrix,
};
use crate::error::{ClusterStatsError, ComputeError, Result};
use crate::special::{t_p_value, Tails};
use crate::table::NodeScalarTable;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// One-sample T against a constant
///
/// Subject values are stored relative to the constant, so a sign flip of a
/// subject mirrors it around the constant. A vertex whose subjects have zero
/// deviation reports the raw mean difference.
pub struct OneSampleT {
    centered: SubjectMatrix,
    constant: f32,
    tails: Tails,
    paired: bool,
}

impl OneSampleT {
    pub fn new(table: &dyn NodeScalarTable, constant: f32) -> Result<Self> {
        let raw = SubjectMatrix::from_groups(&[table])?;
        let values = (0..raw.node_count())
            .flat_map(|node| raw.row(node).iter().map(move |v| v - constant))
            .collect();
        let centered = SubjectMatrix::from_rows(raw.node_count(), vec![raw.subject_count()], values)?;
        Ok(Self {
            centered,
            constant,
            tails: Tails::Two,
            paired: false,
        })
    }

    pub fn with_tails(mut self, tails: Tails) -> Self {
        self.tails = tails;
        self
    }

    pub fn subject_count(&self) -> usize {
        self.centered.subject_count()
    }
}

impl StatisticComputer for OneSampleT {
    fn name(&self) -> String {
        if self.paired {
            "Paired T-Test".to_string()
        } else {
            "One-Sample T-Test".to_string()
        }
    }

    fn statistic_label(&self) -> &'static str {
        "T-Map"
    }

    fn node_count(&self) -> usize {
        self.centered.node_count()
    }

    fn describe_inputs(&self) -> Vec<String> {
        let mut lines = vec![format!("Subjects: {}", self.subject_count())];
        if !self.paired {
            lines.push(format!("Test Constant: {}", self.constant));
        }
        lines
    }

    fn relabel(&self, rng: &mut StdRng) -> Relabeling {
        self.centered.sign_flipped(rng)
    }

    fn compute(
        &self,
        relabeling: &Relabeling,
        ctx: &ComputeContext<'_>,
    ) -> std::result::Result<StatisticMaps, ComputeError> {
        self.centered.check(relabeling)?;
        let nodes = self.centered.node_count();
        let n = self.centered.subject_count();

        let mut means = Vec::with_capacity(nodes);
        let mut variances = Vec::with_capacity(nodes);
        let mut buf = Vec::with_capacity(n);
        for node in 0..nodes {
            self.centered.gather(node, relabeling, &mut buf);
            let (mean, variance) = mean_and_variance(&buf);
            means.push(mean);
            variances.push(variance as f32);
        }
        let variances = ctx.smooth(variances);

        let sqrt_n = (n as f64).sqrt();
        let statistic: Vec<f32> = means
            .iter()
            .zip(&variances)
            .map(|(&mean, &variance)| {
                let denom = f64::from(variance.max(0.0)).sqrt() / sqrt_n;
                if denom != 0.0 {
                    (mean / denom) as f32
                } else {
                    mean as f32
                }
            })
            .collect();
        ensure_finite(&statistic)?;

        let mut maps = StatisticMaps::statistic_only(statistic);
        let dof = (n.saturating_sub(1)) as f32;
        if ctx.request.dof {
            maps.dof = Some(vec![dof; nodes]);
        }
        if ctx.request.p_value {
            maps.p_value = Some(
                maps.statistic
                    .iter()
                    .map(|&t| t_p_value(t, dof, self.tails))
                    .collect(),
            );
        }
        if ctx.is_real() {
            let label = if self.paired { "Mean Difference" } else { "Mean" };
            maps.auxiliary.push((
                label.to_string(),
                means.iter().map(|&m| m as f32 + self.constant).collect(),
            ));
        }
        Ok(maps)
    }
}

/// Paired T: one-sample T on per-subject differences A - B
pub struct PairedT {
    inner: OneSampleT,
}

impl PairedT {
    /// # Errors
    ///
    /// [`ClusterStatsError::Configuration`] when the two lists differ in
    /// subject count or node count.
    pub fn new(a: &dyn NodeScalarTable, b: &dyn NodeScalarTable) -> Result<Self> {
        if a.column_count() != b.column_count() {
            return Err(ClusterStatsError::Configuration(format!(
                "paired T-test needs equal subject counts, got {} and {}",
                a.column_count(),
                b.column_count()
            )));
        }
        let pooled = SubjectMatrix::from_groups(&[a, b])?;
        let n = a.column_count();
        let values = (0..pooled.node_count())
            .flat_map(|node| {
                let row = pooled.row(node);
                (0..n).map(move |s| row[s] - row[n + s])
            })
            .collect();
        let centered = SubjectMatrix::from_rows(pooled.node_count(), vec![n], values)?;
        Ok(Self {
            inner: OneSampleT {
                centered,
                constant: 0.0,
                tails: Tails::Two,
                paired: true,
            },
        })
    }

    pub fn with_tails(mut self, tails: Tails) -> Self {
        self.inner.tails = tails;
        self
    }
}

impl StatisticComputer for PairedT {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn statistic_label(&self) -> &'static str {
        self.inner.statistic_label()
    }

    fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    fn describe_inputs(&self) -> Vec<String> {
        vec![format!("Pairs: {}", self.inner.subject_count())]
    }

    fn relabel(&self, rng: &mut StdRng) -> Relabeling {
        self.inner.relabel(rng)
    }

    fn compute(
        &self,
        relabeling: &Relabeling,
        ctx: &ComputeContext<'_>,
    ) -> std::result::Result<StatisticMaps, ComputeError> {
        self.inner.compute(relabeling, ctx)
    }
}

/// Variance estimate of the two-sample T
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceMode {
    /// Shared variance, n1 + n2 - 2 degrees of freedom
    #[default]
    Pooled,
    /// Welch: separate variances, Satterthwaite degrees of freedom
    Unpooled,
    /// |mean A - mean B| scaled by the per-vertex deviation of the shuffled maps;
    /// no degrees-of-freedom or p-value maps
    Sigma,
}

/// Two-sample T comparing group A with group B
pub struct TwoSampleT {
    subjects: SubjectMatrix,
    mode: VarianceMode,
    rank_transform: bool,
    tails: Tails,
}

impl TwoSampleT {
    /// # Errors
    ///
    /// [`ClusterStatsError::Configuration`] when either group has fewer than
    /// two subjects or the groups differ in node count.
    pub fn new(a: &dyn NodeScalarTable, b: &dyn NodeScalarTable, mode: VarianceMode) -> Result<Self> {
        let subjects = SubjectMatrix::from_groups(&[a, b])?;
        if let Some((g, &size)) = subjects.group_sizes().iter().enumerate().find(|(_, s)| **s < 2) {
            return Err(ClusterStatsError::Configuration(format!(
                "two-sample T-test needs at least 2 subjects per group, group {} has {}",
                g, size
            )));
        }
        Ok(Self {
            subjects,
            mode,
            rank_transform: false,
            tails: Tails::Two,
        })
    }

    /// Replace values with their joint per-vertex ranks before computing T
    pub fn with_rank_transform(mut self, enabled: bool) -> Self {
        self.rank_transform = enabled;
        self
    }

    pub fn with_tails(mut self, tails: Tails) -> Self {
        self.tails = tails;
        self
    }

    fn welch_dof(v1: f64, n1: f64, v2: f64, n2: f64) -> f32 {
        let a = v1 / n1;
        let b = v2 / n2;
        let denom = a * a / (n1 - 1.0) + b * b / (n2 - 1.0);
        if denom > 0.0 {
            ((a + b) * (a + b) / denom).trunc() as f32
        } else {
            0.0
        }
    }
}

impl StatisticComputer for TwoSampleT {
    fn name(&self) -> String {
        let mode = match self.mode {
            VarianceMode::Pooled => "pooled variance",
            VarianceMode::Unpooled => "unpooled variance",
            VarianceMode::Sigma => "sigma",
        };
        if self.rank_transform {
            format!("Two-Sample T-Test ({}, Wilcoxon ranks)", mode)
        } else {
            format!("Two-Sample T-Test ({})", mode)
        }
    }

    fn statistic_label(&self) -> &'static str {
        match self.mode {
            VarianceMode::Sigma => "T-Sigma",
            _ => "T-Map",
        }
    }

    fn node_count(&self) -> usize {
        self.subjects.node_count()
    }

    fn describe_inputs(&self) -> Vec<String> {
        let sizes = self.subjects.group_sizes();
        vec![
            format!("Group A Subjects: {}", sizes[0]),
            format!("Group B Subjects: {}", sizes[1]),
        ]
    }

    fn relabel(&self, rng: &mut StdRng) -> Relabeling {
        self.subjects.shuffled(rng)
    }

    fn compute(
        &self,
        relabeling: &Relabeling,
        ctx: &ComputeContext<'_>,
    ) -> std::result::Result<StatisticMaps, ComputeError> {
        self.subjects.check(relabeling)?;
        let nodes = self.subjects.node_count();
        let sizes = self.subjects.group_sizes();
        let (n1, n2) = (sizes[0], sizes[1]);
        let (f1, f2) = (n1 as f64, n2 as f64);

        let mut means = Vec::with_capacity(nodes);
        let mut var_a = Vec::with_capacity(nodes);
        let mut var_b = Vec::with_capacity(nodes);
        let mut buf = Vec::with_capacity(n1 + n2);
        for node in 0..nodes {
            self.subjects.gather(node, relabeling, &mut buf);
            if self.rank_transform {
                average_ranks(&mut buf);
            }
            let (m1, v1) = mean_and_variance(&buf[..n1]);
            let (m2, v2) = mean_and_variance(&buf[n1..]);
            means.push((m1, m2));
            var_a.push(v1 as f32);
            var_b.push(v2 as f32);
        }
        let var_a = ctx.smooth(var_a);
        let var_b = ctx.smooth(var_b);

        let mut statistic = Vec::with_capacity(nodes);
        for node in 0..nodes {
            let (m1, m2) = means[node];
            let v1 = f64::from(var_a[node].max(0.0));
            let v2 = f64::from(var_b[node].max(0.0));
            let diff = m1 - m2;
            let t = match self.mode {
                VarianceMode::Pooled => {
                    let pooled = ((f1 - 1.0) * v1 + (f2 - 1.0) * v2) / (f1 + f2 - 2.0);
                    let denom = pooled.sqrt() * (1.0 / f1 + 1.0 / f2).sqrt();
                    guarded_ratio(diff, denom, node, "pooled variance")?
                }
                VarianceMode::Unpooled => {
                    let denom = (v1 / f1 + v2 / f2).sqrt();
                    guarded_ratio(diff, denom, node, "unpooled variance")?
                }
                VarianceMode::Sigma => diff.abs(),
            };
            statistic.push(t as f32);
        }
        ensure_finite(&statistic)?;

        let mut maps = StatisticMaps::statistic_only(statistic);
        // a mean difference has no T distribution to look up
        if ctx.request.needs_dof() && self.mode != VarianceMode::Sigma {
            let dof: Vec<f32> = (0..nodes)
                .map(|node| match self.mode {
                    VarianceMode::Pooled => (n1 + n2 - 2) as f32,
                    _ => Self::welch_dof(
                        f64::from(var_a[node]),
                        f1,
                        f64::from(var_b[node]),
                        f2,
                    ),
                })
                .collect();
            if ctx.request.p_value {
                maps.p_value = Some(
                    maps.statistic
                        .iter()
                        .zip(&dof)
                        .map(|(&t, &d)| t_p_value(t, d, self.tails))
                        .collect(),
                );
            }
            if ctx.request.dof {
                maps.dof = Some(dof);
            }
        }
        if ctx.is_real() {
            maps.auxiliary.push((
                "Mean Group A".to_string(),
                means.iter().map(|m| m.0 as f32).collect(),
            ));
            maps.auxiliary.push((
                "Mean Group B".to_string(),
                means.iter().map(|m| m.1 as f32).collect(),
            ));
        }
        Ok(maps)
    }

    fn clusters_negative(&self) -> bool {
        self.mode != VarianceMode::Sigma
    }

    fn null_normalization(&self) -> NullNormalization {
        match self.mode {
            VarianceMode::Sigma => NullNormalization::NodeSigma,
            _ => NullNormalization::None,
        }
    }
}
