use super::{
    average_ranks, ensure_finite, ComputeContext, Relabeling, StatisticComputer, StatisticMaps,
    SubjectMatrix,
};
use crate::error::{ClusterStatsError, ComputeError, Result};
use crate::special::chi_squared_p_value;
use crate::table::NodeScalarTable;
use rand::rngs::StdRng;

/// Kruskal-Wallis H test across two or more groups
///
/// Subjects are ranked jointly at each vertex, ties sharing the average rank.
/// H is divided by the tie correction `1 - sum(t^3 - t) / (N^3 - N)`; a vertex
/// where every value is tied gets H = 0.
///
/// # References
///
/// Kruskal, W. H., & Wallis, W. A. (1952). Use of ranks in one-criterion
/// variance analysis. *JASA*, 47(260).
pub struct KruskalWallis {
    subjects: SubjectMatrix,
}

impl KruskalWallis {
    pub fn new(groups: &[&dyn NodeScalarTable]) -> Result<Self> {
        if groups.len() < 2 {
            return Err(ClusterStatsError::Configuration(format!(
                "Kruskal-Wallis needs at least 2 groups, got {}",
                groups.len()
            )));
        }
        Ok(Self {
            subjects: SubjectMatrix::from_groups(groups)?,
        })
    }

    fn h_statistic(&self, ranks: &mut [f32]) -> f64 {
        let n = ranks.len() as f64;
        let ties = average_ranks(ranks);

        let mut sum = 0.0;
        for range in self.subjects.group_ranges() {
            let size = range.len() as f64;
            let rank_sum: f64 = ranks[range].iter().map(|&r| f64::from(r)).sum();
            sum += rank_sum * rank_sum / size;
        }
        let h = 12.0 / (n * (n + 1.0)) * sum - 3.0 * (n + 1.0);

        let correction = 1.0 - ties / (n * n * n - n);
        if correction > 0.0 {
            (h / correction).max(0.0)
        } else {
            0.0
        }
    }
}

impl StatisticComputer for KruskalWallis {
    fn name(&self) -> String {
        "Kruskal-Wallis".to_string()
    }

    fn statistic_label(&self) -> &'static str {
        "H-Map"
    }

    fn node_count(&self) -> usize {
        self.subjects.node_count()
    }

    fn describe_inputs(&self) -> Vec<String> {
        self.subjects
            .group_sizes()
            .iter()
            .enumerate()
            .map(|(g, size)| format!("Group {} Subjects: {}", g + 1, size))
            .collect()
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
        let mut buf = Vec::with_capacity(self.subjects.subject_count());
        let statistic: Vec<f32> = (0..nodes)
            .map(|node| {
                self.subjects.gather(node, relabeling, &mut buf);
                self.h_statistic(&mut buf) as f32
            })
            .collect();
        ensure_finite(&statistic)?;

        let dof = (self.subjects.group_sizes().len() - 1) as f32;
        let mut maps = StatisticMaps::statistic_only(statistic);
        if ctx.request.dof {
            maps.dof = Some(vec![dof; nodes]);
        }
        if ctx.request.p_value {
            maps.p_value = Some(
                maps.statistic
                    .iter()
                    .map(|&h| chi_squared_p_value(h, dof))
                    .collect(),
            );
        }
        Ok(maps)
    }

    fn clusters_negative(&self) -> bool {
        false
    }
}
