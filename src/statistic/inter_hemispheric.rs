use super::subjects::check_relabeling;
use super::{ensure_finite, ComputeContext, MapRequest, Relabeling, StatisticComputer, StatisticMaps, TwoSampleT, VarianceMode};
use crate::error::{ClusterStatsError, ComputeError, Result};
use crate::null_distribution::iteration_rng;
use crate::table::NodeScalarTable;
use rand::rngs::StdRng;
use rand::Rng;

const LEFT_POOL_STREAM: u64 = 0x4C45_4654;
const RIGHT_POOL_STREAM: u64 = 0x5249_4748;

/// Product of a left-hemisphere and a right-hemisphere two-sample T-map
///
/// Both hemispheres are registered to the same surface, so vertex `v` of the
/// left maps and vertex `v` of the right maps are homologous. The product is
/// large and positive where both hemispheres show a group difference in the
/// same direction, and negative where the directions disagree.
///
/// The null product pairs one shuffled left T-map with one shuffled right
/// T-map. With a pool size `P`, each hemisphere has `P` fixed shuffles derived
/// from the pool seed and every iteration draws one of each, so a run touches
/// at most `P` distinct relabelings per hemisphere. Without a pool every
/// iteration shuffles both hemispheres afresh.
///
/// Relabelings are a single permutation over `left subjects + right
/// subjects`: the first block reorders the left hemisphere, the second block
/// the right one, and no subject crosses between blocks.
pub struct InterHemisphericT {
    left: TwoSampleT,
    right: TwoSampleT,
    left_subjects: usize,
    right_subjects: usize,
    pool_size: Option<usize>,
    pool_seed: u64,
}

impl InterHemisphericT {
    /// # Errors
    ///
    /// [`ClusterStatsError::Configuration`] for a sigma variance mode, any
    /// group with fewer than two subjects, or hemispheres with different node
    /// counts.
    pub fn new(
        right_a: &dyn NodeScalarTable,
        right_b: &dyn NodeScalarTable,
        left_a: &dyn NodeScalarTable,
        left_b: &dyn NodeScalarTable,
        variance: VarianceMode,
    ) -> Result<Self> {
        if variance == VarianceMode::Sigma {
            return Err(ClusterStatsError::Configuration(
                "inter-hemispheric T-maps need a pooled or unpooled variance".to_string(),
            ));
        }
        if right_a.node_count() != left_a.node_count() {
            return Err(ClusterStatsError::Configuration(format!(
                "right hemisphere has {} nodes, left hemisphere has {}",
                right_a.node_count(),
                left_a.node_count()
            )));
        }
        let left = TwoSampleT::new(left_a, left_b, variance)?;
        let right = TwoSampleT::new(right_a, right_b, variance)?;
        Ok(Self {
            left,
            right,
            left_subjects: left_a.column_count() + left_b.column_count(),
            right_subjects: right_a.column_count() + right_b.column_count(),
            pool_size: None,
            pool_seed: 0,
        })
    }

    /// Draw null pairs from `size` fixed shuffles per hemisphere
    ///
    /// # Errors
    ///
    /// [`ClusterStatsError::Configuration`] for a pool size of 0.
    pub fn with_shuffle_pool(mut self, size: usize, seed: u64) -> Result<Self> {
        if size == 0 {
            return Err(ClusterStatsError::Configuration(
                "hemisphere shuffle pool must hold at least 1 map".to_string(),
            ));
        }
        self.pool_size = Some(size);
        self.pool_seed = seed;
        Ok(self)
    }

    pub fn pool_size(&self) -> Option<usize> {
        self.pool_size
    }

    fn pool_member(&self, computer: &TwoSampleT, stream: u64, member: usize) -> Relabeling {
        let mut rng = iteration_rng(self.pool_seed ^ stream, member);
        computer.relabel(&mut rng)
    }

    /// Split a combined relabeling into per-hemisphere relabelings
    fn split(&self, relabeling: &Relabeling) -> std::result::Result<(Relabeling, Relabeling), ComputeError> {
        check_relabeling(relabeling, self.left_subjects + self.right_subjects)?;
        match relabeling {
            Relabeling::Identity => Ok((Relabeling::Identity, Relabeling::Identity)),
            Relabeling::Permutation(order) => {
                let (left, right) = order.split_at(self.left_subjects);
                if left.iter().any(|&s| s >= self.left_subjects) {
                    return Err(ComputeError::InvalidInput(
                        "permutation moves a right-hemisphere subject into the left block".to_string(),
                    ));
                }
                let right = right.iter().map(|&s| s - self.left_subjects).collect();
                Ok((
                    Relabeling::Permutation(left.to_vec()),
                    Relabeling::Permutation(right),
                ))
            }
            Relabeling::SignFlip(_) => Err(ComputeError::InvalidInput(
                "inter-hemispheric test cannot apply sign flips".to_string(),
            )),
        }
    }
}

fn as_order(relabeling: Relabeling, subjects: usize) -> Vec<usize> {
    match relabeling {
        Relabeling::Permutation(order) => order,
        _ => (0..subjects).collect(),
    }
}

impl StatisticComputer for InterHemisphericT {
    fn name(&self) -> String {
        "Inter-Hemispheric T-Map Product".to_string()
    }

    fn statistic_label(&self) -> &'static str {
        "T-Map"
    }

    fn node_count(&self) -> usize {
        self.left.node_count()
    }

    fn describe_inputs(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .right
            .describe_inputs()
            .into_iter()
            .map(|line| format!("Right {}", line))
            .chain(self.left.describe_inputs().into_iter().map(|line| format!("Left {}", line)))
            .collect();
        if let Some(size) = self.pool_size {
            lines.push(format!("Hemisphere Shuffle Pool: {}", size));
        }
        lines
    }

    fn relabel(&self, rng: &mut StdRng) -> Relabeling {
        let (left, right) = match self.pool_size {
            Some(size) => {
                let left_member = rng.gen_range(0..size);
                let right_member = rng.gen_range(0..size);
                (
                    self.pool_member(&self.left, LEFT_POOL_STREAM, left_member),
                    self.pool_member(&self.right, RIGHT_POOL_STREAM, right_member),
                )
            }
            None => (self.left.relabel(rng), self.right.relabel(rng)),
        };

        let mut order = as_order(left, self.left_subjects);
        order.extend(
            as_order(right, self.right_subjects)
                .into_iter()
                .map(|s| s + self.left_subjects),
        );
        Relabeling::Permutation(order)
    }

    fn compute(
        &self,
        relabeling: &Relabeling,
        ctx: &ComputeContext<'_>,
    ) -> std::result::Result<StatisticMaps, ComputeError> {
        let (left_relabeling, right_relabeling) = self.split(relabeling)?;
        // hemisphere maps only ever need their T values
        let inner = ComputeContext {
            mesh: ctx.mesh,
            smoothing: ctx.smoothing,
            request: MapRequest::none(),
            iteration: ctx.iteration,
        };
        let left = self.left.compute(&left_relabeling, &inner)?.statistic;
        let right = self.right.compute(&right_relabeling, &inner)?.statistic;

        let product: Vec<f32> = left.iter().zip(&right).map(|(l, r)| l * r).collect();
        ensure_finite(&product)?;
        let mut maps = StatisticMaps::statistic_only(product);
        if ctx.is_real() {
            maps.auxiliary.push(("Left T-Map".to_string(), left));
            maps.auxiliary.push(("Right T-Map".to_string(), right));
        }
        Ok(maps)
    }
}
