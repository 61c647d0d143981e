use super::{
    ensure_finite, guarded_ratio, ComputeContext, Relabeling, StatisticComputer, StatisticMaps,
    SubjectMatrix,
};
use crate::error::{ClusterStatsError, ComputeError, Result};
use crate::special::f_p_value;
use crate::table::NodeScalarTable;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Effects model of a two-way ANOVA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnovaModel {
    /// Both factors fixed: every effect is tested against MSE
    #[default]
    Fixed,
    /// Both factors random: main effects are tested against MSAB
    Random,
    /// Factor A fixed, factor B random: A against MSAB, B against MSE
    Mixed,
}

/// Which F statistic is mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnovaEffect {
    FactorA,
    FactorB,
    #[default]
    Interaction,
}

/// Two-way ANOVA over a rows x columns grid of cells
///
/// Rows are the levels of factor A, columns the levels of factor B. Cell
/// `(i, j)` is input table `i * columns + j`; every cell holds the same
/// number of subjects.
pub struct TwoWayAnova {
    subjects: SubjectMatrix,
    rows: usize,
    cols: usize,
    per_cell: usize,
    model: AnovaModel,
    effect: AnovaEffect,
}

impl TwoWayAnova {
    /// Check the grid shape against the number of supplied inputs
    ///
    /// Runs before any input is read.
    pub fn check_layout(rows: usize, cols: usize, input_count: usize) -> Result<()> {
        if rows < 2 || cols < 2 {
            return Err(ClusterStatsError::Configuration(format!(
                "two-way ANOVA needs at least 2 levels per factor, got {} x {}",
                rows, cols
            )));
        }
        if input_count != rows * cols {
            return Err(ClusterStatsError::Configuration(format!(
                "two-way ANOVA with {} rows and {} columns needs {} inputs, got {}",
                rows,
                cols,
                rows * cols,
                input_count
            )));
        }
        Ok(())
    }

    pub fn new(
        rows: usize,
        cols: usize,
        model: AnovaModel,
        effect: AnovaEffect,
        cells: &[&dyn NodeScalarTable],
    ) -> Result<Self> {
        Self::check_layout(rows, cols, cells.len())?;
        let subjects = SubjectMatrix::from_groups(cells)?;

        let per_cell = subjects.group_sizes()[0];
        if let Some(pos) = subjects.group_sizes().iter().position(|&s| s != per_cell) {
            return Err(ClusterStatsError::Configuration(format!(
                "two-way ANOVA needs equal cell sizes, cell 0 has {} subjects and cell {} has {}",
                per_cell,
                pos,
                subjects.group_sizes()[pos]
            )));
        }
        if per_cell < 2 {
            return Err(ClusterStatsError::Configuration(
                "two-way ANOVA needs at least 2 subjects per cell".to_string(),
            ));
        }

        Ok(Self {
            subjects,
            rows,
            cols,
            per_cell,
            model,
            effect,
        })
    }

    /// (numerator df, denominator df) of the mapped effect
    fn degrees_of_freedom(&self) -> (f32, f32) {
        let (df_a, df_b, df_ab, df_e) = self.factor_dofs();
        let numerator = match self.effect {
            AnovaEffect::FactorA => df_a,
            AnovaEffect::FactorB => df_b,
            AnovaEffect::Interaction => df_ab,
        };
        let denominator = if self.uses_interaction_denominator() {
            df_ab
        } else {
            df_e
        };
        (numerator as f32, denominator as f32)
    }

    fn factor_dofs(&self) -> (usize, usize, usize, usize) {
        let df_a = self.rows - 1;
        let df_b = self.cols - 1;
        (df_a, df_b, df_a * df_b, self.rows * self.cols * (self.per_cell - 1))
    }

    fn uses_interaction_denominator(&self) -> bool {
        matches!(
            (self.model, self.effect),
            (AnovaModel::Random, AnovaEffect::FactorA)
                | (AnovaModel::Random, AnovaEffect::FactorB)
                | (AnovaModel::Mixed, AnovaEffect::FactorA)
        )
    }

    fn f_at(&self, node: usize, values: &[f32]) -> std::result::Result<f64, ComputeError> {
        let (a, b, n) = (self.rows, self.cols, self.per_cell);
        let nf = n as f64;

        let mut cell_means = vec![0.0f64; a * b];
        for (cell, mean) in cell_means.iter_mut().enumerate() {
            let slice = &values[cell * n..(cell + 1) * n];
            *mean = slice.iter().map(|&v| f64::from(v)).sum::<f64>() / nf;
        }
        let row_means: Vec<f64> = (0..a)
            .map(|i| (0..b).map(|j| cell_means[i * b + j]).sum::<f64>() / b as f64)
            .collect();
        let col_means: Vec<f64> = (0..b)
            .map(|j| (0..a).map(|i| cell_means[i * b + j]).sum::<f64>() / a as f64)
            .collect();
        let grand = cell_means.iter().sum::<f64>() / (a * b) as f64;

        let ss_a = (b as f64) * nf * row_means.iter().map(|m| (m - grand).powi(2)).sum::<f64>();
        let ss_b = (a as f64) * nf * col_means.iter().map(|m| (m - grand).powi(2)).sum::<f64>();
        let mut ss_ab = 0.0;
        let mut ss_e = 0.0;
        for i in 0..a {
            for j in 0..b {
                let cell = i * b + j;
                let m = cell_means[cell];
                ss_ab += (m - row_means[i] - col_means[j] + grand).powi(2);
                ss_e += values[cell * n..(cell + 1) * n]
                    .iter()
                    .map(|&v| (f64::from(v) - m).powi(2))
                    .sum::<f64>();
            }
        }
        ss_ab *= nf;

        let (df_a, df_b, df_ab, df_e) = self.factor_dofs();
        let ms_a = ss_a / df_a as f64;
        let ms_b = ss_b / df_b as f64;
        let ms_ab = ss_ab / df_ab as f64;
        let ms_e = ss_e / df_e as f64;

        let numerator = match self.effect {
            AnovaEffect::FactorA => ms_a,
            AnovaEffect::FactorB => ms_b,
            AnovaEffect::Interaction => ms_ab,
        };
        if self.uses_interaction_denominator() {
            guarded_ratio(numerator, ms_ab, node, "interaction mean square")
        } else {
            guarded_ratio(numerator, ms_e, node, "error mean square")
        }
    }
}

impl StatisticComputer for TwoWayAnova {
    fn name(&self) -> String {
        let model = match self.model {
            AnovaModel::Fixed => "fixed effects",
            AnovaModel::Random => "random effects",
            AnovaModel::Mixed => "mixed effects",
        };
        let effect = match self.effect {
            AnovaEffect::FactorA => "factor A",
            AnovaEffect::FactorB => "factor B",
            AnovaEffect::Interaction => "interaction",
        };
        format!("Two-Way ANOVA ({}, {})", model, effect)
    }

    fn statistic_label(&self) -> &'static str {
        "F-Map"
    }

    fn node_count(&self) -> usize {
        self.subjects.node_count()
    }

    fn describe_inputs(&self) -> Vec<String> {
        vec![
            format!("Factor A Levels: {}", self.rows),
            format!("Factor B Levels: {}", self.cols),
            format!("Subjects Per Cell: {}", self.per_cell),
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
        let mut buf = Vec::with_capacity(self.subjects.subject_count());
        let mut statistic = Vec::with_capacity(nodes);
        for node in 0..nodes {
            self.subjects.gather(node, relabeling, &mut buf);
            statistic.push(self.f_at(node, &buf)? as f32);
        }
        ensure_finite(&statistic)?;

        let (df_num, df_den) = self.degrees_of_freedom();
        let mut maps = StatisticMaps::statistic_only(statistic);
        if ctx.request.dof {
            maps.dof = Some(vec![df_num; nodes]);
        }
        if ctx.request.p_value {
            maps.p_value = Some(
                maps.statistic
                    .iter()
                    .map(|&f| f_p_value(f, df_num, df_den))
                    .collect(),
            );
        }
        Ok(maps)
    }

    fn clusters_negative(&self) -> bool {
        false
    }
}

/// One-way ANOVA across two or more groups
pub struct OneWayAnova {
    subjects: SubjectMatrix,
}

impl OneWayAnova {
    pub fn new(groups: &[&dyn NodeScalarTable]) -> Result<Self> {
        if groups.len() < 2 {
            return Err(ClusterStatsError::Configuration(format!(
                "one-way ANOVA needs at least 2 groups, got {}",
                groups.len()
            )));
        }
        let subjects = SubjectMatrix::from_groups(groups)?;
        if subjects.subject_count() <= groups.len() {
            return Err(ClusterStatsError::Configuration(format!(
                "one-way ANOVA needs more subjects ({}) than groups ({})",
                subjects.subject_count(),
                groups.len()
            )));
        }
        Ok(Self { subjects })
    }

    fn dofs(&self) -> (f32, f32) {
        let k = self.subjects.group_sizes().len();
        let n = self.subjects.subject_count();
        ((k - 1) as f32, (n - k) as f32)
    }
}

impl StatisticComputer for OneWayAnova {
    fn name(&self) -> String {
        "One-Way ANOVA".to_string()
    }

    fn statistic_label(&self) -> &'static str {
        "F-Map"
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
        let ranges = self.subjects.group_ranges();
        let (df_between, df_within) = self.dofs();
        let nodes = self.subjects.node_count();

        let mut buf = Vec::with_capacity(self.subjects.subject_count());
        let mut statistic = Vec::with_capacity(nodes);
        for node in 0..nodes {
            self.subjects.gather(node, relabeling, &mut buf);
            let grand = buf.iter().map(|&v| f64::from(v)).sum::<f64>() / buf.len() as f64;
            let mut ss_between = 0.0;
            let mut ss_within = 0.0;
            for range in &ranges {
                let group = &buf[range.clone()];
                let mean = group.iter().map(|&v| f64::from(v)).sum::<f64>() / group.len() as f64;
                ss_between += group.len() as f64 * (mean - grand).powi(2);
                ss_within += group.iter().map(|&v| (f64::from(v) - mean).powi(2)).sum::<f64>();
            }
            let f = guarded_ratio(
                ss_between / f64::from(df_between),
                ss_within / f64::from(df_within),
                node,
                "within-group mean square",
            )?;
            statistic.push(f as f32);
        }
        ensure_finite(&statistic)?;

        let mut maps = StatisticMaps::statistic_only(statistic);
        if ctx.request.dof {
            maps.dof = Some(vec![df_between; nodes]);
        }
        if ctx.request.p_value {
            maps.p_value = Some(
                maps.statistic
                    .iter()
                    .map(|&f| f_p_value(f, df_between, df_within))
                    .collect(),
            );
        }
        Ok(maps)
    }

    fn clusters_negative(&self) -> bool {
        false
    }
}
