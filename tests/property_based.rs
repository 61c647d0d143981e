//! Property-based tests for clustering and p-value assignment
//!
//! Properties covered:
//! 1. Raising the positive threshold never grows the positive clusters
//! 2. A neutral distortion column leaves corrected area equal to raw area
//! 3. Cluster p-values stay in [0, 1] and do not increase with area
//! 4. Every cluster is connected through threshold-passing vertices
//! 5. Null distributions do not depend on the thread count

mod utils;

use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};
use surface_clusters::cluster::{ClusterFinder, Sign, ThresholdSpec};
use surface_clusters::distortion::{CorrectionMode, DistortionCorrector};
use surface_clusters::mesh::SurfaceMesh;
use surface_clusters::null_distribution::{NullDistribution, NullDistributionBuilder, NullPooling};
use surface_clusters::statistic::OneSampleT;
use utils::{grid, subject_table};

const SIDE: usize = 6;
const NODES: usize = SIDE * SIDE;

fn map_strategy() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-4.0f32..4.0, NODES)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_threshold_monotonicity(map in map_strategy(), low in 0.1f32..2.0, raise in 0.0f32..2.0) {
        let mesh = grid(SIDE, SIDE);
        let corrector = DistortionCorrector::identity();
        let finder = ClusterFinder::new(&mesh, &corrector);

        let loose = finder.find_clusters(&map, &ThresholdSpec::new(-1.0, low, 0.05), Sign::Positive, 0);
        let strict = finder.find_clusters(&map, &ThresholdSpec::new(-1.0, low + raise, 0.05), Sign::Positive, 0);

        let loose_nodes: usize = loose.iter().map(|c| c.node_count()).sum();
        let strict_nodes: usize = strict.iter().map(|c| c.node_count()).sum();
        prop_assert!(strict_nodes <= loose_nodes);

        // every strict cluster sits inside one loose cluster
        for cluster in &strict {
            let inside = loose.iter().any(|l| cluster.vertices.iter().all(|v| l.vertices.contains(v)));
            prop_assert!(inside);
        }
    }

    #[test]
    fn prop_neutral_distortion_keeps_area(map in map_strategy(), use_log2 in any::<bool>()) {
        let mesh = grid(SIDE, SIDE);
        let (value, mode) = if use_log2 {
            (0.0, CorrectionMode::Log2Exponent)
        } else {
            (1.0, CorrectionMode::Ratio)
        };
        let distortion = subject_table(&[vec![value; NODES]]);
        let corrector = DistortionCorrector::from_table(&distortion, 0, mode, NODES).unwrap();
        let finder = ClusterFinder::new(&mesh, &corrector);
        let threshold = ThresholdSpec::new(-1.5, 1.5, 0.05);

        for sign in [Sign::Positive, Sign::Negative] {
            for cluster in finder.find_clusters(&map, &threshold, sign, 0) {
                prop_assert!(cluster.corrected_area >= 0.0);
                prop_assert!((cluster.corrected_area - cluster.raw_area).abs() <= 1e-5 * cluster.raw_area.max(1.0));
                let summed: f32 = cluster.vertices.iter().map(|&v| mesh.area_of(v)).sum();
                prop_assert!((cluster.raw_area - summed).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn prop_p_values_bounded_and_monotone(
        samples in prop::collection::vec(0.0f32..20.0, 1..200),
        mut areas in prop::collection::vec(0.0f32..25.0, 2..20),
    ) {
        let null = NullDistribution {
            max_positive_area: samples.clone(),
            max_negative_area: samples,
            ..Default::default()
        };
        areas.sort_by(f32::total_cmp);
        let p: Vec<f32> = areas
            .iter()
            .map(|&a| null.p_value(a, Sign::Positive, NullPooling::PerSign))
            .collect();

        prop_assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
        prop_assert!(p.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn prop_clusters_are_connected(map in map_strategy()) {
        let mesh = grid(SIDE, SIDE);
        let corrector = DistortionCorrector::identity();
        let finder = ClusterFinder::new(&mesh, &corrector);
        let threshold = ThresholdSpec::new(-1.0, 1.0, 0.05);

        for sign in [Sign::Positive, Sign::Negative] {
            let clusters = finder.find_clusters(&map, &threshold, sign, 0);
            let mut claimed = HashSet::new();
            for cluster in &clusters {
                let members: HashSet<usize> = cluster.vertices.iter().copied().collect();
                prop_assert!(members.iter().all(|&v| threshold.passes(map[v], sign)));
                prop_assert!(members.iter().all(|&v| claimed.insert(v)));

                let mut seen = HashSet::from([cluster.vertices[0]]);
                let mut queue = VecDeque::from([cluster.vertices[0]]);
                while let Some(v) = queue.pop_front() {
                    for &n in mesh.neighbors_of(v) {
                        if members.contains(&n) && seen.insert(n) {
                            queue.push_back(n);
                        }
                    }
                }
                prop_assert_eq!(seen.len(), members.len());
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_null_independent_of_threads(seed in any::<u64>(), threads in 2usize..6) {
        let mesh = grid(4, 4);
        let columns: Vec<Vec<f32>> = (0..5)
            .map(|s| (0..16).map(|v| ((s * 5 + v) as f32).cos() + 0.3).collect())
            .collect();
        let table = subject_table(&columns);
        let computer = OneSampleT::new(&table, 0.0).unwrap();
        let corrector = DistortionCorrector::identity();
        let threshold = ThresholdSpec::new(-1.0, 1.0, 0.05);

        let build = |threads: usize| {
            NullDistributionBuilder::new(&computer, &mesh, &corrector, threshold)
                .with_seed(seed)
                .build(24, threads)
                .unwrap()
        };
        prop_assert_eq!(build(1), build(threads));
    }
}
