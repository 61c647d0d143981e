// Surface cluster discovery
//
// A cluster is a maximal connected set of mesh vertices whose statistic value
// lies on one side of a threshold. Raw area sums the per-vertex area weights;
// corrected area applies the distortion factor of each member first.

mod definition;
mod finder;

pub use definition::{Cluster, ClusterSizeFilter, Sign, ThresholdSpec};
pub use finder::ClusterFinder;
