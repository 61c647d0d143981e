//! Surface mesh adjacency and per-vertex area weights
//!
//! The clustering core only talks to [`SurfaceMesh`]. [`TriangleMesh`] is the
//! concrete collaborator used by the binary and the tests: it derives vertex
//! neighbors from triangle topology and assigns each vertex one third of the
//! area of every incident triangle.

use crate::error::{ClusterStatsError, Result};
use std::collections::VecDeque;

/// Read-only mesh queries consumed by clustering and smoothing
///
/// Implementations are shared across permutation worker threads.
pub trait SurfaceMesh: Send + Sync {
    /// Number of vertices N; valid indices are `0..N`
    fn node_count(&self) -> usize;

    /// Whether `node` has at least one neighbor
    fn has_neighbors(&self, node: usize) -> bool {
        !self.neighbors_of(node).is_empty()
    }

    /// Neighbors of `node`, ascending and free of duplicates
    fn neighbors_of(&self, node: usize) -> &[usize];

    /// Area weight of `node`
    fn area_of(&self, node: usize) -> f32;

    /// 3-D position of `node`
    fn position_of(&self, node: usize) -> [f32; 3];

    /// Number of connected pieces formed by vertices that have neighbors
    fn piece_count(&self) -> usize {
        let node_count = self.node_count();
        let mut visited = vec![false; node_count];
        let mut pieces = 0;
        let mut queue = VecDeque::new();

        for start in 0..node_count {
            if visited[start] || !self.has_neighbors(start) {
                continue;
            }
            pieces += 1;
            visited[start] = true;
            queue.push_back(start);
            while let Some(v) = queue.pop_front() {
                for &n in self.neighbors_of(v) {
                    if !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                }
            }
        }
        pieces
    }

    /// Fail unless the surface forms one connected piece
    fn require_single_piece(&self) -> Result<()> {
        match self.piece_count() {
            1 => Ok(()),
            n => Err(ClusterStatsError::Geometry(format!(
                "surface has {} disconnected pieces, a single connected piece is required",
                n
            ))),
        }
    }
}

/// Triangulated surface with derived adjacency and vertex areas
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    positions: Vec<[f32; 3]>,
    triangles: Vec<[usize; 3]>,
    neighbors: Vec<Vec<usize>>,
    areas: Vec<f32>,
}

impl TriangleMesh {
    /// Build a mesh from vertex positions and triangles
    ///
    /// # Errors
    ///
    /// Returns [`ClusterStatsError::Geometry`] when there are no vertices, no
    /// triangles, a triangle references a missing vertex, or a triangle
    /// repeats a vertex.
    ///
    /// # Example
    /// ```
    /// use surface_clusters::mesh::{SurfaceMesh, TriangleMesh};
    ///
    /// let mesh = TriangleMesh::new(
    ///     vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    ///     vec![[0, 1, 2]],
    /// )
    /// .unwrap();
    /// assert_eq!(mesh.neighbors_of(0), &[1, 2]);
    /// assert!((mesh.area_of(0) - 0.5 / 3.0).abs() < 1e-6);
    /// ```
    pub fn new(positions: Vec<[f32; 3]>, triangles: Vec<[usize; 3]>) -> Result<Self> {
        if positions.is_empty() {
            return Err(ClusterStatsError::Geometry(
                "surface has zero nodes".to_string(),
            ));
        }
        if triangles.is_empty() {
            return Err(ClusterStatsError::Geometry(
                "topology is missing (no triangles)".to_string(),
            ));
        }

        let node_count = positions.len();
        let mut neighbors = vec![Vec::new(); node_count];
        let mut areas = vec![0.0f32; node_count];

        for (t, tri) in triangles.iter().enumerate() {
            if let Some(&bad) = tri.iter().find(|&&v| v >= node_count) {
                return Err(ClusterStatsError::Geometry(format!(
                    "triangle {} references node {} but surface has {} nodes",
                    t, bad, node_count
                )));
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
                return Err(ClusterStatsError::Geometry(format!(
                    "triangle {} repeats a vertex: {:?}",
                    t, tri
                )));
            }

            let third = triangle_area(&positions[tri[0]], &positions[tri[1]], &positions[tri[2]])
                / 3.0;
            for i in 0..3 {
                let v = tri[i];
                areas[v] += third;
                neighbors[v].push(tri[(i + 1) % 3]);
                neighbors[v].push(tri[(i + 2) % 3]);
            }
        }

        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }

        Ok(Self {
            positions,
            triangles,
            neighbors,
            areas,
        })
    }

    /// Replace the derived vertex areas with caller-supplied weights
    pub fn with_area_weights(mut self, weights: Vec<f32>) -> Result<Self> {
        if weights.len() != self.positions.len() {
            return Err(ClusterStatsError::Configuration(format!(
                "area weights cover {} nodes, surface has {}",
                weights.len(),
                self.positions.len()
            )));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(ClusterStatsError::Configuration(format!(
                "area weights must be finite and non-negative, got {}",
                w
            )));
        }
        self.areas = weights;
        Ok(self)
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }
}

impl SurfaceMesh for TriangleMesh {
    fn node_count(&self) -> usize {
        self.positions.len()
    }

    fn neighbors_of(&self, node: usize) -> &[usize] {
        &self.neighbors[node]
    }

    fn area_of(&self, node: usize) -> f32 {
        self.areas[node]
    }

    fn position_of(&self, node: usize) -> [f32; 3] {
        self.positions[node]
    }
}

fn triangle_area(a: &[f32; 3], b: &[f32; 3], c: &[f32; 3]) -> f32 {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let cross = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    0.5 * (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt()
}

/// Euclidean distance between two positions
pub fn distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}
