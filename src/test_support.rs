// Shared fixtures for unit tests

use crate::mesh::TriangleMesh;
use crate::table::ScalarTable;

/// Four vertices, every vertex adjacent to the other three
pub fn tetrahedron() -> TriangleMesh {
    TriangleMesh::new(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ],
        vec![[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]],
    )
    .unwrap()
}

/// Planar grid of `width` x `height` vertices with unit spacing
///
/// Vertex `(x, y)` has index `y * width + x`.
pub fn grid(width: usize, height: usize) -> TriangleMesh {
    let mut positions = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            positions.push([x as f32, y as f32, 0.0]);
        }
    }
    let mut triangles = Vec::new();
    for y in 0..height - 1 {
        for x in 0..width - 1 {
            let a = y * width + x;
            let b = a + 1;
            let c = a + width;
            let d = c + 1;
            triangles.push([a, b, c]);
            triangles.push([b, d, c]);
        }
    }
    TriangleMesh::new(positions, triangles).unwrap()
}

/// Table with one column per subject, built from per-subject value vectors
pub fn subjects(columns: &[Vec<f32>]) -> ScalarTable {
    let nodes = columns.first().map_or(0, Vec::len);
    let mut table = ScalarTable::new(nodes);
    for (i, values) in columns.iter().enumerate() {
        table
            .push_column(format!("subject_{}", i), values.clone())
            .unwrap();
    }
    table
}
