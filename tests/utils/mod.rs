// Shared fixtures for integration tests
//
// Meshes and subject tables small enough to reason about by hand.

#![allow(dead_code)]

use surface_clusters::mesh::TriangleMesh;
use surface_clusters::table::ScalarTable;

/// Four vertices, each adjacent to the other three
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

/// Planar `width` x `height` grid, vertex `(x, y)` at index `y * width + x`
pub fn grid(width: usize, height: usize) -> TriangleMesh {
    let positions = (0..height)
        .flat_map(|y| (0..width).map(move |x| [x as f32, y as f32, 0.0]))
        .collect();
    let mut triangles = Vec::new();
    for y in 0..height - 1 {
        for x in 0..width - 1 {
            let a = y * width + x;
            triangles.push([a, a + 1, a + width]);
            triangles.push([a + 1, a + width + 1, a + width]);
        }
    }
    TriangleMesh::new(positions, triangles).unwrap()
}

/// One column per subject
pub fn subject_table(columns: &[Vec<f32>]) -> ScalarTable {
    let nodes = columns.first().map_or(0, Vec::len);
    let mut table = ScalarTable::new(nodes);
    for (i, values) in columns.iter().enumerate() {
        table.push_column(format!("subject_{}", i), values.clone()).unwrap();
    }
    table
}

/// `subjects` columns with a bump of `height` on the listed vertices plus a
/// small per-subject, per-vertex wobble so variances are never zero
pub fn bump_group(nodes: usize, subjects: usize, bump: &[usize], height: f32, phase: f32) -> ScalarTable {
    let columns: Vec<Vec<f32>> = (0..subjects)
        .map(|s| {
            (0..nodes)
                .map(|v| {
                    let wobble = ((s * 7 + v * 3) as f32 + phase).sin() * 0.5;
                    if bump.contains(&v) {
                        height + wobble
                    } else {
                        wobble
                    }
                })
                .collect()
        })
        .collect();
    subject_table(&columns)
}
