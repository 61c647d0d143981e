//! JSON files for tables, meshes and coordinate sets
//!
//! Scalar table: `{"node_count": N, "columns": [{"name": "...", "values": [...]}]}`
//!
//! Mesh: `{"coordinates": [[x, y, z], ...], "triangles": [[a, b, c], ...]}`
//!
//! Coordinate set: `{"coordinates": [[x, y, z], ...]}`. A mesh file is also a
//! valid coordinate set.
//!
//! Label table: `{"names": [...], "assignments": [...]}`

use crate::mesh::TriangleMesh;
use crate::table::{LabelTable, ScalarTable};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// On-disk mesh layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshFile {
    pub coordinates: Vec<[f32; 3]>,
    pub triangles: Vec<[usize; 3]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CoordinateFile {
    coordinates: Vec<[f32; 3]>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_json_to(BufWriter::new(file), value).with_context(|| format!("Failed to write {}", path.display()))
}

fn write_json_to<W: Write, T: Serialize>(mut writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().context("Failed to flush output")
}

pub fn load_scalar_table(path: impl AsRef<Path>) -> Result<ScalarTable> {
    let path = path.as_ref();
    let table: ScalarTable = read_json(path)?;
    table
        .check_shape()
        .with_context(|| format!("Invalid scalar table {}", path.display()))?;
    Ok(table)
}

pub fn save_scalar_table(path: impl AsRef<Path>, table: &ScalarTable) -> Result<()> {
    write_json(path.as_ref(), table)
}

pub fn load_label_table(path: impl AsRef<Path>) -> Result<LabelTable> {
    read_json(path.as_ref())
}

pub fn save_label_table(path: impl AsRef<Path>, labels: &LabelTable) -> Result<()> {
    write_json(path.as_ref(), labels)
}

pub fn load_mesh(path: impl AsRef<Path>) -> Result<TriangleMesh> {
    let path = path.as_ref();
    let file: MeshFile = read_json(path)?;
    TriangleMesh::new(file.coordinates, file.triangles)
        .with_context(|| format!("Invalid mesh {}", path.display()))
}

pub fn save_mesh(path: impl AsRef<Path>, mesh: &TriangleMesh) -> Result<()> {
    let file = MeshFile {
        coordinates: mesh.positions().to_vec(),
        triangles: mesh.triangles().to_vec(),
    };
    write_json(path.as_ref(), &file)
}

/// One position per vertex
pub fn load_coordinates(path: impl AsRef<Path>) -> Result<Vec<[f32; 3]>> {
    let file: CoordinateFile = read_json(path.as_ref())?;
    Ok(file.coordinates)
}
