//! Per-vertex scalar tables, label tables, and report sinks
//!
//! The core reads subject data through [`NodeScalarTable`] and writes derived
//! columns through [`NodeScalarTableMut`]. [`ScalarTable`] implements both and
//! is what the engine hands back; callers with their own storage only need
//! the read trait.

use crate::error::{ClusterStatsError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Label assigned to vertices outside every cluster
pub const UNASSIGNED_LABEL: &str = "unassigned";

/// Read access to a table of named per-vertex columns
pub trait NodeScalarTable: Send + Sync {
    fn node_count(&self) -> usize;

    fn column_count(&self) -> usize;

    fn value_at(&self, node: usize, column: usize) -> f32;

    fn column_name(&self, column: usize) -> &str;

    /// Copy of one column, one value per vertex
    fn column_values(&self, column: usize) -> Vec<f32> {
        (0..self.node_count())
            .map(|node| self.value_at(node, column))
            .collect()
    }
}

/// Write access used for engine-owned output tables
pub trait NodeScalarTableMut {
    /// Append a zero-filled column and return its index
    fn add_column(&mut self, name: &str) -> usize;

    fn set_value_at(&mut self, node: usize, column: usize, value: f32);
}

/// One named column of a [`ScalarTable`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarColumn {
    pub name: String,
    pub values: Vec<f32>,
}

/// Dense in-memory table of per-vertex columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarTable {
    node_count: usize,
    columns: Vec<ScalarColumn>,
}

impl ScalarTable {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            columns: Vec::new(),
        }
    }

    /// Append a fully populated column
    ///
    /// # Errors
    ///
    /// [`ClusterStatsError::Configuration`] when `values` does not hold exactly
    /// one value per vertex.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f32>) -> Result<usize> {
        let name = name.into();
        if values.len() != self.node_count {
            return Err(ClusterStatsError::Configuration(format!(
                "column '{}' has {} values, table has {} nodes",
                name,
                values.len(),
                self.node_count
            )));
        }
        self.columns.push(ScalarColumn { name, values });
        Ok(self.columns.len() - 1)
    }

    pub fn column(&self, column: usize) -> &[f32] {
        &self.columns[column].values
    }

    pub fn columns(&self) -> &[ScalarColumn] {
        &self.columns
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Check that every column matches the declared node count
    ///
    /// Deserialized tables bypass [`ScalarTable::push_column`], so loaders call
    /// this before handing a table to the core.
    pub fn check_shape(&self) -> Result<()> {
        for column in &self.columns {
            if column.values.len() != self.node_count {
                return Err(ClusterStatsError::Parse(format!(
                    "column '{}' has {} values, table declares {} nodes",
                    column.name,
                    column.values.len(),
                    self.node_count
                )));
            }
        }
        Ok(())
    }
}

impl NodeScalarTable for ScalarTable {
    fn node_count(&self) -> usize {
        self.node_count
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn value_at(&self, node: usize, column: usize) -> f32 {
        self.columns[column].values[node]
    }

    fn column_name(&self, column: usize) -> &str {
        &self.columns[column].name
    }

    fn column_values(&self, column: usize) -> Vec<f32> {
        self.columns[column].values.clone()
    }
}

impl NodeScalarTableMut for ScalarTable {
    fn add_column(&mut self, name: &str) -> usize {
        self.columns.push(ScalarColumn {
            name: name.to_string(),
            values: vec![0.0; self.node_count],
        });
        self.columns.len() - 1
    }

    fn set_value_at(&mut self, node: usize, column: usize, value: f32) {
        self.columns[column].values[node] = value;
    }
}

/// One label per vertex, index 0 is always [`UNASSIGNED_LABEL`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelTable {
    names: Vec<String>,
    assignments: Vec<usize>,
}

impl LabelTable {
    pub fn new(node_count: usize) -> Self {
        Self {
            names: vec![UNASSIGNED_LABEL.to_string()],
            assignments: vec![0; node_count],
        }
    }

    /// Register a label name, reusing the index of an existing one
    pub fn add_label(&mut self, name: &str) -> usize {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            return idx;
        }
        self.names.push(name.to_string());
        self.names.len() - 1
    }

    pub fn assign(&mut self, node: usize, label: usize) {
        self.assignments[node] = label;
    }

    pub fn label_index(&self, node: usize) -> usize {
        self.assignments[node]
    }

    pub fn label_of(&self, node: usize) -> &str {
        &self.names[self.assignments[node]]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn node_count(&self) -> usize {
        self.assignments.len()
    }
}

/// Append-only destination for report text
pub trait ReportSink {
    fn append_line(&mut self, line: &str) -> std::io::Result<()>;

    /// Push buffered lines to their destination
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ReportSink for Vec<String> {
    fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

/// Report sink over any [`Write`] implementation
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for WriterSink<W> {
    fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.writer, "{}", line)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
