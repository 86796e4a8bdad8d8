//! Notebook cell model and JSON persistence.
//!
//! The persisted layout is a JSON array of cells with camelCase keys,
//! as written by notebook frontends. The execution core mutates only a
//! cell's `output` and `is_executing`; identity and ordering belong to
//! the cell store.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::output::CellOutput;

/// Kind of notebook cell: executable source or narrative text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Text,
}

/// A single unit of notebook content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub id: String,

    #[serde(rename = "type")]
    pub cell_type: CellType,

    pub content: String,

    /// One record or an ordered sequence, absent until first execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<CellOutput>,

    #[serde(default)]
    pub is_executing: bool,
}

impl Cell {
    pub fn code(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cell_type: CellType::Code,
            content: content.into(),
            output: None,
            is_executing: false,
        }
    }

    pub fn text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cell_type: CellType::Text,
            content: content.into(),
            output: None,
            is_executing: false,
        }
    }
}

/// An ordered list of cells, loaded from and saved to a JSON file.
#[derive(Debug, Clone, Default)]
pub struct Notebook {
    pub cells: Vec<Cell>,
}

impl Notebook {
    pub fn from_cells(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Load a notebook from a JSON array of cells.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let cells = serde_json::from_str(&content)
            .map_err(|e| Error::Serialization(format!("Failed to parse notebook: {e}")))?;
        Ok(Self { cells })
    }

    /// Save the notebook back as a JSON array of cells.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.cells)
            .map_err(|e| Error::Serialization(format!("Failed to serialize notebook: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Iterate over the executable cells.
    pub fn code_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells
            .iter()
            .filter(|cell| cell.cell_type == CellType::Code)
    }
}
