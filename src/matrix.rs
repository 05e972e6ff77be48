//! Final-state matrices
//!
//! One matrix per implementation: `rows = trajectories`, `columns = state
//! dimensions`, stored row-major. Artifacts are headerless numeric tables,
//! comma or whitespace separated, written in whatever precision the solver
//! used. Values are always read into `f64`.

use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Dense row-major table of final ODE states.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl StateMatrix {
    /// Build a matrix from row-major data.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::InvalidInput(format!(
                "{rows}x{cols} matrix needs {} values, got {}",
                rows.saturating_mul(cols),
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix from a list of rows.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the rows are ragged.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::InvalidInput(format!(
                    "row {i} has {} values, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(rows.len(), cols, data)
    }

    /// Load a headerless numeric table.
    ///
    /// A file with a single line is read as one trajectory. Blank lines are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `MissingArtifact` if the file does not exist, `Parse` on a
    /// non-numeric field or a row whose width differs from the first row.
    pub fn load<P: AsRef<Path>>(path: P, implementation: &str) -> Result<Self> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingArtifact {
                    implementation: implementation.to_string(),
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&text).map_err(|(line, reason)| Error::Parse {
            path: path.to_path_buf(),
            line,
            reason,
        })
    }

    fn parse(text: &str) -> std::result::Result<Self, (usize, String)> {
        let mut cols = None;
        let mut rows = 0;
        let mut data = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let before = data.len();
            for field in line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|f| !f.is_empty())
            {
                let value = field
                    .parse::<f64>()
                    .map_err(|e| (idx + 1, format!("bad value {field:?}: {e}")))?;
                data.push(value);
            }
            let width = data.len() - before;
            match cols {
                None => cols = Some(width),
                Some(expected) if expected != width => {
                    return Err((
                        idx + 1,
                        format!("row has {width} columns, expected {expected}"),
                    ));
                }
                Some(_) => {}
            }
            rows += 1;
        }

        Ok(Self {
            rows,
            cols: cols.unwrap_or(0),
            data,
        })
    }

    /// Number of trajectories.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// State dimension.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Row-major values.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Value at `(row, col)`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col).copied()
        } else {
            None
        }
    }
}
