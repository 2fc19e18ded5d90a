//! The per-run metrics table: one CSV row per window, one column per metric.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::analyzers::types::{KeyColumn, MetricsRow};
use crate::error::Result;

/// Where a run's table lives under `data_dir`.
pub fn table_path(data_dir: &Path, denom: &str, sample_size: Option<usize>) -> PathBuf {
    match sample_size {
        Some(sam) => data_dir
            .join("sample_based_statistics")
            .join(format!("statistics_{denom}_{sam}.csv")),
        None => data_dir
            .join("statistics")
            .join(format!("statistics_{denom}.csv")),
    }
}

/// Cells are kept as text; a missing or empty cell means "not computed".
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsTable {
    path: PathBuf,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MetricsTable {
    /// Loads the table at `path`, or starts an empty one with a
    /// `middle_date` column when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "Starting a new metrics table");
            return Ok(Self {
                path,
                columns: vec![KeyColumn::MiddleDate.as_str().to_string()],
                rows: Vec::new(),
            });
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let columns = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        info!(path = %path.display(), rows = rows.len(), "Metrics table loaded");
        Ok(Self { path, columns, rows })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&mut self, name: &str) -> usize {
        match self.columns.iter().position(|c| c == name) {
            Some(i) => i,
            None => {
                self.columns.push(name.to_string());
                self.columns.len() - 1
            }
        }
    }

    fn find_row(&self, key_column: KeyColumn, key: &str) -> Option<usize> {
        let col = self.columns.iter().position(|c| c == key_column.as_str())?;
        self.rows
            .iter()
            .position(|r| r.get(col).is_some_and(|cell| cell == key))
    }

    /// Writes `row` into the row whose `key_column` equals `row.key`,
    /// appending a row when there is none. Existing cells of other columns
    /// are kept.
    pub fn upsert(&mut self, key_column: KeyColumn, row: &MetricsRow) {
        let key_col = self.column_index(key_column.as_str());
        let row_idx = match self.find_row(key_column, &row.key) {
            Some(i) => i,
            None => {
                self.rows.push(Vec::new());
                self.rows.len() - 1
            }
        };

        let mut cells = vec![(key_col, row.key.clone())];
        for (name, value) in &row.values {
            cells.push((self.column_index(name), value.to_cell()));
        }

        let target = &mut self.rows[row_idx];
        for (col, cell) in cells {
            if target.len() <= col {
                target.resize(col + 1, String::new());
            }
            target[col] = cell;
        }
    }

    pub fn cell(&self, key_column: KeyColumn, key: &str, column: &str) -> Option<&str> {
        let row = self.find_row(key_column, key)?;
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows[row].get(col).map(String::as_str)
    }

    /// Numeric cell value; empty cells read as NaN.
    pub fn value(&self, key_column: KeyColumn, key: &str, column: &str) -> Option<f64> {
        let cell = self.cell(key_column, key, column)?;
        if cell.is_empty() {
            return Some(f64::NAN);
        }
        cell.parse().ok()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            let padded = (0..self.columns.len()).map(|i| row.get(i).map(String::as_str).unwrap_or(""));
            writer.write_record(padded)?;
        }
        writer.flush()?;
        debug!(path = %self.path.display(), rows = self.rows.len(), "Metrics table saved");
        Ok(())
    }
}
