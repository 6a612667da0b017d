//! In-memory view of the CSV report
//!
//! The header only ever grows to the right. Rows are never edited except to
//! pad newly added columns with [`NOT_AVAILABLE`].

use crate::error::{HealthError, Result};
use std::fs;
use std::io;
use std::path::Path;

/// Marker for a cell without a value
pub const NOT_AVAILABLE: &str = "N/A";

pub const TIMESTAMP: &str = "Timestamp";
pub const DEVICE: &str = "Device";
pub const SERIAL_NUMBER: &str = "Serial Number";
pub const MODEL_NUMBER: &str = "Model Number";
pub const FIRMWARE_VERSION: &str = "Firmware Version";

/// Leading columns present in every report
pub const IDENTITY_COLUMNS: [&str; 5] = [TIMESTAMP, DEVICE, SERIAL_NUMBER, MODEL_NUMBER, FIRMWARE_VERSION];

/// Header spellings written by older reports
const COLUMN_ALIASES: &[(&str, &str)] = &[("Firwmare Version", FIRMWARE_VERSION)];

fn canonical_column(name: &str) -> &str {
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Empty dataset with the given header
    pub fn with_header<S: Into<String>>(header: impl IntoIterator<Item = S>) -> Self {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, accepting legacy header spellings
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = canonical_column(name);
        self.header
            .iter()
            .position(|column| canonical_column(column) == wanted)
    }

    /// Index of `name`, appending it (and padding prior rows) if absent
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }

        self.header.push(name.to_string());
        for row in &mut self.rows {
            row.push(NOT_AVAILABLE.to_string());
        }
        self.header.len() - 1
    }

    /// Append one row from `(column, value)` cells; unknown columns are added
    /// in the order given, missing ones get the marker
    pub fn append_row(&mut self, cells: &[(&str, &str)]) {
        let indices: Vec<usize> = cells
            .iter()
            .map(|(column, _)| self.ensure_column(column))
            .collect();

        let mut row = vec![NOT_AVAILABLE.to_string(); self.header.len()];
        for (index, (_, value)) in indices.into_iter().zip(cells) {
            row[index] = value.to_string();
        }
        self.rows.push(row);
    }

    /// Read a dataset from disk. Missing or zero-length files yield `None`.
    /// Read failures are `DatasetIo`; only unparseable content is corrupt.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(HealthError::DatasetIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if bytes.is_empty() {
            return Ok(None);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes.as_slice());

        let mut records = reader.records();
        let header: Vec<String> = match records.next() {
            Some(record) => record
                .map_err(|e| HealthError::corrupt(path, e))?
                .iter()
                .map(str::to_string)
                .collect(),
            None => return Ok(None),
        };
        Self::validate_header(path, &header)?;

        let mut rows = Vec::new();
        for (line, record) in records.enumerate() {
            let record = record.map_err(|e| HealthError::corrupt(path, e))?;
            if record.len() != header.len() {
                return Err(HealthError::corrupt(
                    path,
                    format!(
                        "row {} has {} fields, header has {}",
                        line + 1,
                        record.len(),
                        header.len()
                    ),
                ));
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Some(Self { header, rows }))
    }

    fn validate_header(path: &Path, header: &[String]) -> Result<()> {
        if header.iter().all(|column| column.trim().is_empty()) {
            return Err(HealthError::corrupt(path, "header row is empty"));
        }

        for (i, column) in header.iter().enumerate() {
            let canonical = canonical_column(column);
            if header[..i].iter().any(|prev| canonical_column(prev) == canonical) {
                return Err(HealthError::corrupt(path, format!("duplicate column {:?}", column)));
            }
        }
        Ok(())
    }

    /// Serialize header then rows
    pub fn write_to<W: io::Write>(&self, out: W) -> io::Result<()> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}
