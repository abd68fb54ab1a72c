//! Tabular I/O
//!
//! A CSV table addressed by column name and row position. Columns the
//! pipeline does not know about are carried through untouched.
//!
//! Results are persisted through a [`ResultSink`]; [`CsvSink`] rewrites the
//! whole file atomically (temporary file in the same directory, then rename).

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::{PcfError, Result};

/// Row-oriented table with named columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Read a CSV file with a header row
    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).map_err(|e| {
            PcfError::Table(format!("Cannot open {}: {}", path.display(), e))
        })?;
        let table = Self::from_reader(file)?;
        debug!(
            path = %path.display(),
            rows = table.len(),
            columns = table.headers.len(),
            "Loaded table"
        );
        Ok(table)
    }

    /// Parse CSV from any reader; short rows are padded, long rows keep
    /// their extra cells under generated column names
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let mut headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let row: Vec<String> = record?.iter().map(str::to_string).collect();
            while headers.len() < row.len() {
                headers.push(format!("column_{}", headers.len() + 1));
            }
            rows.push(row);
        }
        for row in &mut rows {
            row.resize(headers.len(), String::new());
        }

        Ok(Self { headers, rows })
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.headers)?;
        for row in &self.rows {
            csv_writer.write_record(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by exact name
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| {
            PcfError::Table(format!(
                "Column '{}' missing (found: {})",
                name,
                self.headers.join(", ")
            ))
        })
    }

    /// Index of `name`, appending an empty column if absent
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    pub fn set(&mut self, row: usize, column: usize, value: impl Into<String>) -> Result<()> {
        let width = self.headers.len();
        let height = self.rows.len();
        let cell = self
            .rows
            .get_mut(row)
            .and_then(|r| r.get_mut(column))
            .ok_or_else(|| {
                PcfError::Table(format!(
                    "Cell ({}, {}) out of range ({} rows x {} columns)",
                    row, column, height, width
                ))
            })?;
        *cell = value.into();
        Ok(())
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Destination that receives full-table rewrites after each batch
pub trait ResultSink: Send {
    fn save(&mut self, table: &Table) -> Result<()>;

    /// Human-readable destination for logs
    fn location(&self) -> String;
}

/// CSV file sink with atomic replace
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output.csv".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}

impl ResultSink for CsvSink {
    fn save(&mut self, table: &Table) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| PcfError::Sink(format!("{}: {}", parent.display(), e)))?;
        }

        let temp = self.temp_path();
        let write = || -> Result<()> {
            let mut file = fs::File::create(&temp)?;
            table.to_writer(&mut file)?;
            file.sync_all()?;
            Ok(())
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp);
            return Err(PcfError::Sink(format!("{}: {}", temp.display(), e)));
        }

        fs::rename(&temp, &self.path)
            .map_err(|e| PcfError::Sink(format!("{}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), rows = table.len(), "Saved table");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "sku,subject_name,notes\n1,Kettle,\"has, comma\"\n2,Toaster,\n";

    #[test]
    fn test_read_and_lookup() {
        let table = Table::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        let name = table.require_column("subject_name").unwrap();
        assert_eq!(table.get(1, name), Some("Toaster"));
        assert_eq!(table.get(0, 2), Some("has, comma"));
        assert!(table.require_column("missing").is_err());
    }

    #[test]
    fn test_ensure_column_and_set() {
        let mut table = Table::from_reader(SAMPLE.as_bytes()).unwrap();
        let value = table.ensure_column("extracted_value");
        assert_eq!(value, 3);
        assert_eq!(table.ensure_column("extracted_value"), 3);
        assert_eq!(table.get(0, value), Some(""));

        table.set(0, value, "12.5").unwrap();
        assert_eq!(table.get(0, value), Some("12.5"));
        let err = table.set(9, value, "x").unwrap_err();
        assert!(err.to_string().contains("(9, 3) out of range (2 rows x 4 columns)"));
    }

    #[test]
    fn test_ragged_rows() {
        let table = Table::from_reader("a,b\n1\n2,3,4\n".as_bytes()).unwrap();
        assert_eq!(table.headers(), &["a", "b", "column_3"]);
        assert_eq!(table.get(0, 1), Some(""));
        assert_eq!(table.get(1, 2), Some("4"));
    }

    #[test]
    fn test_csv_sink_preserves_unknown_columns() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("results.csv");

        let mut table = Table::from_reader(SAMPLE.as_bytes()).unwrap();
        let transcript = table.ensure_column("transcript");
        table.set(1, transcript, "--- [STEP 0: GUIDANCE] ---\nline two").unwrap();

        let mut sink = CsvSink::new(&path);
        sink.save(&table).unwrap();
        assert!(!sink.temp_path().exists());

        let reloaded = Table::read_csv(&path).unwrap();
        assert_eq!(reloaded, table);
        assert_eq!(reloaded.get(0, 2), Some("has, comma"));
    }

    #[test]
    fn test_missing_file() {
        let err = Table::read_csv(Path::new("/nonexistent/input.csv")).unwrap_err();
        assert!(matches!(err, PcfError::Table(_)));
    }
}
