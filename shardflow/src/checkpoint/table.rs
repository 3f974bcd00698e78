//! CSV tables with optional gzip compression.
//!
//! Paths ending in `.gz` are read and written through `flate2`. Missing cells
//! are written as empty fields and read back as absent values.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::errors::CheckpointError;

/// One output row: ordered `(column, value)` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a cell and returns the row.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl fmt::Display) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a cell, replacing any previous value for the column.
    pub fn set(&mut self, column: impl Into<String>, value: impl fmt::Display) {
        let column = column.into();
        let value = value.to_string();
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    /// Returns the value of a column. Absent and empty cells are both `None`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Iterates over column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the row has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Column layout of a checkpoint table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Column holding the work key.
    pub key_column: String,
    /// Column holding the permanent failure reason; empty on success.
    pub error_column: String,
    /// Columns written even when no row uses them.
    pub columns: Vec<String>,
}

impl TableSchema {
    /// Creates a schema with the given key column and an `error` column.
    #[must_use]
    pub fn new(key_column: impl Into<String>) -> Self {
        let key_column = key_column.into();
        Self {
            columns: vec![key_column.clone()],
            key_column,
            error_column: "error".to_string(),
        }
    }

    /// Sets the error column.
    #[must_use]
    pub fn with_error_column(mut self, column: impl Into<String>) -> Self {
        self.error_column = column.into();
        self
    }

    /// Declares additional columns, in order, after the key column.
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self
    }
}

/// An in-memory table: header plus rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Column names in file order.
    pub header: Vec<String>,
    /// Data rows.
    pub rows: Vec<Row>,
}

impl Table {
    /// Creates an empty table with a header.
    #[must_use]
    pub fn with_header(header: Vec<String>) -> Self {
        Self {
            header,
            rows: Vec::new(),
        }
    }

    /// Reads a table. Returns `None` if the file does not exist.
    ///
    /// A zero-byte file and a header-only file both read as empty tables.
    pub fn read(path: &Path) -> Result<Option<Self>, CheckpointError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let len = file
            .metadata()
            .map_err(|source| CheckpointError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if len == 0 {
            return Ok(Some(Self::default()));
        }

        let reader: Box<dyn Read> = if is_gzip(path) {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let malformed = |source| CheckpointError::Malformed {
            path: path.to_path_buf(),
            source,
        };

        let header: Vec<String> = csv_reader
            .headers()
            .map_err(malformed)?
            .iter()
            .map(String::from)
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(malformed)?;
            let mut row = Row::new();
            for (column, value) in header.iter().zip(record.iter()) {
                row.set(column.as_str(), value);
            }
            rows.push(row);
        }

        // A lone empty header line is a table with no columns.
        let header = if header.iter().all(String::is_empty) {
            Vec::new()
        } else {
            header
        };

        Ok(Some(Self { header, rows }))
    }

    /// Writes the table atomically: a sibling temporary file is written,
    /// synced, then renamed over `path`.
    pub fn write_atomic(&self, path: &Path) -> Result<(), CheckpointError> {
        let write_err = |source| CheckpointError::Write {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        {
            let file = tmp.as_file_mut();
            if is_gzip(path) {
                let encoder = self
                    .write_csv(GzEncoder::new(file, Compression::default()))
                    .map_err(write_err)?;
                encoder.finish().map_err(write_err)?;
            } else {
                let inner = self.write_csv(file).map_err(write_err)?;
                inner.flush().map_err(write_err)?;
            }
        }
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    fn write_csv<W: Write>(&self, writer: W) -> io::Result<W> {
        let mut csv_writer = csv::WriterBuilder::new().flexible(false).from_writer(writer);
        if !self.header.is_empty() {
            csv_writer.write_record(&self.header).map_err(io::Error::from)?;
        }
        for row in &self.rows {
            let record = self
                .header
                .iter()
                .map(|column| row.get(column).unwrap_or(""));
            csv_writer.write_record(record).map_err(io::Error::from)?;
        }
        csv_writer.into_inner().map_err(|e| e.into_error())
    }

    /// Computes the header for `prior` rows followed by `rows`: prior columns
    /// first, then columns not seen before in order of first appearance.
    #[must_use]
    pub fn merged_header(prior: &[String], schema: &TableSchema, rows: &[Row]) -> Vec<String> {
        let mut header: Vec<String> = if prior.is_empty() {
            schema.columns.clone()
        } else {
            prior.to_vec()
        };
        if !header.contains(&schema.key_column) {
            header.insert(0, schema.key_column.clone());
        }
        for row in rows {
            for column in row.columns() {
                if !header.iter().any(|h| h == column) {
                    header.push(column.to_string());
                }
            }
        }
        header
    }

    /// Returns the key values of all rows.
    pub fn keys<'a>(&'a self, key_column: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.rows.iter().filter_map(move |row| row.get(key_column))
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}
