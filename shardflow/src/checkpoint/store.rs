//! Durable run progress: prior rows, the done set, and buffered new rows.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::table::{Row, Table, TableSchema};
use crate::errors::CheckpointError;

/// What a flush wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Results table path.
    pub results_path: PathBuf,
    /// Rows carried over from the previous run.
    pub prior_rows: usize,
    /// Rows added by this run.
    pub new_rows: usize,
    /// Construction event path, if configured.
    pub events_path: Option<PathBuf>,
    /// Construction event rows added by this run.
    pub new_event_rows: usize,
}

impl FlushReport {
    /// Total result rows on disk after the flush.
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.prior_rows + self.new_rows
    }
}

/// One table this store rewrites on flush.
#[derive(Debug)]
struct OutputTable {
    path: PathBuf,
    schema: TableSchema,
    prior: Table,
}

impl OutputTable {
    fn load(path: PathBuf, schema: TableSchema) -> Result<Self, CheckpointError> {
        let prior = Table::read(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            schema,
            prior,
        })
    }

    fn write(&self, new_rows: &[Row]) -> Result<(), CheckpointError> {
        let header = Table::merged_header(&self.prior.header, &self.schema, new_rows);
        let mut rows = Vec::with_capacity(self.prior.len() + new_rows.len());
        rows.extend(self.prior.rows.iter().cloned());
        rows.extend(new_rows.iter().cloned());
        Table { header, rows }.write_atomic(&self.path)
    }
}

#[derive(Debug, Default)]
struct Buffer {
    results: Vec<Row>,
    events: Vec<Row>,
}

/// Checkpoint store for one shard's run.
///
/// The store is the single writer of its output tables. Rows are buffered in
/// memory and written only by [`CheckpointStore::flush`], which rewrites each
/// table as its prior contents followed by this run's rows.
#[derive(Debug)]
pub struct CheckpointStore {
    results: OutputTable,
    events: Option<OutputTable>,
    done: RwLock<HashSet<String>>,
    buffer: Mutex<Buffer>,
    flushed: Mutex<Option<FlushReport>>,
}

impl CheckpointStore {
    /// Loads prior progress.
    ///
    /// `output` is this run's results table; its rows are carried over on
    /// flush. The done set is the union of the key column of `output` and of
    /// every table in `sources`, so work finished under a different shard
    /// count is still recognized. Missing paths are treated as empty.
    pub fn load(
        output: impl Into<PathBuf>,
        sources: &[PathBuf],
        schema: TableSchema,
    ) -> Result<Self, CheckpointError> {
        let output = output.into();
        let results = OutputTable::load(output.clone(), schema)?;
        check_key_column(&results.prior, &results.path, &results.schema.key_column)?;

        let key_column = results.schema.key_column.clone();
        let mut done: HashSet<String> = results.prior.keys(&key_column).map(String::from).collect();

        for source in sources.iter().filter(|p| !same_path(p, &output)) {
            let Some(table) = Table::read(source)? else {
                debug!(path = %source.display(), "Checkpoint source missing, skipping");
                continue;
            };
            check_key_column(&table, source, &key_column)?;
            let before = done.len();
            done.extend(table.keys(&key_column).map(String::from));
            debug!(
                path = %source.display(),
                rows = table.len(),
                new_keys = done.len() - before,
                "Loaded checkpoint source"
            );
        }

        info!(
            output = %output.display(),
            prior_rows = results.prior.len(),
            done_keys = done.len(),
            sources = sources.len(),
            "Checkpoint loaded"
        );

        Ok(Self {
            results,
            events: None,
            done: RwLock::new(done),
            buffer: Mutex::new(Buffer::default()),
            flushed: Mutex::new(None),
        })
    }

    /// Adds a construction event table, loading its prior rows.
    pub fn with_events(
        mut self,
        path: impl Into<PathBuf>,
        schema: TableSchema,
    ) -> Result<Self, CheckpointError> {
        self.events = Some(OutputTable::load(path.into(), schema)?);
        Ok(self)
    }

    /// Returns true if `key` was completed by this or any earlier run.
    #[must_use]
    pub fn is_done(&self, key: &str) -> bool {
        self.done.read().contains(key)
    }

    /// Buffers result rows. Their keys join the done set.
    pub fn append(&self, rows: Vec<Row>) {
        self.append_with_events(rows, Vec::new());
    }

    /// Buffers result rows and construction event rows for one item together.
    pub fn append_with_events(&self, rows: Vec<Row>, events: Vec<Row>) {
        let key_column = &self.results.schema.key_column;
        if self.is_flushed() {
            warn!(rows = rows.len(), "Rows appended after flush will not be written");
        }
        let mut buffer = self.buffer.lock();
        {
            let mut done = self.done.write();
            done.extend(rows.iter().filter_map(|r| r.get(key_column)).map(String::from));
        }
        buffer.results.extend(rows);
        if self.events.is_some() {
            buffer.events.extend(events);
        } else if !events.is_empty() {
            debug!(events = events.len(), "No event table configured, dropping events");
        }
    }

    /// Writes prior rows followed by buffered rows, atomically, to each table.
    ///
    /// Runs once: after a successful flush further calls return the first
    /// report without touching disk. A failed flush may be retried.
    pub fn flush(&self) -> Result<FlushReport, CheckpointError> {
        let mut flushed = self.flushed.lock();
        if let Some(report) = flushed.as_ref() {
            return Ok(report.clone());
        }

        let buffer = self.buffer.lock();
        self.results.write(&buffer.results)?;
        if let Some(events) = &self.events {
            events.write(&buffer.events)?;
        }

        let report = FlushReport {
            results_path: self.results.path.clone(),
            prior_rows: self.results.prior.len(),
            new_rows: buffer.results.len(),
            events_path: self.events.as_ref().map(|e| e.path.clone()),
            new_event_rows: buffer.events.len(),
        };
        info!(
            path = %report.results_path.display(),
            prior_rows = report.prior_rows,
            new_rows = report.new_rows,
            new_event_rows = report.new_event_rows,
            "Checkpoint flushed"
        );
        *flushed = Some(report.clone());
        Ok(report)
    }

    /// Returns true once a flush has succeeded.
    #[must_use]
    pub fn is_flushed(&self) -> bool {
        self.flushed.lock().is_some()
    }

    /// Number of buffered result rows.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.buffer.lock().results.len()
    }

    /// Number of rows carried over from the previous run.
    #[must_use]
    pub fn prior_count(&self) -> usize {
        self.results.prior.len()
    }

    /// Number of keys known to be done.
    #[must_use]
    pub fn done_count(&self) -> usize {
        self.done.read().len()
    }

    /// The results table schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.results.schema
    }

    /// The results table path.
    #[must_use]
    pub fn results_path(&self) -> &Path {
        &self.results.path
    }
}

fn check_key_column(table: &Table, path: &Path, key_column: &str) -> Result<(), CheckpointError> {
    if table.is_empty() || table.header.iter().any(|h| h == key_column) {
        Ok(())
    } else {
        Err(CheckpointError::MissingKeyColumn {
            path: path.to_path_buf(),
            column: key_column.to_string(),
        })
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn schema() -> TableSchema {
        TableSchema::new("symbols").with_columns(["n_entries", "error"])
    }

    fn row(key: &str) -> Row {
        Row::new().with("symbols", key).with("n_entries", 1)
    }

    #[test]
    fn test_load_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::load(dir.path().join("out.csv.gz"), &[], schema()).unwrap();

        assert_eq!(store.prior_count(), 0);
        assert_eq!(store.done_count(), 0);
        assert!(!store.is_done("Fe"));
    }

    #[test]
    fn test_flush_with_no_rows_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv.gz");
        let store = CheckpointStore::load(&path, &[], schema()).unwrap();

        let report = store.flush().unwrap();
        assert_eq!(report.total_rows(), 0);

        let table = Table::read(&path).unwrap().unwrap();
        assert_eq!(table.header, vec!["symbols", "n_entries", "error"]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_append_marks_done_and_flush_keeps_prior_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv.gz");

        let first = CheckpointStore::load(&path, &[], schema()).unwrap();
        first.append(vec![row("Fe")]);
        assert!(first.is_done("Fe"));
        first.flush().unwrap();

        let second = CheckpointStore::load(&path, &[], schema()).unwrap();
        assert!(second.is_done("Fe"));
        second.append(vec![row("Zn")]);
        let report = second.flush().unwrap();
        assert_eq!(report.prior_rows, 1);
        assert_eq!(report.new_rows, 1);

        let table = Table::read(&path).unwrap().unwrap();
        let keys: Vec<_> = table.keys("symbols").collect();
        assert_eq!(keys, vec!["Fe", "Zn"]);
    }

    #[test]
    fn test_done_set_unions_sources() {
        let dir = tempfile::tempdir().unwrap();
        let shard0 = dir.path().join("out_0.csv.gz");
        let shard1 = dir.path().join("out_1.csv.gz");

        for (path, key) in [(&shard0, "Fe"), (&shard1, "Zn")] {
            let store = CheckpointStore::load(path, &[], schema()).unwrap();
            store.append(vec![row(key)]);
            store.flush().unwrap();
        }

        // Rerun with a single shard writing a new file.
        let output = dir.path().join("out.csv.gz");
        let store = CheckpointStore::load(
            &output,
            &[shard0.clone(), shard1.clone(), output.clone()],
            schema(),
        )
        .unwrap();

        assert!(store.is_done("Fe"));
        assert!(store.is_done("Zn"));
        assert_eq!(store.prior_count(), 0);
    }

    #[test]
    fn test_empty_source_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("out_3.csv.gz");
        std::fs::write(&empty, b"").unwrap();

        let store =
            CheckpointStore::load(dir.path().join("out.csv.gz"), &[empty], schema()).unwrap();
        assert_eq!(store.done_count(), 0);
    }

    #[test]
    fn test_source_without_key_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("other.csv");
        std::fs::write(&other, "material_id,ph\nmp-1,7\n").unwrap();

        let err = CheckpointStore::load(dir.path().join("out.csv"), &[other], schema())
            .unwrap_err();
        assert!(matches!(err, CheckpointError::MissingKeyColumn { .. }));
    }

    #[test]
    fn test_flush_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let store = CheckpointStore::load(&path, &[], schema()).unwrap();
        store.append(vec![row("Fe")]);

        let first = store.flush().unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = store.flush().unwrap();

        assert_eq!(first, second);
        assert!(!path.exists());
    }

    #[test]
    fn test_events_table() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("data.csv.gz");
        let events = dir.path().join("diagrams.csv.gz");

        let store = CheckpointStore::load(&results, &[], schema())
            .unwrap()
            .with_events(&events, TableSchema::new("symbols"))
            .unwrap();
        store.append_with_events(
            vec![row("Fe")],
            vec![Row::new().with("symbols", "Fe").with("diagram_time", 0.25)],
        );
        let report = store.flush().unwrap();
        assert_eq!(report.new_event_rows, 1);

        let table = Table::read(&events).unwrap().unwrap();
        assert_eq!(table.header, vec!["symbols", "diagram_time"]);
        assert_eq!(table.rows[0].get("diagram_time"), Some("0.25"));
    }
}
