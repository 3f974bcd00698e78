//! Entry download job: one catalog fetch per chemical system.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

use super::entries_file::{entries_path, write_entries};
use crate::checkpoint::{Row, TableSchema};
use crate::client::CallError;
use crate::domain::{symbols, CatalogEntry, CatalogService};
use crate::driver::{BatchJob, ItemContext, WorkItem};
use crate::errors::ShardflowError;

/// Result columns after the key column, in table order.
pub const DOWNLOAD_COLUMNS: [&str; 3] = ["n_entries", "download_time", "entries_outpath"];

/// Schema of the download table.
#[must_use]
pub fn download_schema(key_column: &str, error_column: &str) -> TableSchema {
    TableSchema::new(key_column)
        .with_error_column(error_column)
        .with_columns(DOWNLOAD_COLUMNS)
        .with_columns([error_column])
}

/// Downloads each system's entries and saves them under `entries_dir`.
///
/// Rows record the entry count, the time spent including retries, and the
/// saved file. A system with no entries is recorded without a file, so it
/// is not fetched again and later jobs skip it.
pub struct DownloadJob<C> {
    catalog: C,
    entries_dir: PathBuf,
}

impl<C: CatalogService> DownloadJob<C> {
    /// Creates the job.
    #[must_use]
    pub fn new(catalog: C, entries_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            entries_dir: entries_dir.into(),
        }
    }

    /// The catalog being fetched from.
    #[must_use]
    pub fn catalog(&self) -> &C {
        &self.catalog
    }
}

impl<C> fmt::Debug for DownloadJob<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadJob")
            .field("entries_dir", &self.entries_dir)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C: CatalogService> BatchJob for DownloadJob<C> {
    type Payload = ();
    type Fetched = Vec<CatalogEntry>;
    type Derived = ();

    fn name(&self) -> &str {
        "download"
    }

    async fn fetch(&self, item: &WorkItem<()>) -> Result<Vec<CatalogEntry>, CallError> {
        self.catalog.fetch_entries(&symbols(&item.key)).await
    }

    async fn complete(
        &self,
        item: &WorkItem<()>,
        entries: Vec<CatalogEntry>,
        ctx: &ItemContext<()>,
    ) -> Result<Vec<Row>, ShardflowError> {
        let row = Row::new().with("n_entries", entries.len());
        if entries.is_empty() {
            info!(key = %item.key, "No entries found");
            return Ok(vec![row]);
        }

        let download_time = ctx.elapsed().as_secs_f64();
        let path = entries_path(&self.entries_dir, &item.key);
        write_entries(&path, &entries)?;
        info!(
            key = %item.key,
            n_entries = entries.len(),
            download_time,
            path = %path.display(),
            "Saved entries"
        );

        Ok(vec![row
            .with("download_time", download_time)
            .with("entries_outpath", path.display())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CallStats;
    use crate::testing::{entry, ScriptedCatalog};
    use std::time::Instant;

    #[test]
    fn test_schema_order() {
        let schema = download_schema("symbols", "error");
        assert_eq!(
            schema.columns,
            vec!["symbols", "n_entries", "download_time", "entries_outpath", "error"]
        );
    }

    #[tokio::test]
    async fn test_complete_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let job = DownloadJob::new(ScriptedCatalog::new(), dir.path());
        let item = WorkItem::key_only("Fe-Zn");
        let ctx = ItemContext::new(Instant::now(), CallStats::default());

        let rows = job
            .complete(&item, vec![entry("mp-1", &[("Fe", 1.0)])], &ctx)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("n_entries"), Some("1"));
        let path = rows[0].get("entries_outpath").unwrap();
        assert!(std::path::Path::new(path).exists());
        assert!(rows[0].get("download_time").is_some());
    }

    #[tokio::test]
    async fn test_complete_without_entries() {
        let dir = tempfile::tempdir().unwrap();
        let job = DownloadJob::new(ScriptedCatalog::new(), dir.path());
        let item = WorkItem::key_only("Yb");
        let ctx = ItemContext::new(Instant::now(), CallStats::default());

        let rows = job.complete(&item, Vec::new(), &ctx).await.unwrap();

        assert_eq!(rows[0].get("n_entries"), Some("0"));
        assert_eq!(rows[0].get("entries_outpath"), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
