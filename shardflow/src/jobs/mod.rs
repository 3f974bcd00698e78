//! The two batch jobs and their run entry points.
//!
//! The download job fetches catalog entries per chemical system and stores
//! them under the entries directory. The decomposition job reads those files
//! back and evaluates every solid entry under its conditions. Both resume
//! from, and append to, their shard's tables in `output_dir`.

mod decomposition;
mod download;
mod entries_file;

pub use decomposition::{
    data_schema, decomposition_items, diagram_schema, BuiltDiagram, DecompositionJob,
    DATA_COLUMNS, DIAGRAM_COLUMNS,
};
pub use download::{download_schema, DownloadJob, DOWNLOAD_COLUMNS};
pub use entries_file::{entries_path, read_entries, write_entries};

use std::sync::Arc;
use tracing::info;

use crate::cancellation::CancellationToken;
use crate::checkpoint::{discover_tables, output_path, CheckpointStore};
use crate::client::RetryingClient;
use crate::config::RunConfig;
use crate::domain::{work_set_from_compositions, CatalogService, ConditionSources, DiagramEngine};
use crate::driver::{BatchDriver, RunSummary, WorkItem};
use crate::errors::ShardflowError;
use crate::partition::JobAssignment;

/// Downloads entries for every system derived from the compositions table.
///
/// Keys already present in any download table of `output_dir`, whatever
/// shard count wrote it, are skipped.
pub async fn run_download<C: CatalogService>(
    config: &RunConfig,
    assignment: JobAssignment,
    catalog: C,
    cancel: Arc<CancellationToken>,
) -> Result<RunSummary, ShardflowError> {
    let keys = work_set_from_compositions(&config.download.compositions)?;
    info!(systems = keys.len(), %assignment, "Derived download work set");

    let stem = &config.download.table_stem;
    let store = CheckpointStore::load(
        output_path(&config.output_dir, stem, &assignment),
        &discover_tables(&config.output_dir, stem)?,
        download_schema(&config.key_column, &config.error_column),
    )?;

    let job = DownloadJob::new(catalog, config.entries_dir());
    let client = RetryingClient::new(config.retry.clone(), cancel);
    BatchDriver::new(job, assignment, client)
        .run(keys.into_iter().map(WorkItem::key_only), &store)
        .await
}

/// Evaluates decomposition energies for every downloaded system.
///
/// Conditions are loaded before any table is touched, so a bad invocation
/// fails without side effects.
pub async fn run_decomposition<E: DiagramEngine>(
    config: &RunConfig,
    assignment: JobAssignment,
    conditions: &ConditionSources,
    engine: E,
    cancel: Arc<CancellationToken>,
) -> Result<RunSummary, ShardflowError> {
    let conditions = conditions.load()?;

    let downloads = discover_tables(&config.output_dir, &config.download.table_stem)?;
    let items = decomposition_items(&downloads, &config.key_column)?;
    info!(
        systems = items.len(),
        download_tables = downloads.len(),
        %assignment,
        "Read decomposition work set"
    );

    let settings = &config.decomposition;
    let store = CheckpointStore::load(
        output_path(&config.output_dir, &settings.data_stem, &assignment),
        &discover_tables(&config.output_dir, &settings.data_stem)?,
        data_schema(&config.key_column, &config.error_column),
    )?
    .with_events(
        output_path(&config.output_dir, &settings.diagram_stem, &assignment),
        diagram_schema(&config.key_column),
    )?;

    let job = DecompositionJob::new(engine, conditions, settings.integer_tolerance);
    let client = RetryingClient::new(config.retry.clone(), cancel);
    BatchDriver::new(job, assignment, client)
        .run(items, &store)
        .await
}
