//! Decomposition energy job: evaluates each solid entry of a downloaded
//! system under its conditions.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

use super::entries_file::read_entries;
use crate::cache::{BuildEvent, GroupKey};
use crate::checkpoint::{Row, Table, TableSchema};
use crate::client::CallError;
use crate::domain::{group_key_for, symbols, CatalogEntry, ConditionSet, DiagramEngine};
use crate::driver::{BatchJob, ItemContext, WorkItem};
use crate::errors::{EngineError, ShardflowError};
use crate::observability::SpanTimer;

/// Data table columns after the key column.
pub const DATA_COLUMNS: [&str; 6] = [
    "name",
    "entry_id",
    "ph",
    "voltage",
    "decomposition_energy",
    "decomposition_energy_lookup_time",
];

/// Diagram table columns after the key column.
pub const DIAGRAM_COLUMNS: [&str; 5] = ["name", "entry_id", "group", "diagram_time", "built_at"];

/// Schema of the per-entry data table.
#[must_use]
pub fn data_schema(key_column: &str, error_column: &str) -> TableSchema {
    TableSchema::new(key_column)
        .with_error_column(error_column)
        .with_columns(DATA_COLUMNS)
}

/// Schema of the diagram construction table.
#[must_use]
pub fn diagram_schema(key_column: &str) -> TableSchema {
    TableSchema::new(key_column).with_columns(DIAGRAM_COLUMNS)
}

/// Work set of the decomposition job, read from download tables.
///
/// Each system appears once, sorted, with the entry file recorded for it.
/// Systems downloaded without a file keep a `None` payload and are skipped
/// by the job.
pub fn decomposition_items(
    tables: &[PathBuf],
    key_column: &str,
) -> Result<Vec<WorkItem<Option<PathBuf>>>, ShardflowError> {
    let mut files: BTreeMap<String, Option<PathBuf>> = BTreeMap::new();
    for path in tables {
        let Some(table) = Table::read(path)? else {
            continue;
        };
        for row in &table.rows {
            let Some(key) = row.get(key_column) else {
                continue;
            };
            let file = files.entry(key.to_string()).or_default();
            if file.is_none() {
                *file = row.get("entries_outpath").map(PathBuf::from);
            }
        }
    }
    let items: Vec<_> = files
        .into_iter()
        .map(|(key, file)| WorkItem::new(key, file))
        .collect();
    debug!(tables = tables.len(), items = items.len(), "Read decomposition work set");
    Ok(items)
}

/// A diagram together with the entry whose group first required it.
#[derive(Debug)]
pub struct BuiltDiagram<D> {
    /// The diagram.
    pub diagram: D,
    /// Name of the entry that triggered the build.
    pub name: String,
    /// Id of the entry that triggered the build.
    pub entry_id: String,
}

/// Computes decomposition energies for every solid entry of a system.
///
/// Diagrams depend on the system's full entry list plus one entry's
/// normalized composition, so they are built once per integral composition
/// and reused for every entry sharing it.
pub struct DecompositionJob<E> {
    engine: E,
    conditions: ConditionSet,
    tolerance: f64,
}

impl<E: DiagramEngine> DecompositionJob<E> {
    /// Creates the job.
    #[must_use]
    pub fn new(engine: E, conditions: ConditionSet, tolerance: f64) -> Self {
        Self {
            engine,
            conditions,
            tolerance,
        }
    }

    /// The diagram engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn build(
        &self,
        entries: &[CatalogEntry],
        group: &GroupKey,
        trigger: &CatalogEntry,
    ) -> Result<BuiltDiagram<E::Diagram>, EngineError> {
        let diagram = self.engine.build(entries, &group.fractions())?;
        Ok(BuiltDiagram {
            diagram,
            name: trigger.name.clone(),
            entry_id: trigger.entry_id.clone(),
        })
    }
}

impl<E> fmt::Debug for DecompositionJob<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecompositionJob")
            .field("global_conditions", &self.conditions.global.len())
            .field("materials", &self.conditions.by_material.len())
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: DiagramEngine> BatchJob for DecompositionJob<E> {
    type Payload = Option<PathBuf>;
    type Fetched = Vec<CatalogEntry>;
    type Derived = BuiltDiagram<E::Diagram>;

    fn name(&self) -> &str {
        "decomposition"
    }

    fn has_input(&self, item: &WorkItem<Option<PathBuf>>) -> bool {
        item.payload.is_some()
    }

    async fn fetch(&self, item: &WorkItem<Option<PathBuf>>) -> Result<Vec<CatalogEntry>, CallError> {
        let path = item
            .payload
            .as_deref()
            .ok_or_else(|| CallError::other(format!("no entry file for {}", item.key)))?;
        // Local read failures are not network conditions and are never retried.
        read_entries(path)
            .map_err(|e| CallError::other(format!("unreadable entry file '{}': {e}", path.display())))
    }

    async fn complete(
        &self,
        item: &WorkItem<Option<PathBuf>>,
        entries: Vec<CatalogEntry>,
        ctx: &ItemContext<Self::Derived>,
    ) -> Result<Vec<Row>, ShardflowError> {
        let system = symbols(&item.key);
        let mut rows = Vec::new();

        for entry in entries.iter().filter(|e| e.is_solid()) {
            let material_id = entry.material_id().ok_or_else(|| {
                ShardflowError::fatal(
                    &item.key,
                    format!("invalid entry_id format: {}", entry.entry_id),
                )
            })?;

            let conditions = self.conditions.for_material(material_id);
            if conditions.is_empty() {
                continue;
            }

            let group = group_key_for(entry, &system, self.tolerance).map_err(|e| {
                ShardflowError::fatal(&item.key, format!("entry {}: {e}", entry.entry_id))
            })?;
            if group.is_empty() {
                debug!(key = %item.key, entry_id = %entry.entry_id, "No system elements, skipping entry");
                continue;
            }

            let (built, _) = ctx
                .cache()
                .get_or_build(&group, || async { self.build(&entries, &group, entry) })
                .await?;

            for condition in conditions {
                let timer = SpanTimer::start("decomposition_energy");
                let energy =
                    self.engine
                        .evaluate(&built.diagram, entry, condition.ph, condition.voltage)?;
                let lookup_time = timer.finish().as_secs_f64();

                rows.push(
                    Row::new()
                        .with("name", &entry.name)
                        .with("entry_id", &entry.entry_id)
                        .with("ph", condition.ph)
                        .with("voltage", condition.voltage)
                        .with("decomposition_energy", energy)
                        .with("decomposition_energy_lookup_time", lookup_time),
                );
            }
        }

        info!(
            key = %item.key,
            rows = rows.len(),
            diagrams = ctx.cache().build_count(),
            "Evaluated system"
        );
        Ok(rows)
    }

    fn event_row(
        &self,
        item: &WorkItem<Option<PathBuf>>,
        key_column: &str,
        event: &BuildEvent<GroupKey>,
        built: &Self::Derived,
    ) -> Row {
        Row::new()
            .with(key_column, &item.key)
            .with("name", &built.name)
            .with("entry_id", &built.entry_id)
            .with("group", &event.group)
            .with("diagram_time", event.elapsed_secs())
            .with("built_at", event.built_at.to_rfc3339())
    }
}
