//! # Shardflow
//!
//! Resumable, shardable batch jobs with checkpointed CSV output.
//!
//! A run walks a deterministic work set, fetches each item's input from a
//! remote service through a retrying client, and buffers result rows in a
//! checkpoint store that is flushed atomically when the run ends:
//!
//! - **Sharding**: independent processes split the work set by MD5 of the key
//! - **Resume**: keys already recorded by any earlier run, under any shard
//!   count, are skipped
//! - **Retry classification**: transient failures back off, rate limits pause,
//!   rejected inputs are recorded, anything else aborts the run
//! - **Per-item memoization**: expensive derived objects are built once per
//!   group within an item
//! - **Cancellation**: an interrupt stops the run after flushing what it has
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shardflow::prelude::*;
//!
//! let config = RunConfig::from_file("run.json".as_ref())?;
//! let assignment = JobAssignment::from_args(Some(0), Some(4))?;
//! let catalog = HttpCatalog::new(&config.catalog)?;
//!
//! let summary = run_download(&config, assignment, catalog, cancel).await?;
//! println!("{summary}");
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod cancellation;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod domain;
pub mod driver;
pub mod errors;
pub mod jobs;
pub mod observability;
pub mod partition;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{BuildEvent, GroupCache, GroupKey};
    pub use crate::cancellation::{sleep_or_cancel, CancellationToken};
    pub use crate::checkpoint::{CheckpointStore, FlushGuard, FlushReport, Row, TableSchema};
    pub use crate::client::{CallError, RetryOutcome, RetryPolicy, RetryingClient};
    pub use crate::config::RunConfig;
    #[cfg(feature = "http")]
    pub use crate::domain::HttpCatalog;
    pub use crate::domain::{
        CatalogEntry, CatalogService, ConditionSources, DiagramEngine, Phase,
    };
    pub use crate::driver::{BatchDriver, BatchJob, ItemContext, ItemState, RunSummary, WorkItem};
    pub use crate::errors::{ShardflowError, UsageError};
    pub use crate::jobs::{run_decomposition, run_download, DecompositionJob, DownloadJob};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::partition::{assign, JobAssignment};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_covers_a_run() {
        let assignment = JobAssignment::from_args(Some(1), Some(3)).unwrap();
        let config = RunConfig::new();
        assert_eq!(assignment.file_suffix(), "_1");
        assert_eq!(config.key_column, "symbols");
        assert!(!CancellationToken::new().is_cancelled());
    }
}
