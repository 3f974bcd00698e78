//! Batch driver: runs a job over a work set for one shard.
//!
//! This module provides:
//! - `BatchJob`, the trait a job implements
//! - `BatchDriver`, the per-item state machine around the job
//! - `RunSummary`, the per-run outcome counts

mod job;
mod runner;
mod state;
mod summary;

pub use job::{BatchJob, ItemContext};
pub use runner::BatchDriver;
pub use state::{ItemState, WorkItem};
pub use summary::{FailureRecord, RunSummary};
