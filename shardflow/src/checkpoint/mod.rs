//! Checkpoint storage for resumable runs.
//!
//! This module provides:
//! - `Table` and `Row` for CSV (optionally gzip) tables
//! - `CheckpointStore` for the done set and buffered output
//! - `FlushGuard` to flush on every exit path
//! - table discovery across differently-sharded earlier runs

mod discovery;
mod guard;
mod store;
mod table;

pub use discovery::{discover_tables, output_path};
pub use guard::FlushGuard;
pub use store::{CheckpointStore, FlushReport};
pub use table::{Row, Table, TableSchema};
