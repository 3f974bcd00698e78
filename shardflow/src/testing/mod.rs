//! Testing utilities for shardflow jobs.
//!
//! This module provides:
//! - A scripted catalog and a counting diagram engine
//! - Entry and input file fixtures
//! - Assertions over written tables

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_header, assert_keys_disjoint, assert_table_keys, read_table};
pub use fixtures::{entry, fast_policy, write_compositions};
pub use mocks::{CountingEngine, FakeDiagram, ScriptedCatalog};
