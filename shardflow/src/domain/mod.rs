//! Domain types for the materials jobs.
//!
//! The catalog service and the diagram engine are external collaborators;
//! this module defines the traits the jobs call them through, plus the
//! condition and composition handling the jobs need around those calls.

mod catalog;
mod composition;
mod conditions;
mod engine;
mod entry;

pub use catalog::CatalogService;
#[cfg(feature = "http")]
pub use catalog::{HttpCatalog, HttpCatalogConfig};
pub use composition::{
    chemsys, group_key_for, safe_int, symbols, work_set_from_compositions, NotIntegral,
    IMPLICIT_ELEMENTS, INTEGER_TOLERANCE,
};
pub use conditions::{Condition, ConditionSet, ConditionSources};
pub use engine::DiagramEngine;
pub use entry::{CatalogEntry, Phase};
