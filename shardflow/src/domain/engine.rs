//! The diagram engine that turns entries into decomposition energies.

use super::entry::CatalogEntry;
use crate::errors::EngineError;

/// Builds diagrams from an entry set and evaluates entries against them.
///
/// Both operations are CPU-bound and synchronous. A diagram depends only on
/// the entry set and the weights it was built from.
pub trait DiagramEngine: Send + Sync {
    /// The built diagram.
    type Diagram: Send + Sync;

    /// Builds a diagram for `entries`, weighting elements by `weights`
    /// (fractions summing to one).
    fn build(
        &self,
        entries: &[CatalogEntry],
        weights: &[(String, f64)],
    ) -> Result<Self::Diagram, EngineError>;

    /// Decomposition energy of `entry` at the given pH and voltage.
    fn evaluate(
        &self,
        diagram: &Self::Diagram,
        entry: &CatalogEntry,
        ph: f64,
        voltage: f64,
    ) -> Result<f64, EngineError>;
}
