//! Catalog entries as stored between the download and decomposition jobs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static MATERIAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(mp|mvc)-\d+").expect("material id pattern is valid"));

/// Phase of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// A solid phase.
    Solid,
    /// A dissolved ion.
    Ion,
}

/// One entry returned by the remote catalog.
///
/// Only the fields the jobs read are typed. Everything else the service
/// returns is kept in `extra` so the file round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Catalog identifier, for example `mp-149-GGA`.
    pub entry_id: String,
    /// Display name (reduced formula).
    pub name: String,
    /// Phase type.
    pub phase: Phase,
    /// Reduced composition: element symbol to amount.
    pub composition: BTreeMap<String, f64>,
    /// Remaining service fields.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CatalogEntry {
    /// Creates an entry with no extra fields.
    #[must_use]
    pub fn new(
        entry_id: impl Into<String>,
        name: impl Into<String>,
        phase: Phase,
        composition: impl IntoIterator<Item = (String, f64)>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            name: name.into(),
            phase,
            composition: composition.into_iter().collect(),
            extra: serde_json::Map::new(),
        }
    }

    /// Returns true for solid entries.
    #[must_use]
    pub fn is_solid(&self) -> bool {
        self.phase == Phase::Solid
    }

    /// The material id prefix of `entry_id` (`mp-123` or `mvc-45`), if the
    /// id has that form.
    #[must_use]
    pub fn material_id(&self) -> Option<&str> {
        MATERIAL_ID.find(&self.entry_id).map(|m| m.as_str())
    }
}
