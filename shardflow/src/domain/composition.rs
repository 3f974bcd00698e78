//! Chemical systems, integral compositions and the download work set.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use super::entry::CatalogEntry;
use crate::cache::GroupKey;
use crate::checkpoint::Table;
use crate::errors::{ShardflowError, UsageError};

/// Elements dropped from every system; the diagram adds them itself.
pub const IMPLICIT_ELEMENTS: [&str; 2] = ["H", "O"];

/// Default tolerance for [`safe_int`].
pub const INTEGER_TOLERANCE: f64 = 1e-5;

/// An amount that is not close enough to an integer.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("value {value} is not close to an integer")]
pub struct NotIntegral {
    /// The offending amount.
    pub value: f64,
}

/// Truncates `value` to an integer, failing if that moves it by more than
/// `tolerance`.
#[allow(clippy::cast_possible_truncation)]
pub fn safe_int(value: f64, tolerance: f64) -> Result<i64, NotIntegral> {
    let truncated = value.trunc();
    if !value.is_finite() || (truncated - value).abs() > tolerance {
        return Err(NotIntegral { value });
    }
    Ok(truncated as i64)
}

/// Canonical chemical system key: distinct symbols sorted and dash-joined.
pub fn chemsys<I, S>(symbols: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let set: BTreeSet<String> = symbols
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect();
    set.into_iter().collect::<Vec<_>>().join("-")
}

/// Splits a chemical system key back into its symbols.
#[must_use]
pub fn symbols(chemsys: &str) -> Vec<String> {
    chemsys
        .split('-')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Derives the download work set from a `material_id,element` table.
///
/// Each material contributes the set of its elements minus [`IMPLICIT_ELEMENTS`];
/// empty sets are dropped and duplicates collapse. Keys are returned sorted.
pub fn work_set_from_compositions(path: &Path) -> Result<Vec<String>, ShardflowError> {
    let table = Table::read(path)?.ok_or_else(|| {
        UsageError::new(format!("compositions table '{}' does not exist", path.display()))
    })?;
    for column in ["material_id", "element"] {
        if !table.is_empty() && !table.header.iter().any(|h| h == column) {
            return Err(UsageError::new(format!(
                "compositions table '{}' has no '{column}' column",
                path.display()
            ))
            .into());
        }
    }

    let mut by_material: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for row in &table.rows {
        if let (Some(material), Some(element)) = (row.get("material_id"), row.get("element")) {
            by_material.entry(material).or_default().insert(element);
        }
    }

    let systems: BTreeSet<String> = by_material
        .into_values()
        .map(|elements| {
            elements
                .into_iter()
                .filter(|e| !IMPLICIT_ELEMENTS.contains(e))
                .collect::<Vec<_>>()
        })
        .filter(|elements| !elements.is_empty())
        .map(chemsys)
        .collect();

    Ok(systems.into_iter().collect())
}

/// Group key for `entry` restricted to the elements of `system`.
///
/// Amounts must be integral within `tolerance`.
pub fn group_key_for(
    entry: &CatalogEntry,
    system: &[String],
    tolerance: f64,
) -> Result<GroupKey, NotIntegral> {
    let mut counts = Vec::new();
    for (symbol, amount) in &entry.composition {
        if system.iter().any(|s| s == symbol) {
            counts.push((symbol.clone(), safe_int(*amount, tolerance)?));
        }
    }
    Ok(GroupKey::from_counts(counts))
}
