//! Fixture builders for job tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{JitterStrategy, RetryPolicy};
use crate::domain::{CatalogEntry, Phase};

/// A solid entry with the given composition. The name is the formula.
#[must_use]
pub fn entry(entry_id: &str, composition: &[(&str, f64)]) -> CatalogEntry {
    let name: String = composition
        .iter()
        .map(|(symbol, amount)| format!("{symbol}{amount}"))
        .collect();
    CatalogEntry::new(
        entry_id,
        name,
        Phase::Solid,
        composition.iter().map(|(s, a)| ((*s).to_string(), *a)),
    )
}

/// Retry policy with one-second backoff and no jitter, for paused-clock tests.
#[must_use]
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_backoff_base(Duration::from_secs(1))
        .with_backoff_growth(1.0)
        .with_jitter(JitterStrategy::None)
}

/// Writes a `material_id,element` table with one row per pair.
///
/// # Panics
///
/// Panics if the file cannot be written.
#[allow(clippy::expect_used)]
pub fn write_compositions(dir: &Path, pairs: &[(&str, &str)]) -> PathBuf {
    let path = dir.join("compositions.csv");
    let mut text = String::from("material_id,element\n");
    for (material, element) in pairs {
        text.push_str(&format!("{material},{element}\n"));
    }
    std::fs::write(&path, text).expect("compositions fixture is writable");
    path
}
