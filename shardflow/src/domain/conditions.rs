//! (pH, voltage) conditions at which decomposition energies are evaluated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::checkpoint::Table;
use crate::errors::UsageError;

/// One evaluation point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// pH.
    pub ph: f64,
    /// Electrode potential in volts.
    pub voltage: f64,
}

impl Condition {
    /// Creates a condition.
    #[must_use]
    pub fn new(ph: f64, voltage: f64) -> Self {
        Self { ph, voltage }
    }
}

/// Where conditions come from. At least one source is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionSources {
    /// Table with `ph,voltage` columns applied to every entry.
    #[serde(default)]
    pub global_csv: Option<PathBuf>,
    /// Table with `material_id,ph,voltage` columns.
    #[serde(default)]
    pub material_csv: Option<PathBuf>,
    /// Comma-separated pH values, combined with every inline voltage.
    #[serde(default)]
    pub ph: Option<String>,
    /// Comma-separated voltages, combined with every inline pH.
    #[serde(default)]
    pub voltage: Option<String>,
}

impl ConditionSources {
    /// Creates an empty source list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global conditions table.
    #[must_use]
    pub fn with_global_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_csv = Some(path.into());
        self
    }

    /// Sets the material-specific conditions table.
    #[must_use]
    pub fn with_material_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.material_csv = Some(path.into());
        self
    }

    /// Sets inline pH and voltage lists.
    #[must_use]
    pub fn with_inline(mut self, ph: impl Into<String>, voltage: impl Into<String>) -> Self {
        self.ph = Some(ph.into());
        self.voltage = Some(voltage.into());
        self
    }

    /// Validates the sources and reads every table.
    pub fn load(&self) -> Result<ConditionSet, UsageError> {
        let inline_complete = self.ph.is_some() && self.voltage.is_some();
        if self.global_csv.is_none() && self.material_csv.is_none() && !inline_complete {
            return Err(UsageError::new("no condition source given").with_fix_hint(
                "pass a global conditions file, a material conditions file, or both --ph and --voltage",
            ));
        }

        let mut set = ConditionSet::default();

        if let Some(path) = &self.global_csv {
            let table = read_conditions_table(path, &["ph", "voltage"])?;
            for row in &table.rows {
                set.global.push(Condition::new(
                    parse_cell(path, row.get("ph"), "ph")?,
                    parse_cell(path, row.get("voltage"), "voltage")?,
                ));
            }
        }

        match (&self.ph, &self.voltage) {
            (Some(ph), Some(voltage)) => {
                let phs = parse_list("--ph", ph)?;
                let voltages = parse_list("--voltage", voltage)?;
                for ph in &phs {
                    for voltage in &voltages {
                        set.global.push(Condition::new(*ph, *voltage));
                    }
                }
            }
            (None, None) => {}
            _ => {
                return Err(UsageError::new(
                    "--ph and --voltage must be given together",
                ))
            }
        }

        if let Some(path) = &self.material_csv {
            let table = read_conditions_table(path, &["material_id", "ph", "voltage"])?;
            for row in &table.rows {
                let Some(material_id) = row.get("material_id") else {
                    return Err(UsageError::new(format!(
                        "empty material_id in '{}'",
                        path.display()
                    )));
                };
                let condition = Condition::new(
                    parse_cell(path, row.get("ph"), "ph")?,
                    parse_cell(path, row.get("voltage"), "voltage")?,
                );
                set.by_material
                    .entry(material_id.to_string())
                    .or_default()
                    .push(condition);
            }
        }

        Ok(set)
    }
}

/// Loaded conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    /// Conditions applied to every entry.
    pub global: Vec<Condition>,
    /// Extra conditions per material id.
    pub by_material: HashMap<String, Vec<Condition>>,
}

impl ConditionSet {
    /// Global conditions followed by those specific to `material_id`.
    #[must_use]
    pub fn for_material(&self, material_id: &str) -> Vec<Condition> {
        let mut conditions = self.global.clone();
        if let Some(specific) = self.by_material.get(material_id) {
            conditions.extend_from_slice(specific);
        }
        conditions
    }

    /// Returns true if no conditions were loaded at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.by_material.values().all(Vec::is_empty)
    }
}

fn read_conditions_table(path: &Path, required: &[&str]) -> Result<Table, UsageError> {
    let table = Table::read(path)
        .map_err(|e| UsageError::new(e.to_string()))?
        .ok_or_else(|| {
            UsageError::new(format!("conditions file '{}' does not exist", path.display()))
        })?;

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|column| !table.header.iter().any(|h| h == column))
        .collect();
    if !missing.is_empty() {
        return Err(UsageError::new(format!(
            "conditions file '{}' is missing column(s): {}",
            path.display(),
            missing.join(", ")
        ))
        .with_fix_hint(format!("expected columns: {}", required.join(","))));
    }
    Ok(table)
}

fn parse_cell(path: &Path, value: Option<&str>, column: &str) -> Result<f64, UsageError> {
    let value = value.ok_or_else(|| {
        UsageError::new(format!("empty '{column}' value in '{}'", path.display()))
    })?;
    value.trim().parse().map_err(|_| {
        UsageError::new(format!(
            "invalid '{column}' value '{value}' in '{}'",
            path.display()
        ))
    })
}

fn parse_list(flag: &str, text: &str) -> Result<Vec<f64>, UsageError> {
    text.split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| UsageError::new(format!("invalid {flag} value '{}'", part.trim())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_no_source_is_usage_error() {
        let err = ConditionSources::new().load().unwrap_err();
        assert!(err.fix_hint.is_some());
    }

    #[test]
    fn test_ph_without_voltage() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.csv");
        std::fs::write(&global, "ph,voltage\n7,0\n").unwrap();

        let mut sources = ConditionSources::new().with_global_csv(&global);
        sources.ph = Some("7".to_string());
        assert!(sources.load().is_err());

        let mut only_ph = ConditionSources::new();
        only_ph.ph = Some("7".to_string());
        assert!(only_ph.load().is_err());
    }

    #[test]
    fn test_inline_cartesian_product() {
        let set = ConditionSources::new()
            .with_inline("0, 7", "-1,0,1")
            .load()
            .unwrap();

        assert_eq!(set.global.len(), 6);
        assert_eq!(set.global[0], Condition::new(0.0, -1.0));
        assert_eq!(set.global[5], Condition::new(7.0, 1.0));
    }

    #[test]
    fn test_invalid_inline_value() {
        let err = ConditionSources::new()
            .with_inline("7,abc", "0")
            .load()
            .unwrap_err();
        assert!(err.message.contains("abc"));
    }

    #[test]
    fn test_global_and_material_tables() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.csv");
        let material = dir.path().join("material.csv");
        std::fs::write(&global, "ph,voltage\n7,0\n").unwrap();
        std::fs::write(
            &material,
            "material_id,ph,voltage\nmp-13,2,0.5\nmp-13,3,0.5\nmp-19,14,-1\n",
        )
        .unwrap();

        let set = ConditionSources::new()
            .with_global_csv(&global)
            .with_material_csv(&material)
            .with_inline("1", "1")
            .load()
            .unwrap();

        assert_eq!(
            set.for_material("mp-13"),
            vec![
                Condition::new(7.0, 0.0),
                Condition::new(1.0, 1.0),
                Condition::new(2.0, 0.5),
                Condition::new(3.0, 0.5),
            ]
        );
        assert_eq!(set.for_material("mp-99").len(), 2);
    }

    #[test]
    fn test_material_only_has_no_global() {
        let dir = tempfile::tempdir().unwrap();
        let material = dir.path().join("material.csv");
        std::fs::write(&material, "material_id,ph,voltage\nmp-13,2,0.5\n").unwrap();

        let set = ConditionSources::new().with_material_csv(&material).load().unwrap();
        assert!(set.for_material("mp-19").is_empty());
        assert!(!set.is_empty());
    }

    #[test]
    fn test_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.csv");
        std::fs::write(&global, "ph,potential\n7,0\n").unwrap();

        let err = ConditionSources::new()
            .with_global_csv(&global)
            .load()
            .unwrap_err();
        assert!(err.message.contains("voltage"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConditionSources::new()
            .with_global_csv(dir.path().join("nope.csv"))
            .load()
            .unwrap_err();
        assert!(err.message.contains("does not exist"));
    }
}
