//! Locating checkpoint tables written by earlier runs.

use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};

use crate::partition::JobAssignment;

/// Path of this run's table: `{dir}/{stem}.csv.gz` or `{dir}/{stem}_{job}.csv.gz`.
#[must_use]
pub fn output_path(dir: &Path, stem: &str, assignment: &JobAssignment) -> PathBuf {
    dir.join(format!("{stem}{}.csv.gz", assignment.file_suffix()))
}

/// Finds every table named `{stem}.csv[.gz]` or `{stem}_{n}.csv[.gz]` in `dir`.
///
/// Results are sorted. A missing directory yields no tables.
pub fn discover_tables(dir: &Path, stem: &str) -> io::Result<Vec<PathBuf>> {
    let pattern = Regex::new(&format!(r"^{}(_\d+)?\.csv(\.gz)?$", regex::escape(stem)))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_str().is_some_and(|name| pattern.is_match(name)) {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        let dir = Path::new("runs");
        assert_eq!(
            output_path(dir, "pourbaix_downloads", &JobAssignment::Unsharded),
            PathBuf::from("runs/pourbaix_downloads.csv.gz")
        );
        assert_eq!(
            output_path(dir, "pourbaix_downloads", &JobAssignment::shard(2, 5).unwrap()),
            PathBuf::from("runs/pourbaix_downloads_2.csv.gz")
        );
    }

    #[test]
    fn test_discover_tables() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "downloads.csv.gz",
            "downloads_0.csv.gz",
            "downloads_12.csv",
            "downloads_x.csv.gz",
            "downloads.json.gz",
            "other_1.csv.gz",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let found: Vec<String> = discover_tables(dir.path(), "downloads")
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            found,
            vec!["downloads.csv.gz", "downloads_0.csv.gz", "downloads_12.csv"]
        );
    }

    #[test]
    fn test_discover_missing_dir() {
        let found = discover_tables(Path::new("/nonexistent/shardflow"), "x").unwrap();
        assert!(found.is_empty());
    }
}
