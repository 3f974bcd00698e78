//! Assertions over written checkpoint tables.

use std::collections::HashSet;
use std::path::Path;

use crate::checkpoint::Table;

/// Reads a table that must exist.
///
/// # Panics
///
/// Panics if the table is missing or unreadable.
#[must_use]
pub fn read_table(path: &Path) -> Table {
    match Table::read(path) {
        Ok(Some(table)) => table,
        Ok(None) => panic!("Expected table at '{}', but it does not exist", path.display()),
        Err(e) => panic!("Failed to read '{}': {e}", path.display()),
    }
}

/// Asserts the table's keys, in row order.
pub fn assert_table_keys(path: &Path, key_column: &str, expected: &[&str]) {
    let table = read_table(path);
    let keys: Vec<&str> = table.keys(key_column).collect();
    assert_eq!(
        keys,
        expected,
        "Unexpected keys in '{}'",
        path.display()
    );
}

/// Asserts that no key appears in more than one of `paths`, and at most once
/// within each.
pub fn assert_keys_disjoint(paths: &[&Path], key_column: &str) {
    let mut seen = HashSet::new();
    for path in paths {
        for key in read_table(path).keys(key_column) {
            assert!(
                seen.insert(key.to_string()),
                "Key '{key}' recorded more than once (again in '{}')",
                path.display()
            );
        }
    }
}

/// Asserts that the table's header is exactly `expected`.
pub fn assert_header(path: &Path, expected: &[&str]) {
    let table = read_table(path);
    assert_eq!(
        table.header, expected,
        "Unexpected header in '{}'",
        path.display()
    );
}
