//! Scope guard tying the checkpoint flush to every exit path.

use tracing::{error, warn};

use super::store::{CheckpointStore, FlushReport};
use crate::errors::CheckpointError;

/// Flushes a [`CheckpointStore`] when dropped, unless already flushed.
///
/// Call [`FlushGuard::finish`] on the normal path to observe flush errors.
/// Early returns, panics, and dropped futures fall back to the flush in
/// `Drop`, where errors can only be logged.
#[derive(Debug)]
pub struct FlushGuard<'a> {
    store: &'a CheckpointStore,
    armed: bool,
}

impl<'a> FlushGuard<'a> {
    /// Arms a guard over `store`.
    #[must_use]
    pub fn new(store: &'a CheckpointStore) -> Self {
        Self { store, armed: true }
    }

    /// Flushes now and disarms the guard.
    pub fn finish(mut self) -> Result<FlushReport, CheckpointError> {
        self.armed = false;
        self.store.flush()
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || self.store.is_flushed() {
            return;
        }
        if std::thread::panicking() {
            warn!("Flushing checkpoint while unwinding");
        }
        if let Err(e) = self.store.flush() {
            error!(error = %e, "Checkpoint flush on exit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Row, Table, TableSchema};

    fn store_in(dir: &tempfile::TempDir) -> CheckpointStore {
        CheckpointStore::load(dir.path().join("out.csv.gz"), &[], TableSchema::new("key")).unwrap()
    }

    #[test]
    fn test_finish_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.append(vec![Row::new().with("key", "A")]);

        let report = FlushGuard::new(&store).finish().unwrap();
        assert_eq!(report.new_rows, 1);
        assert!(store.is_flushed());
    }

    #[test]
    fn test_drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        {
            let _guard = FlushGuard::new(&store);
            store.append(vec![Row::new().with("key", "A")]);
        }
        assert!(store.is_flushed());

        let table = Table::read(&dir.path().join("out.csv.gz")).unwrap().unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_drop_flushes_on_panic() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = FlushGuard::new(&store);
            store.append(vec![Row::new().with("key", "A")]);
            panic!("worker crashed");
        }));

        assert!(result.is_err());
        assert!(store.is_flushed());
    }
}
