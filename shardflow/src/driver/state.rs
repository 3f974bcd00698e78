//! Work items and their per-run lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One unit of work: a canonical key plus whatever the job needs to do it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<P> {
    /// Canonical key. Equal items always derive the same key.
    pub key: String,
    /// Job-specific input.
    pub payload: P,
}

impl<P> WorkItem<P> {
    /// Creates a work item.
    #[must_use]
    pub fn new(key: impl Into<String>, payload: P) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

impl WorkItem<()> {
    /// Creates a work item with no payload.
    #[must_use]
    pub fn key_only(key: impl Into<String>) -> Self {
        Self::new(key, ())
    }
}

/// Where an item stands within one run.
///
/// `Pending` moves to one of the skip states or to `Processing`, which ends
/// in `Succeeded`, `PermanentlyFailed` or `TransientlySkipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Not looked at yet.
    Pending,
    /// Owned by another shard.
    SkippedNotMyShard,
    /// Recorded by this or an earlier run.
    SkippedAlreadyDone,
    /// Required input is absent.
    SkippedMissingInput,
    /// Being worked on.
    Processing,
    /// Completed and recorded.
    Succeeded,
    /// Rejected by the service and recorded with the reason.
    PermanentlyFailed,
    /// Gave up for this run; a later run retries it.
    TransientlySkipped,
}

impl ItemState {
    /// Returns true if the state ends the item's run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }

    /// Returns true if reaching this state writes a checkpoint row.
    #[must_use]
    pub fn is_recorded(self) -> bool {
        matches!(self, Self::Succeeded | Self::PermanentlyFailed)
    }

    /// Returns true for the three skip states decided before processing.
    #[must_use]
    pub fn is_skip(self) -> bool {
        matches!(
            self,
            Self::SkippedNotMyShard | Self::SkippedAlreadyDone | Self::SkippedMissingInput
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::SkippedNotMyShard => "skipped_not_my_shard",
            Self::SkippedAlreadyDone => "skipped_already_done",
            Self::SkippedMissingInput => "skipped_missing_input",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::PermanentlyFailed => "permanently_failed",
            Self::TransientlySkipped => "transiently_skipped",
        };
        f.write_str(name)
    }
}
