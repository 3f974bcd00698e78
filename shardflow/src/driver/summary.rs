//! Per-run outcome counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::state::ItemState;
use crate::checkpoint::FlushReport;

/// Record of a key that failed during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The work key.
    pub key: String,
    /// Failure description.
    pub reason: String,
    /// `PermanentlyFailed` or `TransientlySkipped`.
    pub state: ItemState,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a failure record stamped now.
    #[must_use]
    pub fn new(key: impl Into<String>, reason: impl Into<String>, state: ItemState) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
            state,
            timestamp: Utc::now(),
        }
    }
}

/// What one run did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items looked at.
    pub seen: usize,
    /// Terminal state counts.
    pub states: BTreeMap<ItemState, usize>,
    /// Rate-limit pauses taken.
    pub rate_limit_pauses: u32,
    /// Remote call attempts made.
    pub call_attempts: u32,
    /// Expensive group builds performed.
    pub builds: usize,
    /// Keys that failed, permanently or for this run only.
    pub failures: Vec<FailureRecord>,
    /// What the final flush wrote.
    pub flush: Option<FlushReport>,
}

impl RunSummary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts an item reaching `state`.
    pub fn record(&mut self, state: ItemState) {
        self.seen += 1;
        *self.states.entry(state).or_insert(0) += 1;
    }

    /// Counts a failed item and keeps its reason.
    pub fn record_failure(&mut self, key: &str, reason: &str, state: ItemState) {
        self.record(state);
        self.failures.push(FailureRecord::new(key, reason, state));
    }

    /// Number of items that reached `state`.
    #[must_use]
    pub fn count(&self, state: ItemState) -> usize {
        self.states.get(&state).copied().unwrap_or(0)
    }

    /// Items recorded in the checkpoint by this run.
    #[must_use]
    pub fn recorded(&self) -> usize {
        self.count(ItemState::Succeeded) + self.count(ItemState::PermanentlyFailed)
    }

    /// Items skipped before processing.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.states
            .iter()
            .filter(|(state, _)| state.is_skip())
            .map(|(_, n)| n)
            .sum()
    }

    /// Returns true if any item failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} seen, {} succeeded, {} permanently failed, {} transiently skipped, \
             {} already done, {} not in shard, {} missing input, {} builds, {} rate-limit pauses",
            self.seen,
            self.count(ItemState::Succeeded),
            self.count(ItemState::PermanentlyFailed),
            self.count(ItemState::TransientlySkipped),
            self.count(ItemState::SkippedAlreadyDone),
            self.count(ItemState::SkippedNotMyShard),
            self.count(ItemState::SkippedMissingInput),
            self.builds,
            self.rate_limit_pauses,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut summary = RunSummary::new();
        summary.record(ItemState::Succeeded);
        summary.record(ItemState::Succeeded);
        summary.record(ItemState::SkippedNotMyShard);
        summary.record(ItemState::SkippedAlreadyDone);
        summary.record_failure("Yb", "unsupported", ItemState::PermanentlyFailed);
        summary.record_failure("Zn", "timed out", ItemState::TransientlySkipped);

        assert_eq!(summary.seen, 6);
        assert_eq!(summary.recorded(), 3);
        assert_eq!(summary.skipped(), 2);
        assert_eq!(summary.count(ItemState::SkippedMissingInput), 0);
        assert!(summary.has_failures());
        assert_eq!(summary.failures[1].key, "Zn");
    }

    #[test]
    fn test_display() {
        let mut summary = RunSummary::new();
        summary.record(ItemState::Succeeded);
        assert!(summary.to_string().starts_with("1 seen, 1 succeeded"));
    }

    #[test]
    fn test_serializes() {
        let mut summary = RunSummary::new();
        summary.record(ItemState::Succeeded);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["states"]["succeeded"], 1);
    }
}
