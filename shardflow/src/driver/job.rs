//! The job trait the driver runs.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::state::WorkItem;
use crate::cache::{BuildEvent, GroupCache, GroupKey};
use crate::checkpoint::Row;
use crate::client::{CallError, CallStats};
use crate::errors::ShardflowError;

/// A batch job: how to fetch one item's input and turn it into rows.
///
/// The driver owns everything around these calls: sharding, resume, retry
/// classification, caching scope and the final flush.
#[async_trait]
pub trait BatchJob: Send + Sync + Debug {
    /// Per-item input carried in the work set.
    type Payload: Send + Sync;

    /// What a successful fetch returns.
    type Fetched: Send;

    /// Expensive derived object memoized per [`GroupKey`] within an item.
    type Derived: Send + Sync;

    /// Returns the name of the job.
    fn name(&self) -> &str;

    /// Returns false if the item's required input is absent. Such items are
    /// skipped without being recorded.
    fn has_input(&self, _item: &WorkItem<Self::Payload>) -> bool {
        true
    }

    /// Fetches the item's input. Called through the retrying client, so
    /// this may be invoked several times for one item.
    async fn fetch(&self, item: &WorkItem<Self::Payload>) -> Result<Self::Fetched, CallError>;

    /// Turns fetched input into result rows.
    ///
    /// An empty result still marks the item done. An error aborts the run
    /// after the checkpoint is flushed.
    async fn complete(
        &self,
        item: &WorkItem<Self::Payload>,
        fetched: Self::Fetched,
        ctx: &ItemContext<Self::Derived>,
    ) -> Result<Vec<Row>, ShardflowError>;

    /// Row recorded for an item the service rejected.
    fn failure_row(
        &self,
        item: &WorkItem<Self::Payload>,
        key_column: &str,
        error_column: &str,
        reason: &str,
    ) -> Row {
        Row::new().with(key_column, &item.key).with(error_column, reason)
    }

    /// Row recorded in the construction event table for one build.
    fn event_row(
        &self,
        item: &WorkItem<Self::Payload>,
        key_column: &str,
        event: &BuildEvent<GroupKey>,
        _built: &Self::Derived,
    ) -> Row {
        Row::new()
            .with(key_column, &item.key)
            .with("group", &event.group)
            .with("build_time", event.elapsed_secs())
            .with("built_at", event.built_at.to_rfc3339())
    }
}

/// Per-item state handed to [`BatchJob::complete`].
///
/// The cache lives exactly as long as the item: values built for one entry
/// set are never offered to another.
#[derive(Debug)]
pub struct ItemContext<D> {
    started: Instant,
    call: CallStats,
    cache: GroupCache<GroupKey, D>,
}

impl<D> ItemContext<D> {
    /// Creates a context for an item whose processing began at `started`.
    #[must_use]
    pub fn new(started: Instant, call: CallStats) -> Self {
        Self {
            started,
            call,
            cache: GroupCache::new(),
        }
    }

    /// The item's group cache.
    #[must_use]
    pub fn cache(&self) -> &GroupCache<GroupKey, D> {
        &self.cache
    }

    /// Statistics of the fetch call.
    #[must_use]
    pub fn call_stats(&self) -> CallStats {
        self.call
    }

    /// Time since processing of the item began.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Build events of this item paired with the values they produced.
    pub(crate) fn into_builds(self) -> Vec<(BuildEvent<GroupKey>, Arc<D>)> {
        self.cache
            .drain_events()
            .into_iter()
            .filter_map(|event| {
                let built = self.cache.get(&event.group)?;
                Some((event, built))
            })
            .collect()
    }
}
