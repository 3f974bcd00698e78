//! Sequential batch driver for one shard.

use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::job::{BatchJob, ItemContext};
use super::state::{ItemState, WorkItem};
use super::summary::RunSummary;
use crate::checkpoint::{CheckpointStore, FlushGuard, Row};
use crate::client::{RetryOutcome, RetryingClient};
use crate::errors::ShardflowError;
use crate::partition::JobAssignment;

/// Runs a [`BatchJob`] over a work set for one shard.
///
/// Per item: ownership check, done check, input check, fetch through the
/// retrying client, completion, then buffering of the item's rows. The
/// checkpoint is flushed exactly once per run, on every exit path.
#[derive(Debug)]
pub struct BatchDriver<J> {
    job: J,
    assignment: JobAssignment,
    client: RetryingClient,
}

impl<J: BatchJob> BatchDriver<J> {
    /// Creates a driver.
    #[must_use]
    pub fn new(job: J, assignment: JobAssignment, client: RetryingClient) -> Self {
        Self {
            job,
            assignment,
            client,
        }
    }

    /// The job being run.
    #[must_use]
    pub fn job(&self) -> &J {
        &self.job
    }

    /// This process's shard assignment.
    #[must_use]
    pub fn assignment(&self) -> JobAssignment {
        self.assignment
    }

    /// Processes `items` in order, buffering results in `store`, and flushes
    /// the store before returning.
    ///
    /// Returns an error only for fatal aborts, cancellation and flush
    /// failures. Rows buffered before an abort are still written.
    pub async fn run<I>(
        &self,
        items: I,
        store: &CheckpointStore,
    ) -> Result<RunSummary, ShardflowError>
    where
        I: IntoIterator<Item = WorkItem<J::Payload>>,
        I::IntoIter: Send,
    {
        let guard = FlushGuard::new(store);
        let mut summary = RunSummary::new();
        let cancel = self.client.cancellation();

        info!(
            job = self.job.name(),
            assignment = %self.assignment,
            prior_rows = store.prior_count(),
            done_keys = store.done_count(),
            "Run started"
        );

        for item in items {
            if let Some(reason) = cancel.reason() {
                return Err(abort(guard, ShardflowError::Cancelled(reason)));
            }

            match self.process(&item, store, &mut summary).await {
                Ok((state, None)) => summary.record(state),
                Ok((state, Some(reason))) => summary.record_failure(&item.key, &reason, state),
                Err(err) => return Err(abort(guard, err)),
            }
        }

        let report = guard.finish()?;
        summary.flush = Some(report);
        info!(job = self.job.name(), %summary, "Run finished");
        Ok(summary)
    }

    async fn process(
        &self,
        item: &WorkItem<J::Payload>,
        store: &CheckpointStore,
        summary: &mut RunSummary,
    ) -> Result<(ItemState, Option<String>), ShardflowError> {
        let key = item.key.as_str();

        if !self.assignment.is_mine(key) {
            trace!(key, "Skipping, not part of this shard");
            return Ok((ItemState::SkippedNotMyShard, None));
        }
        if store.is_done(key) {
            info!(key, "Skipping, already done");
            return Ok((ItemState::SkippedAlreadyDone, None));
        }
        if !self.job.has_input(item) {
            debug!(key, "Skipping, input missing");
            return Ok((ItemState::SkippedMissingInput, None));
        }

        let started = Instant::now();
        let (outcome, stats) = self
            .client
            .call_settled(key, || self.job.fetch(item))
            .await;
        summary.rate_limit_pauses += stats.rate_limit_pauses;
        summary.call_attempts += stats.attempts;

        let schema = store.schema();
        match outcome {
            RetryOutcome::Success(fetched) => {
                let ctx = ItemContext::new(started, stats);
                let mut rows = self.job.complete(item, fetched, &ctx).await?;
                if rows.is_empty() {
                    rows.push(Row::new());
                }
                for row in &mut rows {
                    if row.get(&schema.key_column).is_none() {
                        row.set(&schema.key_column, key);
                    }
                }

                let elapsed = ctx.elapsed();
                let events: Vec<Row> = ctx
                    .into_builds()
                    .iter()
                    .map(|(event, built)| {
                        self.job.event_row(item, &schema.key_column, event, built)
                    })
                    .collect();
                summary.builds += events.len();

                info!(
                    key,
                    rows = rows.len(),
                    builds = events.len(),
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "Item completed"
                );
                store.append_with_events(rows, events);
                Ok((ItemState::Succeeded, None))
            }
            RetryOutcome::PermanentFailure(reason) => {
                store.append(vec![self.job.failure_row(
                    item,
                    &schema.key_column,
                    &schema.error_column,
                    &reason,
                )]);
                Ok((ItemState::PermanentlyFailed, Some(reason)))
            }
            RetryOutcome::TransientFailure(reason) => {
                warn!(key, attempts = stats.attempts, "Giving up on key for this run");
                Ok((ItemState::TransientlySkipped, Some(reason)))
            }
            RetryOutcome::RateLimited(pause) => {
                // call_settled waits these out; treat a leak as transient.
                warn!(key, pause_s = pause.as_secs_f64(), "Unexpected rate limit outcome");
                Ok((ItemState::TransientlySkipped, Some("rate limited".to_string())))
            }
            RetryOutcome::FatalAbort(reason) => match self.client.cancellation().reason() {
                Some(cancelled) => Err(ShardflowError::Cancelled(cancelled)),
                None => Err(ShardflowError::fatal(key, reason)),
            },
        }
    }
}

fn abort(guard: FlushGuard<'_>, err: ShardflowError) -> ShardflowError {
    error!(error = %err, "Run aborted, flushing checkpoint");
    match guard.finish() {
        Ok(report) => info!(
            path = %report.results_path.display(),
            new_rows = report.new_rows,
            "Checkpoint flushed after abort"
        ),
        Err(flush_err) => error!(error = %flush_err, "Checkpoint flush after abort failed"),
    }
    err
}
