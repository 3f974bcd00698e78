//! Retry-classifying wrapper around a single remote call.

use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::CallError;
use super::outcome::{CallStats, RetryOutcome};
use super::policy::{FailureClass, RetryPolicy};
use crate::cancellation::{sleep_or_cancel, CancellationToken, Interrupted};

/// Wraps remote calls with a [`RetryPolicy`].
///
/// All sleeps and in-flight calls are raced against the run's cancellation
/// token; an interrupt surfaces as [`RetryOutcome::FatalAbort`].
#[derive(Debug, Clone)]
pub struct RetryingClient {
    policy: RetryPolicy,
    cancel: Arc<CancellationToken>,
}

impl RetryingClient {
    /// Creates a client.
    #[must_use]
    pub fn new(policy: RetryPolicy, cancel: Arc<CancellationToken>) -> Self {
        Self { policy, cancel }
    }

    /// The retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The cancellation token shared with the run.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Calls `operation` until it succeeds, exhausts its attempts, or fails
    /// in a way that is not retried here.
    ///
    /// Rate limiting is returned to the caller as
    /// [`RetryOutcome::RateLimited`]; see [`RetryingClient::call_settled`]
    /// for a variant that waits it out.
    pub async fn call<T, F, Fut>(&self, key: &str, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        self.attempt_round(key, &mut operation).await.0
    }

    /// Like [`RetryingClient::call`], but pauses and calls again whenever the
    /// service rate-limits us. Pauses do not count against `max_attempts`.
    ///
    /// Never returns [`RetryOutcome::RateLimited`].
    pub async fn call_settled<T, F, Fut>(
        &self,
        key: &str,
        mut operation: F,
    ) -> (RetryOutcome<T>, CallStats)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let started = Instant::now();
        let mut stats = CallStats::default();

        loop {
            let (outcome, attempts) = self.attempt_round(key, &mut operation).await;
            stats.attempts += attempts;

            let RetryOutcome::RateLimited(pause) = outcome else {
                stats.elapsed = started.elapsed();
                return (outcome, stats);
            };

            stats.rate_limit_pauses += 1;
            info!(
                key,
                pause_s = pause.as_secs_f64(),
                pauses = stats.rate_limit_pauses,
                "Rate limited, pausing before calling again"
            );
            if let Err(interrupted) = sleep_or_cancel(pause, &self.cancel).await {
                stats.elapsed = started.elapsed();
                return (interrupted_outcome(&interrupted), stats);
            }
        }
    }

    async fn attempt_round<T, F, Fut>(&self, key: &str, operation: &mut F) -> (RetryOutcome<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if let Some(reason) = self.cancel.reason() {
                return (interrupted_outcome(&Interrupted { reason }), attempt - 1);
            }

            let result = tokio::select! {
                result = operation() => result,
                () = self.cancel.cancelled() => {
                    let reason = self.cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                    return (interrupted_outcome(&Interrupted { reason }), attempt);
                }
            };

            let err = match result {
                Ok(value) => {
                    debug!(key, attempt, "Call succeeded");
                    return (RetryOutcome::Success(value), attempt);
                }
                Err(err) => err,
            };

            match self.policy.classify(&err) {
                FailureClass::Transient if attempt < max_attempts => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        key,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Call failed, retrying after backoff"
                    );
                    if let Err(interrupted) = sleep_or_cancel(delay, &self.cancel).await {
                        return (interrupted_outcome(&interrupted), attempt);
                    }
                }
                FailureClass::Transient => {
                    warn!(key, attempts = attempt, error = %err, "Call failed, attempts exhausted");
                    return (RetryOutcome::TransientFailure(err.to_string()), attempt);
                }
                FailureClass::RateLimited(pause) => {
                    return (RetryOutcome::RateLimited(pause), attempt);
                }
                FailureClass::Permanent => {
                    warn!(key, error = %err, "Input rejected");
                    return (RetryOutcome::PermanentFailure(err.to_string()), attempt);
                }
                FailureClass::Fatal => {
                    return (RetryOutcome::FatalAbort(err.to_string()), attempt);
                }
            }
        }

        // max_attempts >= 1, so the loop always returns.
        (
            RetryOutcome::TransientFailure("no attempts made".to_string()),
            0,
        )
    }
}

fn interrupted_outcome<T>(interrupted: &Interrupted) -> RetryOutcome<T> {
    RetryOutcome::FatalAbort(format!("interrupted: {}", interrupted.reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectionErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(3)
            .with_backoff_base(Duration::from_secs(1))
            .with_backoff_growth(2.0)
            .with_rate_limit_pause(Duration::from_secs(600))
            .with_rejected_status(422)
    }

    fn client() -> RetryingClient {
        RetryingClient::new(policy(), Arc::new(CancellationToken::new()))
    }

    /// Returns an operation that fails with `errors` in order, then succeeds
    /// with the number of calls made.
    fn scripted(
        errors: Vec<CallError>,
    ) -> (
        Arc<AtomicU32>,
        impl FnMut() -> std::future::Ready<Result<u32, CallError>>,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let result = match errors.get(n as usize) {
                Some(err) => Err(err.clone()),
                None => Ok(n + 1),
            };
            std::future::ready(result)
        };
        (calls, op)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let (calls, op) = scripted(vec![]);
        let outcome = client().call("Fe", op).await;

        assert_eq!(outcome, RetryOutcome::Success(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let (calls, op) = scripted(vec![
            CallError::connection(ConnectionErrorKind::Reset, "reset by peer"),
            CallError::status(503, "unavailable"),
        ]);
        let started = Instant::now();
        let outcome = client().call("Fe", op).await;

        assert_eq!(outcome, RetryOutcome::Success(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second.
        assert_eq!(started.elapsed().as_secs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhaustion() {
        let timeout = CallError::connection(ConnectionErrorKind::Timeout, "timed out");
        let (calls, op) = scripted(vec![timeout.clone(), timeout.clone(), timeout.clone()]);

        let outcome = client().call("Fe", op).await;

        assert!(matches!(outcome, RetryOutcome::TransientFailure(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_not_retried() {
        let (calls, op) = scripted(vec![CallError::rejected("Yb is not supported")]);
        let outcome = client().call("Yb", op).await;

        assert_eq!(
            outcome,
            RetryOutcome::PermanentFailure("Input rejected: Yb is not supported".to_string())
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_is_fatal() {
        let (calls, op) = scripted(vec![CallError::other("unexpected payload")]);
        let outcome = client().call("Fe", op).await;

        assert!(outcome.is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_returns_rate_limited() {
        let (_, op) = scripted(vec![CallError::status(429, "too many requests")]);
        let outcome = client().call("Fe", op).await;

        assert_eq!(outcome, RetryOutcome::RateLimited(Duration::from_secs(600)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_once_then_success() {
        let (calls, op) = scripted(vec![CallError::status(429, "too many requests")]);
        let (outcome, stats) = client().call_settled("Fe", op).await;

        assert_eq!(outcome, RetryOutcome::Success(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(stats.rate_limit_pauses, 1);
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.elapsed.as_secs(), 600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_pause_does_not_consume_attempts() {
        let limited = CallError::status(429, "too many requests");
        let reset = CallError::connection(ConnectionErrorKind::Reset, "reset");
        // Two failures, a rate limit, then two more failures: five calls
        // would exhaust a budget of three if pauses counted.
        let (calls, op) = scripted(vec![
            reset.clone(),
            reset.clone(),
            limited,
            reset.clone(),
            reset,
        ]);
        let (outcome, stats) = client().call_settled("Fe", op).await;

        assert_eq!(outcome, RetryOutcome::Success(6));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(stats.rate_limit_pauses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_used() {
        let (_, op) = scripted(vec![CallError::status_with_retry_after(
            429,
            "slow down",
            Duration::from_secs(5),
        )]);
        let (outcome, stats) = client().call_settled("Fe", op).await;

        assert!(outcome.is_success());
        assert_eq!(stats.elapsed.as_secs(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_rate_limit_pause() {
        let token = Arc::new(CancellationToken::new());
        let client = RetryingClient::new(policy(), token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            token.cancel("sigint");
        });

        let op = || std::future::ready(Err::<u32, _>(CallError::status(429, "slow down")));
        let (outcome, stats) = client.call_settled("Fe", op).await;
        canceller.await.unwrap();

        assert_eq!(outcome, RetryOutcome::FatalAbort("interrupted: sigint".to_string()));
        assert_eq!(stats.rate_limit_pauses, 1);
        assert!(stats.elapsed < Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_in_flight_call() {
        let token = Arc::new(CancellationToken::new());
        let client = RetryingClient::new(policy(), token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel("shutdown");
        });

        let outcome = client
            .call("Fe", || std::future::pending::<Result<u32, CallError>>())
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome, RetryOutcome::FatalAbort("interrupted: shutdown".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let token = Arc::new(CancellationToken::new());
        token.cancel("stop");
        let client = RetryingClient::new(policy(), token);

        let (calls, op) = scripted(vec![]);
        let outcome = client.call("Fe", op).await;

        assert!(outcome.is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
