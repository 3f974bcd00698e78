//! Classified result of a wrapped call.

use std::time::Duration;

/// What a call through the [`RetryingClient`](super::RetryingClient) produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    /// The call succeeded.
    Success(T),
    /// Transient failures exhausted the attempt budget. The key is left
    /// unrecorded so a later run retries it.
    TransientFailure(String),
    /// The service asked us to slow down; pause this long, then call again.
    RateLimited(Duration),
    /// The service rejected this input. The key is recorded with the reason.
    PermanentFailure(String),
    /// Unclassified failure. The run must stop after flushing.
    FatalAbort(String),
}

impl<T> RetryOutcome<T> {
    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for `FatalAbort`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalAbort(_))
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::TransientFailure(_) => "transient_failure",
            Self::RateLimited(_) => "rate_limited",
            Self::PermanentFailure(_) => "permanent_failure",
            Self::FatalAbort(_) => "fatal_abort",
        }
    }

    /// Maps the success value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RetryOutcome<U> {
        match self {
            Self::Success(value) => RetryOutcome::Success(f(value)),
            Self::TransientFailure(reason) => RetryOutcome::TransientFailure(reason),
            Self::RateLimited(pause) => RetryOutcome::RateLimited(pause),
            Self::PermanentFailure(reason) => RetryOutcome::PermanentFailure(reason),
            Self::FatalAbort(reason) => RetryOutcome::FatalAbort(reason),
        }
    }
}

/// Bookkeeping for one settled call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    /// Operation invocations, across all rate-limit rounds.
    pub attempts: u32,
    /// Rate-limit pauses taken.
    pub rate_limit_pauses: u32,
    /// Wall time spent, including pauses.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_map_and_labels() {
        let ok: RetryOutcome<u32> = RetryOutcome::Success(2);
        assert_eq!(ok.clone().map(|v| v * 2), RetryOutcome::Success(4));
        assert_eq!(ok.label(), "success");

        let fatal: RetryOutcome<u32> = RetryOutcome::FatalAbort("boom".into());
        assert!(fatal.is_fatal());
        assert_eq!(
            fatal.map(|v| v.to_string()),
            RetryOutcome::FatalAbort("boom".into())
        );
    }
}
