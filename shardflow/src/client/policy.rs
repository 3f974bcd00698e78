//! Retry policy and failure classification.
//!
//! The policy decides, for each failed call, whether to back off and retry,
//! pause for a rate limit, record a permanent failure, or abort the run.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::error::{CallError, ConnectionErrorKind};

/// Jitter applied to backoff delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Exact delays.
    #[default]
    None,
    /// Random from 0 to delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

/// How a failed call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Back off and retry within the attempt budget.
    Transient,
    /// Pause for the given duration, then start over.
    RateLimited(Duration),
    /// Record the key as failed; never retry it.
    Permanent,
    /// Abort the run.
    Fatal,
}

/// Configuration for the retry-classifying client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_seconds: f64,
    /// Multiplier applied to the delay for each further attempt.
    #[serde(default = "default_backoff_growth")]
    pub backoff_growth: f64,
    /// Cap on a single backoff delay, in seconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: f64,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Pause after a rate-limit response without a server hint, in seconds.
    #[serde(default = "default_rate_limit_pause")]
    pub rate_limit_pause_seconds: f64,
    /// Status code reserved for rate limiting.
    #[serde(default = "default_rate_limit_status")]
    pub rate_limit_status: u16,
    /// Status codes that are retried with backoff.
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: HashSet<u16>,
    /// Status codes meaning the input itself is unsupported.
    #[serde(default = "default_rejected_status_codes")]
    pub rejected_status_codes: HashSet<u16>,
    /// Connection failures that are retried with backoff.
    #[serde(default = "default_connection_error_kinds")]
    pub connection_error_kinds: HashSet<ConnectionErrorKind>,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_backoff_base() -> f64 {
    30.0
}

fn default_backoff_growth() -> f64 {
    1.0
}

fn default_max_backoff() -> f64 {
    600.0
}

fn default_rate_limit_pause() -> f64 {
    600.0
}

fn default_rate_limit_status() -> u16 {
    429
}

fn default_retryable_status_codes() -> HashSet<u16> {
    // 530 is an upstream DNS failure at the CDN.
    [500, 502, 503, 504, 530].into_iter().collect()
}

fn default_rejected_status_codes() -> HashSet<u16> {
    [422].into_iter().collect()
}

fn default_connection_error_kinds() -> HashSet<ConnectionErrorKind> {
    ConnectionErrorKind::ALL.into_iter().collect()
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_seconds: default_backoff_base(),
            backoff_growth: default_backoff_growth(),
            max_backoff_seconds: default_max_backoff(),
            jitter: JitterStrategy::default(),
            rate_limit_pause_seconds: default_rate_limit_pause(),
            rate_limit_status: default_rate_limit_status(),
            retryable_status_codes: default_retryable_status_codes(),
            rejected_status_codes: default_rejected_status_codes(),
            connection_error_kinds: default_connection_error_kinds(),
        }
    }
}

/// Converts float seconds, saturating instead of panicking.
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    }
}

impl RetryPolicy {
    /// Creates a policy with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base backoff.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base_seconds = base.as_secs_f64();
        self
    }

    /// Sets the backoff growth multiplier.
    #[must_use]
    pub fn with_backoff_growth(mut self, growth: f64) -> Self {
        self.backoff_growth = growth;
        self
    }

    /// Sets the backoff cap.
    #[must_use]
    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff_seconds = max.as_secs_f64();
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the default rate-limit pause.
    #[must_use]
    pub fn with_rate_limit_pause(mut self, pause: Duration) -> Self {
        self.rate_limit_pause_seconds = pause.as_secs_f64();
        self
    }

    /// Adds a status code that marks the input as unsupported.
    #[must_use]
    pub fn with_rejected_status(mut self, code: u16) -> Self {
        self.rejected_status_codes.insert(code);
        self
    }

    /// Default rate-limit pause as a duration.
    #[must_use]
    pub fn rate_limit_pause(&self) -> Duration {
        seconds(self.rate_limit_pause_seconds)
    }

    /// Rejects delays that cannot be represented as a [`Duration`].
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".into());
        }
        for (name, value) in [
            ("backoff_base_seconds", self.backoff_base_seconds),
            ("max_backoff_seconds", self.max_backoff_seconds),
            ("rate_limit_pause_seconds", self.rate_limit_pause_seconds),
        ] {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(format!(
                    "retry.{name} must be a non-negative number of seconds that fits a duration, got {value}"
                ));
            }
        }
        if !self.backoff_growth.is_finite() || self.backoff_growth < 0.0 {
            return Err(format!(
                "retry.backoff_growth must be a non-negative number, got {}",
                self.backoff_growth
            ));
        }
        Ok(())
    }

    /// Backoff before retrying after failed attempt `attempt` (1-based):
    /// `base * growth^(attempt - 1)`, capped and jittered.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.backoff_base_seconds * self.backoff_growth.powi(exponent);
        let capped = if raw.is_finite() {
            raw.min(self.max_backoff_seconds).max(0.0)
        } else {
            self.max_backoff_seconds.max(0.0)
        };

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => {
                if capped <= 0.0 {
                    0.0
                } else {
                    rand::thread_rng().gen_range(0.0..=capped)
                }
            }
            JitterStrategy::Equal => {
                let half = capped / 2.0;
                if half <= 0.0 {
                    capped
                } else {
                    half + rand::thread_rng().gen_range(0.0..=half)
                }
            }
        };

        seconds(jittered)
    }

    /// Classifies a failed call.
    #[must_use]
    pub fn classify(&self, error: &CallError) -> FailureClass {
        match error {
            CallError::Status {
                code, retry_after, ..
            } => {
                if *code == self.rate_limit_status {
                    FailureClass::RateLimited(retry_after.unwrap_or_else(|| self.rate_limit_pause()))
                } else if self.retryable_status_codes.contains(code) {
                    FailureClass::Transient
                } else if self.rejected_status_codes.contains(code) {
                    FailureClass::Permanent
                } else {
                    FailureClass::Fatal
                }
            }
            CallError::Connection { kind, .. } => {
                if self.connection_error_kinds.contains(kind) {
                    FailureClass::Transient
                } else {
                    FailureClass::Fatal
                }
            }
            CallError::Rejected(_) => FailureClass::Permanent,
            CallError::Other(_) => FailureClass::Fatal,
        }
    }
}
