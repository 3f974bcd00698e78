//! Wall-clock timing of builds and lookups.

use std::time::{Duration, Instant};

/// Measures how long a named operation takes.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Time since the timer started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span, logs it at trace level and returns the duration.
    #[must_use]
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::trace!(span = %self.name, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "Span finished");
        elapsed
    }
}
