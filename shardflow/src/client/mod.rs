//! Retry-classifying client for an unreliable, rate-limited remote service.
//!
//! A failed call is classified by [`RetryPolicy::classify`] into one of four
//! classes, each handled differently:
//!
//! - transient: back off and retry, up to `max_attempts`
//! - rate limited: pause for a long time, not counted against attempts
//! - permanent: the input is unsupported, record it and move on
//! - fatal: abort the run

mod error;
mod outcome;
mod policy;
mod retrying;

pub use error::{CallError, ConnectionErrorKind};
pub use outcome::{CallStats, RetryOutcome};
pub use policy::{FailureClass, JitterStrategy, RetryPolicy};
pub use retrying::RetryingClient;
