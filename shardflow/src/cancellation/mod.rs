//! Cooperative cancellation for runs.
//!
//! This module provides:
//! - `CancellationToken`, shared by the driver, the client and signal handlers
//! - `sleep_or_cancel`, an interruptible sleep used for backoff and pauses

mod token;

pub use token::{sleep_or_cancel, CancellationToken, Interrupted};
