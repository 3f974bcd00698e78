//! Error types for shardflow runs.
//!
//! Only usage errors, fatal aborts and cancellations surface as run failures.
//! Transient and permanent per-key failures are absorbed by the driver and
//! reported through the run summary instead.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for shardflow operations.
#[derive(Debug, Error)]
pub enum ShardflowError {
    /// Invalid invocation, detected before any I/O.
    #[error("{0}")]
    Usage(#[from] UsageError),

    /// Reading or writing a checkpoint table failed.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// An unclassified failure that ends the run.
    #[error("Fatal error while processing '{key}': {reason}")]
    FatalAbort {
        /// The work key being processed.
        key: String,
        /// Description of the failure.
        reason: String,
    },

    /// The diagram engine failed.
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// The run was interrupted.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShardflowError {
    /// Creates a fatal abort for a key.
    #[must_use]
    pub fn fatal(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FatalAbort {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Process exit status for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
            _ => 1,
        }
    }

    /// Returns true if the error is a usage error.
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

/// Error raised for invalid arguments or missing required inputs.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Usage error: {message}")]
pub struct UsageError {
    /// The error message.
    pub message: String,
    /// Hint for fixing the invocation.
    pub fix_hint: Option<String>,
}

impl UsageError {
    /// Creates a new usage error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// Errors reading or writing checkpoint tables.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The table could not be opened or decompressed.
    #[error("Failed to read table '{}': {source}", path.display())]
    Read {
        /// Table path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The table is not valid CSV.
    #[error("Malformed table '{}': {source}", path.display())]
    Malformed {
        /// Table path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: csv::Error,
    },

    /// A non-empty table lacks the key column.
    #[error("Table '{}' has no '{column}' column", path.display())]
    MissingKeyColumn {
        /// Table path.
        path: PathBuf,
        /// The expected key column.
        column: String,
    },

    /// Writing the merged table failed.
    #[error("Failed to write table '{}': {source}", path.display())]
    Write {
        /// Table path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl CheckpointError {
    /// Returns the table path involved.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Read { path, .. }
            | Self::Malformed { path, .. }
            | Self::MissingKeyColumn { path, .. }
            | Self::Write { path, .. } => path,
        }
    }
}

/// Error raised by a diagram engine.
#[derive(Debug, Clone, Error)]
#[error("Diagram engine error: {message}")]
pub struct EngineError {
    /// The error message.
    pub message: String,
}

impl EngineError {
    /// Creates a new engine error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_serializes_hint() {
        let err = UsageError::new("bad shard arguments").with_fix_hint("pass both flags");
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["message"], "bad shard arguments");
        assert_eq!(json["fix_hint"], "pass both flags");
        assert_eq!(err.to_string(), "Usage error: bad shard arguments");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ShardflowError::from(UsageError::new("x")).exit_code(), 2);
        assert_eq!(ShardflowError::Cancelled("sigint".into()).exit_code(), 130);
        assert_eq!(ShardflowError::fatal("Fe", "boom").exit_code(), 1);
    }

    #[test]
    fn test_fatal_abort_display() {
        let err = ShardflowError::fatal("Fe-Zn", "unexpected payload");
        assert_eq!(
            err.to_string(),
            "Fatal error while processing 'Fe-Zn': unexpected payload"
        );
    }

    #[test]
    fn test_checkpoint_error_path() {
        let err = CheckpointError::MissingKeyColumn {
            path: PathBuf::from("out.csv.gz"),
            column: "symbols".to_string(),
        };
        assert_eq!(err.path(), std::path::Path::new("out.csv.gz"));
        assert!(err.to_string().contains("'symbols'"));
    }
}
