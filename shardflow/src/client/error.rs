//! Failures reported by a wrapped call, before classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Kinds of network failure that are worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionErrorKind {
    /// The connection was reset or dropped.
    Reset,
    /// The connection could not be established.
    Refused,
    /// The peer violated the protocol.
    Protocol,
    /// The request timed out.
    Timeout,
    /// The response body ended early.
    TruncatedRead,
    /// A chunked response could not be decoded.
    ChunkedEncoding,
    /// A lower transport layer exhausted its own retries.
    RetriesExhausted,
}

impl ConnectionErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Reset,
        Self::Refused,
        Self::Protocol,
        Self::Timeout,
        Self::TruncatedRead,
        Self::ChunkedEncoding,
        Self::RetriesExhausted,
    ];
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => write!(f, "reset"),
            Self::Refused => write!(f, "refused"),
            Self::Protocol => write!(f, "protocol"),
            Self::Timeout => write!(f, "timeout"),
            Self::TruncatedRead => write!(f, "truncated_read"),
            Self::ChunkedEncoding => write!(f, "chunked_encoding"),
            Self::RetriesExhausted => write!(f, "retries_exhausted"),
        }
    }
}

/// A failed call, as reported by the remote service adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The service answered with an error status.
    #[error("HTTP status {code}: {message}")]
    Status {
        /// Status code.
        code: u16,
        /// Response message.
        message: String,
        /// Server-provided pause hint.
        retry_after: Option<Duration>,
    },

    /// The transport failed.
    #[error("Connection error ({kind}): {message}")]
    Connection {
        /// What went wrong.
        kind: ConnectionErrorKind,
        /// Description.
        message: String,
    },

    /// The service rejected this particular input as unsupported.
    #[error("Input rejected: {0}")]
    Rejected(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl CallError {
    /// Creates a status error.
    #[must_use]
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Creates a status error carrying a pause hint.
    #[must_use]
    pub fn status_with_retry_after(code: u16, message: impl Into<String>, retry_after: Duration) -> Self {
        Self::Status {
            code,
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self::Connection {
            kind,
            message: message.into(),
        }
    }

    /// Creates an input rejection.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Creates an unclassified error.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<std::io::Error> for CallError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                Self::connection(ConnectionErrorKind::Reset, err.to_string())
            }
            ErrorKind::ConnectionRefused => {
                Self::connection(ConnectionErrorKind::Refused, err.to_string())
            }
            ErrorKind::TimedOut => Self::connection(ConnectionErrorKind::Timeout, err.to_string()),
            ErrorKind::UnexpectedEof => {
                Self::connection(ConnectionErrorKind::TruncatedRead, err.to_string())
            }
            _ => Self::other(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            CallError::status(503, "unavailable").to_string(),
            "HTTP status 503: unavailable"
        );
        assert_eq!(
            CallError::connection(ConnectionErrorKind::TruncatedRead, "eof").to_string(),
            "Connection error (truncated_read): eof"
        );
    }

    #[test]
    fn test_from_io_error() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(matches!(
            CallError::from(reset),
            CallError::Connection {
                kind: ConnectionErrorKind::Reset,
                ..
            }
        ));

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert!(matches!(CallError::from(missing), CallError::Other(_)));
    }
}
