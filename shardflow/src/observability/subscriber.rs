//! Global `tracing` subscriber setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::errors::ShardflowError;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, compact lines on stderr.
    #[default]
    Pretty,
    /// One JSON object per event on stderr.
    Json,
}

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise `default_directive`
/// (for example `"info"` or `"shardflow=debug"`). Fails if a global
/// subscriber is already installed.
pub fn init_tracing(format: LogFormat, default_directive: &str) -> Result<(), ShardflowError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| ShardflowError::Config(format!("invalid log filter: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init(),
    };

    result.map_err(|e| ShardflowError::Config(format!("failed to install subscriber: {e}")))
}
