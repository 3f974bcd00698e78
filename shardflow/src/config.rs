//! Run configuration, read from a JSON file.
//!
//! Every field has a default, so `{}` is a valid configuration. The entries
//! directory is relative to `output_dir`; the compositions path is taken as
//! given.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::client::RetryPolicy;
#[cfg(feature = "http")]
use crate::domain::HttpCatalogConfig;
use crate::domain::INTEGER_TOLERANCE;
use crate::errors::ShardflowError;

/// Configuration shared by all jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory holding the output tables.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Key column of every output table.
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Column holding permanent failure reasons.
    #[serde(default = "default_error_column")]
    pub error_column: String,
    /// Entry download job settings.
    #[serde(default)]
    pub download: DownloadConfig,
    /// Decomposition job settings.
    #[serde(default)]
    pub decomposition: DecompositionConfig,
    /// Retry policy for remote calls.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Remote catalog connection.
    #[cfg(feature = "http")]
    #[serde(default)]
    pub catalog: HttpCatalogConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_key_column() -> String {
    "symbols".to_string()
}

fn default_error_column() -> String {
    "error".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            key_column: default_key_column(),
            error_column: default_error_column(),
            download: DownloadConfig::default(),
            decomposition: DecompositionConfig::default(),
            retry: RetryPolicy::default(),
            #[cfg(feature = "http")]
            catalog: HttpCatalogConfig::default(),
        }
    }
}

impl RunConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and validates a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ShardflowError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ShardflowError::Config(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(text: &str) -> Result<Self, ShardflowError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ShardflowError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot.
    pub fn validate(&self) -> Result<(), ShardflowError> {
        if self.key_column.is_empty() {
            return Err(ShardflowError::Config("key_column must not be empty".into()));
        }
        if self.key_column == self.error_column {
            return Err(ShardflowError::Config(
                "key_column and error_column must differ".into(),
            ));
        }
        self.retry.validate().map_err(ShardflowError::Config)?;
        if !(self.decomposition.integer_tolerance >= 0.0) {
            return Err(ShardflowError::Config(
                "decomposition.integer_tolerance must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Directory where downloaded entry files are written.
    #[must_use]
    pub fn entries_dir(&self) -> PathBuf {
        self.output_dir.join(&self.download.entries_dir)
    }
}

/// Settings for the entry download job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// `material_id,element` table the work set is derived from.
    #[serde(default = "default_compositions")]
    pub compositions: PathBuf,
    /// Stem of the download table name.
    #[serde(default = "default_download_stem")]
    pub table_stem: String,
    /// Entry file directory, relative to `output_dir`.
    #[serde(default = "default_entries_dir")]
    pub entries_dir: PathBuf,
}

fn default_compositions() -> PathBuf {
    PathBuf::from("compositions.csv.gz")
}

fn default_download_stem() -> String {
    "pourbaix_downloads".to_string()
}

fn default_entries_dir() -> PathBuf {
    PathBuf::from("pourbaix_entries")
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            compositions: default_compositions(),
            table_stem: default_download_stem(),
            entries_dir: default_entries_dir(),
        }
    }
}

/// Settings for the decomposition job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionConfig {
    /// Stem of the per-entry results table.
    #[serde(default = "default_data_stem")]
    pub data_stem: String,
    /// Stem of the diagram construction table.
    #[serde(default = "default_diagram_stem")]
    pub diagram_stem: String,
    /// Largest distance from an integer accepted for composition amounts.
    #[serde(default = "default_integer_tolerance")]
    pub integer_tolerance: f64,
}

fn default_data_stem() -> String {
    "pourbaix_data".to_string()
}

fn default_diagram_stem() -> String {
    "pourbaix_diagrams".to_string()
}

fn default_integer_tolerance() -> f64 {
    INTEGER_TOLERANCE
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            data_stem: default_data_stem(),
            diagram_stem: default_diagram_stem(),
            integer_tolerance: default_integer_tolerance(),
        }
    }
}
