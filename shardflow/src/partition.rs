//! Deterministic hash-based sharding of work keys.
//!
//! A key belongs to exactly one of `total_jobs` shards: the MD5 digest of its
//! UTF-8 bytes, read as a big-endian 128-bit integer, modulo `total_jobs`.
//! Independent processes started with the same `total_jobs` therefore agree on
//! ownership without coordinating.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::UsageError;

/// Returns the shard index in `[0, total_jobs)` that owns `key`.
///
/// # Panics
///
/// Panics if `total_jobs` is zero. Validated assignments never pass zero.
#[must_use]
pub fn assign(key: &str, total_jobs: u32) -> u32 {
    assert!(total_jobs > 0, "total_jobs must be positive");
    let digest = Md5::digest(key.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    let value = u128::from_be_bytes(bytes);
    // The remainder is below total_jobs, which fits in u32.
    (value % u128::from(total_jobs)) as u32
}

/// Which slice of the work set this process handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobAssignment {
    /// Process every key.
    #[default]
    Unsharded,
    /// Process keys whose shard is `job_number` out of `total_jobs`.
    Shard {
        /// Zero-based shard index.
        job_number: u32,
        /// Number of cooperating shards.
        total_jobs: u32,
    },
}

impl JobAssignment {
    /// Creates a validated shard assignment.
    pub fn shard(job_number: u32, total_jobs: u32) -> Result<Self, UsageError> {
        if total_jobs == 0 {
            return Err(UsageError::new("total number of jobs must be at least 1"));
        }
        if job_number >= total_jobs {
            return Err(UsageError::new(format!(
                "job number {job_number} is out of range for {total_jobs} jobs"
            ))
            .with_fix_hint(format!("use a job number in [0, {}]", total_jobs - 1)));
        }
        Ok(Self::Shard {
            job_number,
            total_jobs,
        })
    }

    /// Builds an assignment from optional invocation arguments.
    ///
    /// Both or neither must be given.
    pub fn from_args(job_number: Option<u32>, total_jobs: Option<u32>) -> Result<Self, UsageError> {
        match (job_number, total_jobs) {
            (None, None) => Ok(Self::Unsharded),
            (Some(job), Some(total)) => Self::shard(job, total),
            _ => Err(UsageError::new(
                "a job number and a total number of jobs must be given together",
            )
            .with_fix_hint("pass both --job-number and --njobs, or neither")),
        }
    }

    /// Returns true if this process owns `key`.
    ///
    /// An out-of-range shard built without [`JobAssignment::shard`] owns
    /// nothing.
    #[must_use]
    pub fn is_mine(&self, key: &str) -> bool {
        match *self {
            Self::Unsharded => true,
            Self::Shard {
                job_number,
                total_jobs,
            } => job_number < total_jobs && assign(key, total_jobs) == job_number,
        }
    }

    /// Returns the job number, if sharded.
    #[must_use]
    pub fn job_number(&self) -> Option<u32> {
        match *self {
            Self::Unsharded => None,
            Self::Shard { job_number, .. } => Some(job_number),
        }
    }

    /// Returns true if sharding is enabled.
    #[must_use]
    pub fn is_sharded(&self) -> bool {
        matches!(self, Self::Shard { .. })
    }

    /// File name suffix for this shard's outputs: empty or `_{job_number}`.
    #[must_use]
    pub fn file_suffix(&self) -> String {
        self.job_number()
            .map(|job| format!("_{job}"))
            .unwrap_or_default()
    }
}

impl fmt::Display for JobAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsharded => write!(f, "all keys"),
            Self::Shard {
                job_number,
                total_jobs,
            } => write!(f, "job {job_number} of {total_jobs}"),
        }
    }
}

/// Free-function form of [`JobAssignment::is_mine`].
#[must_use]
pub fn is_mine(key: &str, assignment: &JobAssignment) -> bool {
    assignment.is_mine(key)
}
