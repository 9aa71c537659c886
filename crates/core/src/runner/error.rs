//! Error types for the runner module.

use std::path::PathBuf;
use thiserror::Error;

use crate::cache::CacheError;

/// Errors that can occur while preparing or running a build.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// No downloadable archive is published for this target.
    #[error("unsupported target: {target}")]
    UnsupportedTarget { target: String },

    /// Download of the archive or checksum list failed.
    #[error("download failed: {0}")]
    Download(#[from] CacheError),

    /// The checksum list has no entry for the archive.
    #[error("no checksum published for {file}")]
    ChecksumMissing { file: String },

    /// The archive does not match its published checksum.
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// Extracting the binary from the archive failed.
    #[error("failed to extract {member} from {archive}: {reason}")]
    ExtractionFailed {
        archive: PathBuf,
        member: String,
        reason: String,
    },

    /// The test command could not be started.
    #[error("failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The test command did not finish in time.
    #[error("test command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    pub fn extraction_failed(
        archive: impl Into<PathBuf>,
        member: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ExtractionFailed {
            archive: archive.into(),
            member: member.into(),
            reason: reason.into(),
        }
    }
}
