//! Error types for snapshot persistence
//!
//! All persistence failures surface as [`CheckpointError`]. Save-time errors
//! are treated as non-fatal by the scheduler (the in-memory state stays
//! valid); load-time errors are fatal because a partially restored pipeline
//! cannot be trusted.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience result type using [`CheckpointError`]
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors raised while writing or reading pipeline snapshots
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Filesystem operation failed
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path the operation was performed on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A snapshot directory is missing its scheduler state file
    ///
    /// The scheduler state file is written last, so its absence marks an
    /// incomplete (crashed) snapshot. Such directories must not be loaded.
    #[error("invalid snapshot directory '{0}': scheduler state file not found")]
    InvalidSnapshot(PathBuf),

    /// The agents found in a snapshot do not match the registered agents
    ///
    /// Resume requires the same agent list, by uuid and in the same order,
    /// as was registered when the snapshot was taken.
    #[error("agent mismatch on load: {0}")]
    AgentMismatch(String),

    /// A persisted file uses a snapshot format version this build cannot read
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the file
        found: u32,
        /// Version this build writes
        expected: u32,
    },
}

impl CheckpointError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an agent mismatch error
    pub fn agent_mismatch(detail: impl Into<String>) -> Self {
        Self::AgentMismatch(detail.into())
    }
}
