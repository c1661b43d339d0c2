//! Atomic JSON file I/O
//!
//! Every persisted file is written through [`write_json_atomic`]: the value
//! is serialized into a temporary file in the target directory and then
//! renamed into place. A reader therefore never observes a half-written
//! file; a crash leaves either the old content or a stray temp file that
//! later snapshots ignore.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{CheckpointError, Result};

/// Serialize `value` as pretty JSON and atomically move it to `path`
///
/// Parent directories are created as needed. The temp file is created in
/// the same directory as `path` so the final rename stays on one
/// filesystem.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| CheckpointError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CheckpointError::io(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush().map_err(|e| CheckpointError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| CheckpointError::io(path, e.error))?;

    tracing::debug!(path = %path.display(), "wrote snapshot file");
    Ok(())
}

/// Read and deserialize a JSON file written by [`write_json_atomic`]
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| CheckpointError::io(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}
