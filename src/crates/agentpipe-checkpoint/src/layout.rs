//! On-disk snapshot layout
//!
//! A snapshot root contains one directory per checkpoint:
//!
//! ```text
//! <root>/
//!   step_<N>/
//!     scheduler.json        # scheduler cursor, counters, agent order
//!     agents/
//!       <uuid>/
//!         state.json        # versioned agent-specific state
//!         ports/
//!           <port_name>.json  # queue and unconnected buffers
//! ```
//!
//! `<N>` is the scheduler step counter at snapshot time. `scheduler.json`
//! is always written last: a `step_<N>` directory without it is an
//! incomplete snapshot and is skipped by [`latest_step_dir`].

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{CheckpointError, Result};

/// File name of the scheduler state file inside a step directory
pub const SCHEDULER_FILE: &str = "scheduler.json";
/// Directory holding per-agent state inside a step directory
pub const AGENTS_DIR: &str = "agents";
/// File name of the agent state file inside an agent directory
pub const AGENT_STATE_FILE: &str = "state.json";
/// Directory holding per-port files inside an agent directory
pub const PORTS_DIR: &str = "ports";
/// File name of the error report inside an error snapshot directory
pub const ERROR_FILE: &str = "error.json";

const STEP_PREFIX: &str = "step_";

/// Path of the snapshot directory for a given step counter
pub fn step_dir(root: &Path, step: u64) -> PathBuf {
    root.join(format!("{STEP_PREFIX}{step}"))
}

/// Path of the scheduler state file inside a step directory
pub fn scheduler_file(step_dir: &Path) -> PathBuf {
    step_dir.join(SCHEDULER_FILE)
}

/// Path of an agent's directory inside a step directory
pub fn agent_dir(step_dir: &Path, uuid: &Uuid) -> PathBuf {
    step_dir.join(AGENTS_DIR).join(uuid.to_string())
}

/// Path of an agent's state file inside its agent directory
pub fn agent_state_file(agent_dir: &Path) -> PathBuf {
    agent_dir.join(AGENT_STATE_FILE)
}

/// Path of a port file inside an agent directory
pub fn port_file(agent_dir: &Path, port_name: &str) -> PathBuf {
    agent_dir.join(PORTS_DIR).join(format!("{port_name}.json"))
}

/// Path of the error report file inside an error snapshot directory
pub fn error_file(dir: &Path) -> PathBuf {
    dir.join(ERROR_FILE)
}

/// Whether a step directory holds a complete snapshot
///
/// Completeness is defined by the presence of the scheduler state file,
/// which is written last.
pub fn is_complete_step_dir(dir: &Path) -> bool {
    scheduler_file(dir).is_file()
}

/// Parse the step counter out of a `step_<N>` directory name
pub fn parse_step_dir_name(name: &str) -> Option<u64> {
    name.strip_prefix(STEP_PREFIX)?.parse().ok()
}

/// Find the newest complete snapshot under `root`
///
/// Returns the step counter and directory of the `step_<N>` entry with the
/// highest `N` whose scheduler state file is present, or `None` when no
/// complete snapshot exists. Incomplete directories left behind by a crash
/// are ignored.
pub fn latest_step_dir(root: &Path) -> Result<Option<(u64, PathBuf)>> {
    let entries = fs::read_dir(root).map_err(|e| CheckpointError::io(root, e))?;

    let mut best: Option<(u64, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|e| CheckpointError::io(root, e))?;
        let name = entry.file_name();
        let Some(step) = name.to_str().and_then(parse_step_dir_name) else {
            continue;
        };
        let path = entry.path();
        if !is_complete_step_dir(&path) {
            continue;
        }
        if best.as_ref().map_or(true, |(n, _)| step > *n) {
            best = Some((step, path));
        }
    }
    Ok(best)
}
