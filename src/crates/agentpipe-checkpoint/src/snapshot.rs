//! Persisted snapshot types
//!
//! These are the serde shapes of the files a snapshot is made of:
//!
//! - [`SchedulerSnapshot`] — `scheduler.json`, the cursor, counters and
//!   registered agent order
//! - [`AgentStateFile`] — `agents/<uuid>/state.json`, the agent's explicit,
//!   versioned state
//! - [`PortSnapshot`] — `agents/<uuid>/ports/<name>.json`, a port's queue
//!   and unconnected buffers
//! - [`ErrorReport`] — `error.json` inside an error snapshot
//!
//! Provenance tags are persisted in their wire form (`uuid:index:len`
//! strings) so port files stay readable without the engine crate. Each file
//! carries an explicit format version; readers reject versions they do not
//! understand instead of guessing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CheckpointError, Result};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// A queued `(parents, message)` pair in wire form
///
/// `parents` holds provenance tags as `uuid:index:len` strings, oldest
/// first. The engine converts these back into typed tags on load and
/// treats malformed tags as fatal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeRecord {
    /// Provenance tags, oldest first
    pub parents: Vec<String>,
    /// Message payload
    pub message: serde_json::Value,
}

/// Contents of `scheduler.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Snapshot format version
    pub version: u32,
    /// Time the snapshot was taken
    pub ts: DateTime<Utc>,
    /// Round-robin cursor into the agent list
    pub agent_idx: usize,
    /// Total single-step calls performed
    pub step_counter: u64,
    /// Consecutive idle single-step calls
    pub all_done_counter: usize,
    /// Registered agent uuids, in registration order
    pub order: Vec<Uuid>,
}

impl SchedulerSnapshot {
    /// Create a snapshot of the given scheduler counters, stamped now
    pub fn new(agent_idx: usize, step_counter: u64, all_done_counter: usize, order: Vec<Uuid>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            ts: Utc::now(),
            agent_idx,
            step_counter,
            all_done_counter,
            order,
        }
    }

    /// Reject snapshots written by an incompatible format version
    pub fn check_version(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }
}

/// Contents of an agent's `state.json`
///
/// Agent state is explicit and versioned: each agent decides what goes in
/// `state` and bumps `version` when its shape changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStateFile {
    /// Agent-defined state schema version
    pub version: u32,
    /// Uuid of the agent this state belongs to
    pub uuid: Uuid,
    /// Agent kind, for human inspection of snapshots
    pub kind: String,
    /// Agent-specific state
    pub state: serde_json::Value,
}

/// Contents of a `ports/<name>.json` file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSnapshot {
    /// Pending input envelopes, front of the queue first
    #[serde(default)]
    pub queue: Vec<EnvelopeRecord>,
    /// Envelopes sent on an output port with no connections
    #[serde(default)]
    pub unconnected: Vec<EnvelopeRecord>,
}

/// Contents of `error.json` in an error snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Time the failure was captured
    pub ts: DateTime<Utc>,
    /// Uuid of the failing agent
    pub agent_uuid: Uuid,
    /// Kind of the failing agent
    pub agent_kind: String,
    /// Scheduler step counter when the failure occurred
    pub step: u64,
    /// Error category (e.g. "schema", "agent")
    pub kind: String,
    /// Rendered error message
    pub message: String,
    /// The envelope that triggered the failure, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offending: Option<EnvelopeRecord>,
}
