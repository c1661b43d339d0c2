//! # agentpipe-checkpoint - Snapshot Persistence for Agent Pipelines
//!
//! **On-disk snapshot layout and atomic file I/O** for the agentpipe engine.
//! A snapshot captures everything a pipeline needs to resume after an
//! interruption: the scheduler's cursor and counters, every agent's explicit
//! state, and the full contents of every port queue.
//!
//! ## Overview
//!
//! Snapshots enable:
//!
//! - **Crash recovery** - Resume a long-running pipeline from the last
//!   completed step instead of restarting
//! - **Error forensics** - A failing step can be frozen to disk together
//!   with the offending message
//! - **Deterministic replay** - Running to step `k`, snapshotting, loading
//!   and running to step `n` yields the same state as an uninterrupted run
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   step_<N>/
//!     scheduler.json          # {agent_idx, step_counter, all_done_counter, order, ...}
//!     agents/
//!       <uuid>/
//!         state.json          # {version, uuid, kind, state}
//!         ports/
//!           <port_name>.json  # {queue: [...], unconnected: [...]}
//! ```
//!
//! Every file is written temp-then-rename ([`write_json_atomic`]), and the
//! scheduler state file is written last, so a `step_<N>` directory is a
//! valid snapshot exactly when `scheduler.json` is present
//! ([`is_complete_step_dir`]). Error snapshots use the same layout plus an
//! [`ErrorReport`] in `error.json`.
//!
//! ## Module Organization
//!
//! - [`snapshot`] - serde shapes of the persisted files
//! - [`layout`] - path construction and snapshot discovery
//! - [`fs`] - atomic JSON read/write helpers
//! - [`error`] - [`CheckpointError`]
//!
//! ## See Also
//!
//! - `agentpipe-core` - the engine that drives snapshotting from its
//!   scheduler

pub mod error;
pub mod fs;
pub mod layout;
pub mod snapshot;

pub use error::{CheckpointError, Result};
pub use fs::{read_json, write_json_atomic};
pub use layout::{
    agent_dir, agent_state_file, error_file, is_complete_step_dir, latest_step_dir,
    parse_step_dir_name, port_file, scheduler_file, step_dir,
};
pub use snapshot::{
    AgentStateFile, EnvelopeRecord, ErrorReport, PortSnapshot, SchedulerSnapshot, SNAPSHOT_VERSION,
};
