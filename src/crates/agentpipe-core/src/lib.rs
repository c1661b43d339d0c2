//! # agentpipe-core - Message-Passing Agent Pipeline Engine
//!
//! **Construct and execute directed graphs of message-passing agents.**
//! Agents consume structured messages from typed input ports and emit on a
//! typed output port; the engine wires them together, drives them under a
//! deterministic round-robin scheduler, tracks provenance across every
//! transformation, and snapshots the whole pipeline so long runs can be
//! interrupted and resumed without loss.
//!
//! ## Overview
//!
//! ```text
//! ┌──────────┐ send ┌────────────────────────┐ deliver ┌──────────┐
//! │  Agent A ├─────▶│ Connection             ├────────▶│  Agent B │
//! │ (output) │      │ transformer? condition │ +parent │ (input)  │
//! └──────────┘      └────────────────────────┘         └──────────┘
//!        ▲                                                   │
//!        └──────────────── Scheduler (round-robin) ──────────┘
//! ```
//!
//! - A seed message is [`feed`](agent::Agent::feed)-ed into some agent's
//!   input port.
//! - The scheduler visits agents in registration order; each visit lets
//!   the agent consume **at most one** message and route its outputs
//!   through the output port's connections.
//! - Every port traversal appends a fresh provenance tag
//!   ([`ParentId`](parent_id::ParentId), wire form `uuid:index:len`), so
//!   downstream aggregators can reassemble split messages without any
//!   coordination with the sender.
//! - [`step_all`](scheduler::Scheduler::step_all) returns at quiescence:
//!   one full round in which every agent reported idle.
//!
//! The engine is **single-threaded cooperative**: sends enqueue
//! synchronously within the current step, never invoke downstream steps,
//! and tolerate cyclic wiring.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use agentpipe_core::agent::{Agent, AgentCore, StepOutput};
//! use agentpipe_core::error::Result;
//! use agentpipe_core::message::Message;
//! use agentpipe_core::scheduler::Scheduler;
//! use serde_json::json;
//!
//! struct Shout { core: AgentCore }
//!
//! impl Agent for Shout {
//!     fn core(&self) -> &AgentCore { &self.core }
//!     fn core_mut(&mut self) -> &mut AgentCore { &mut self.core }
//!     fn run(&mut self, message: Message) -> Result<StepOutput> {
//!         let text = message.as_str().unwrap_or_default().to_uppercase();
//!         Ok(StepOutput::Single(json!(text)))
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let shout = Rc::new(RefCell::new(Shout { core: AgentCore::new("Shout") }));
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.add_agent(shout.clone());
//!
//! shout.borrow_mut().feed(json!("hello"));
//! scheduler.step_all()?;
//!
//! // No connections were attached, so the result sits in the
//! // unconnected-output buffer.
//! let shout = shout.borrow();
//! let out: Vec<_> = shout.core().output().unconnected().collect();
//! assert_eq!(out[0].message, json!("HELLO"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`parent_id`] - provenance tag algebra (`uuid:index:len`)
//! - [`message`] - open JSON messages and provenance-carrying envelopes
//! - [`schema`] - runtime JSON Schema validation for ports
//! - [`port`] - input/output ports, connections, transformers, conditions
//! - [`agent`] - the agent contract and base plumbing
//! - [`scheduler`] - round-robin driver, quiescence, checkpoints, errors
//! - [`printer`] - ASCII and DOT renderings of the wiring graph
//! - [`error`] - [`PipelineError`] taxonomy
//!
//! ## See Also
//!
//! - `agentpipe-checkpoint` - snapshot layout and atomic file I/O
//! - `agentpipe-prebuilt` - aggregation and utility agents

pub mod agent;
pub mod error;
pub mod message;
pub mod parent_id;
pub mod port;
pub mod printer;
pub mod schema;
pub mod scheduler;

pub use agent::{Activity, Agent, AgentCore, StepOutput};
pub use error::{PipelineError, Result, SchemaSide};
pub use message::{Envelope, Message};
pub use parent_id::{
    group_key, longest_common_prefix, sibling_group, ParentId, ParentIdError, Parents,
};
pub use port::{
    Condition, Connection, InputEndpoint, InputPort, OutputPort, Transformer, DEFAULT_INPUT,
    OUTPUT,
};
pub use printer::{render_pipeline, GraphEdge, GraphNode, PipelineGraph};
pub use schema::MessageSchema;
pub use scheduler::{ErrorPolicy, Scheduler, SchedulerConfig, SchedulerError, SharedAgent};

// Snapshot discovery is part of the resume story; re-exported so callers
// rarely need the checkpoint crate directly.
pub use agentpipe_checkpoint::latest_step_dir;
