//! # agentpipe-prebuilt - Ready-Made Pipeline Agents
//!
//! Agents built on `agentpipe-core` that most pipelines end up needing:
//!
//! - **Aggregation** - [`CollectListAgent`] reassembles split messages;
//!   [`JoinAgent`] merges one message per named input port. Both lean on
//!   the provenance algebra: siblings share a batch uuid, groups are keyed
//!   by the provenance prefix, and partial groups persist across
//!   checkpoints as ordinary agent state.
//! - **Plumbing** - [`IdentityAgent`], [`SinkAgent`], [`SequenceAgent`]
//!   and [`FnAgent`] for sources, sinks and quick transforms.
//!
//! ## Split and reassemble
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use agentpipe_core::{Message, Scheduler};
//! use agentpipe_core::agent::Agent;
//! use agentpipe_prebuilt::{CollectListAgent, IdentityAgent};
//! use serde_json::json;
//!
//! # fn main() -> agentpipe_core::Result<()> {
//! let splitter = Rc::new(RefCell::new(IdentityAgent::new()));
//! let collector = Rc::new(RefCell::new(CollectListAgent::new()));
//!
//! // The connection transformer splits the list; the collector's output
//! // provenance makes the split invisible downstream.
//! let target = collector.borrow().core().default_endpoint();
//! splitter.borrow_mut().connect_to(
//!     target,
//!     Some(Box::new(|m: &Message| m.as_array().cloned().unwrap_or_default())),
//!     None,
//! );
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.add_agent(splitter.clone());
//! scheduler.add_agent(collector.clone());
//!
//! splitter.borrow_mut().feed(json!(["a", "b", "c"]));
//! scheduler.step_all()?;
//!
//! let collector = collector.borrow();
//! let out: Vec<_> = collector.core().output().unconnected().collect();
//! assert_eq!(out[0].message, json!(["a", "b", "c"]));
//! # Ok(())
//! # }
//! ```

pub mod agents;

pub use agents::{
    CollectListAgent, Composer, FnAgent, IdentityAgent, JoinAgent, SequenceAgent, SinkAgent,
};
