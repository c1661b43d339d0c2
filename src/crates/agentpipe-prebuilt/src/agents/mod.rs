//! Ready-made agents

pub mod collect_list;
pub mod join;
pub mod util;

pub use collect_list::{CollectListAgent, Composer};
pub use join::JoinAgent;
pub use util::{FnAgent, IdentityAgent, SequenceAgent, SinkAgent};
