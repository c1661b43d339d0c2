//! Message and envelope types
//!
//! Messages are open JSON values; agents that want stricter shapes attach a
//! [`MessageSchema`](crate::schema::MessageSchema) to their ports. An
//! [`Envelope`] pairs a message with its provenance and is the unit stored
//! in port queues and persisted in snapshots.

use serde::{Deserialize, Serialize};

use agentpipe_checkpoint::EnvelopeRecord;

use crate::error::Result;
use crate::parent_id::{ParentId, Parents};

/// An opaque structured message
///
/// `Value::Null` by convention for agents that take no input.
pub type Message = serde_json::Value;

/// A message together with its provenance tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Provenance tags, one per port traversal, oldest first
    pub parents: Parents,
    /// The message payload
    pub message: Message,
}

impl Envelope {
    /// Wrap a message with the given provenance
    pub fn new(parents: Parents, message: Message) -> Self {
        Self { parents, message }
    }

    /// Wrap a freshly fed message with empty provenance
    pub fn seed(message: Message) -> Self {
        Self {
            parents: Vec::new(),
            message,
        }
    }

    /// Convert to the persisted wire shape
    pub fn to_record(&self) -> EnvelopeRecord {
        EnvelopeRecord {
            parents: self.parents.iter().map(ParentId::to_string).collect(),
            message: self.message.clone(),
        }
    }

    /// Rebuild from the persisted wire shape
    ///
    /// A malformed provenance tag is fatal ([`ParentIdError`]
    /// (crate::parent_id::ParentIdError) via [`PipelineError`]
    /// (crate::error::PipelineError)).
    pub fn from_record(record: EnvelopeRecord) -> Result<Self> {
        let parents = record
            .parents
            .iter()
            .map(|s| s.parse::<ParentId>())
            .collect::<std::result::Result<Parents, _>>()?;
        Ok(Self {
            parents,
            message: record.message,
        })
    }
}
