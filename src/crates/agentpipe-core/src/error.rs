//! Error types for pipeline construction and execution
//!
//! All engine errors are [`PipelineError`] variants, built with `thiserror`.
//! The taxonomy follows the failure surfaces of the engine:
//!
//! ```text
//! PipelineError
//! ├── Schema        - input/output failed schema validation
//! ├── InvalidSchema - a schema document itself does not compile
//! ├── Agent         - an agent's process/run failed
//! ├── Wiring        - connection refused at wiring time
//! ├── Checkpoint    - snapshot write/load failures
//! ├── ParentId      - malformed provenance tag (fatal)
//! ├── Scheduler     - a captured agent failure, with context
//! ├── Serialization - JSON errors
//! └── Io            - filesystem errors
//! ```
//!
//! Errors are never silently swallowed: the scheduler either returns them
//! or records them on its error list, and the envelope that triggered a
//! failure travels with the error so it can be persisted for forensics.

use thiserror::Error;

use crate::message::Envelope;
use crate::parent_id::ParentIdError;
use crate::scheduler::SchedulerError;

/// Convenience result type using [`PipelineError`]
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Which side of an agent a schema failure occurred on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSide {
    /// The message popped from an input port
    Input,
    /// A message the agent produced
    Output,
}

impl std::fmt::Display for SchemaSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaSide::Input => write!(f, "input"),
            SchemaSide::Output => write!(f, "output"),
        }
    }
}

/// Error type for all pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A message failed validation against a declared schema
    ///
    /// The offending message is not re-queued; it travels with the error
    /// for reporting instead.
    #[error("{side} message failed schema validation in agent '{agent}': {detail}")]
    Schema {
        /// Kind of the agent the message belonged to
        agent: String,
        /// Input or output side
        side: SchemaSide,
        /// Validator diagnostics
        detail: String,
        /// The rejected envelope, when available
        offending: Option<Box<Envelope>>,
    },

    /// A schema document does not compile
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// An agent's `process`/`run` failed
    #[error("agent '{agent}' execution failed: {detail}")]
    Agent {
        /// Kind of the failing agent
        agent: String,
        /// Error description
        detail: String,
        /// The envelope being processed, when available
        offending: Option<Box<Envelope>>,
    },

    /// A connection was refused at wiring time
    ///
    /// Raised synchronously by the wiring API; never reaches the
    /// scheduler.
    #[error("wiring error: {0}")]
    Wiring(String),

    /// Snapshot persistence failed
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] agentpipe_checkpoint::CheckpointError),

    /// A malformed provenance tag was encountered
    #[error("parent id error: {0}")]
    ParentId(#[from] ParentIdError),

    /// An agent failure captured by the scheduler, with step context
    #[error(transparent)]
    Scheduler(Box<SchedulerError>),

    /// JSON serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create an agent execution error
    pub fn agent(agent: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Agent {
            agent: agent.into(),
            detail: detail.into(),
            offending: None,
        }
    }

    /// Create a schema validation error
    pub fn schema(agent: impl Into<String>, side: SchemaSide, detail: impl Into<String>) -> Self {
        Self::Schema {
            agent: agent.into(),
            side,
            detail: detail.into(),
            offending: None,
        }
    }

    /// Create a wiring error
    pub fn wiring(detail: impl Into<String>) -> Self {
        Self::Wiring(detail.into())
    }

    /// Attach the envelope that triggered this error, if the variant
    /// carries one and none is attached yet
    pub fn with_offending(mut self, envelope: &Envelope) -> Self {
        match &mut self {
            Self::Schema { offending, .. } | Self::Agent { offending, .. } => {
                if offending.is_none() {
                    *offending = Some(Box::new(envelope.clone()));
                }
            }
            _ => {}
        }
        self
    }

    /// The envelope that triggered this error, when recorded
    pub fn offending(&self) -> Option<&Envelope> {
        match self {
            Self::Schema { offending, .. } | Self::Agent { offending, .. } => {
                offending.as_deref()
            }
            Self::Scheduler(err) => err.offending.as_ref(),
            _ => None,
        }
    }

    /// Short category label used in error reports
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Schema { .. } | Self::InvalidSchema(_) => "schema",
            Self::Agent { .. } => "agent",
            Self::Wiring(_) => "wiring",
            Self::Checkpoint(_) => "checkpoint",
            Self::ParentId(_) => "parent_id",
            Self::Scheduler(_) => "scheduler",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

impl From<SchedulerError> for PipelineError {
    fn from(err: SchedulerError) -> Self {
        Self::Scheduler(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_offending_attaches_once() {
        let first = Envelope::seed(json!(1));
        let second = Envelope::seed(json!(2));

        let err = PipelineError::agent("TestAgent", "boom")
            .with_offending(&first)
            .with_offending(&second);

        assert_eq!(err.offending().unwrap().message, json!(1));
    }

    #[test]
    fn test_with_offending_ignores_other_variants() {
        let env = Envelope::seed(json!(1));
        let err = PipelineError::wiring("bad").with_offending(&env);
        assert!(err.offending().is_none());
    }

    #[test]
    fn test_display_includes_context() {
        let err = PipelineError::schema("Sink", SchemaSide::Input, "expected integer");
        let text = err.to_string();
        assert!(text.contains("Sink"));
        assert!(text.contains("input"));
        assert!(text.contains("expected integer"));
    }
}
