//! The agent execution contract
//!
//! An agent is a stateful node owning one or more input ports and exactly
//! one output port. The scheduler drives it through [`Agent::step`]: pop at
//! most one envelope from the default input, validate it, hand it to
//! [`Agent::process`] (which defaults to [`Agent::run`]), validate and send
//! whatever comes back. Implementors usually embed an [`AgentCore`] and
//! override `run` — the provided `step`, `feed` and persistence methods do
//! the rest.
//!
//! Multi-port agents override `step` to choose which port to drain and
//! reuse [`Agent::dispatch`] for validation and emission; the scheduler
//! still observes at most one consumed envelope per step.
//!
//! # Example
//!
//! ```rust
//! use agentpipe_core::agent::{Agent, AgentCore, StepOutput};
//! use agentpipe_core::error::Result;
//! use agentpipe_core::message::Message;
//! use serde_json::json;
//!
//! struct Doubler {
//!     core: AgentCore,
//! }
//!
//! impl Agent for Doubler {
//!     fn core(&self) -> &AgentCore { &self.core }
//!     fn core_mut(&mut self) -> &mut AgentCore { &mut self.core }
//!
//!     fn run(&mut self, message: Message) -> Result<StepOutput> {
//!         let n = message.as_i64().unwrap_or(0);
//!         Ok(StepOutput::Single(json!(n * 2)))
//!     }
//! }
//! ```

use std::path::Path;

use uuid::Uuid;

use agentpipe_checkpoint::{
    agent_state_file, port_file, read_json, write_json_atomic, AgentStateFile, CheckpointError,
};

use crate::error::{PipelineError, Result, SchemaSide};
use crate::message::{Envelope, Message};
use crate::parent_id::Parents;
use crate::port::{Condition, InputEndpoint, InputPort, OutputPort, Transformer, DEFAULT_INPUT};
use crate::schema::MessageSchema;

/// What a single step accomplished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// No input was available; nothing happened
    Idle,
    /// One input was consumed
    Productive,
}

impl Activity {
    /// Whether the step consumed an input
    pub fn is_productive(self) -> bool {
        matches!(self, Activity::Productive)
    }
}

/// What an agent produced for one consumed message
///
/// `Many` emits each message as an independent send (every recipient tag
/// is `index 0 of 1`); `Split` emits one sibling batch whose tags share a
/// uuid and carry indices `0..L`, for downstream reassembly.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    /// Nothing to emit
    None,
    /// One output message
    Single(Message),
    /// Independent output messages, one send each
    Many(Vec<Message>),
    /// One sibling batch, sent with shared provenance for reassembly
    Split(Vec<Message>),
}

impl From<Message> for StepOutput {
    fn from(message: Message) -> Self {
        StepOutput::Single(message)
    }
}

impl From<Option<Message>> for StepOutput {
    fn from(message: Option<Message>) -> Self {
        match message {
            Some(m) => StepOutput::Single(m),
            None => StepOutput::None,
        }
    }
}

/// Ports, identity and schemas common to every agent
///
/// Input ports are ordered; the first is the default input that the
/// provided [`Agent::step`] drains.
pub struct AgentCore {
    uuid: Uuid,
    kind: String,
    inputs: Vec<InputPort>,
    output: OutputPort,
}

impl AgentCore {
    /// An agent core with a single default input port
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self::with_ports(kind, &[DEFAULT_INPUT])
    }

    /// An agent core with the given named input ports
    ///
    /// The first name is the default input.
    pub fn with_ports(kind: impl Into<String>, input_names: &[&str]) -> Self {
        let kind = kind.into();
        let uuid = Uuid::new_v4();
        let inputs = input_names
            .iter()
            .map(|name| InputPort::new(*name, uuid, kind.clone()))
            .collect();
        Self {
            uuid,
            kind: kind.clone(),
            inputs,
            output: OutputPort::new(uuid, kind),
        }
    }

    /// Declare a schema for the default input port
    pub fn with_input_schema(mut self, schema: MessageSchema) -> Self {
        self.inputs[0].set_schema(schema);
        self
    }

    /// Declare a schema for the output port
    pub fn with_output_schema(mut self, schema: MessageSchema) -> Self {
        self.output.set_schema(schema);
        self
    }

    /// Stable identity, unique per scheduler
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Replace this agent's uuid, rethreading port ownership
    ///
    /// Used when reconstructing a pipeline for resume: call it before any
    /// wiring, so endpoints handed to connections carry the final
    /// identity.
    pub fn assign_uuid(&mut self, uuid: Uuid) {
        self.uuid = uuid;
        for input in &mut self.inputs {
            input.set_owner_uuid(uuid);
        }
        self.output.set_owner_uuid(uuid);
    }

    /// Agent kind, used for rendering and error context
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// All input ports, default first
    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    /// An input port by name
    pub fn input(&self, name: &str) -> Option<&InputPort> {
        self.inputs.iter().find(|p| p.name() == name)
    }

    /// The default input port
    pub fn default_input(&self) -> &InputPort {
        &self.inputs[0]
    }

    /// A delivery endpoint for a named input port
    pub fn input_endpoint(&self, name: &str) -> Result<InputEndpoint> {
        self.input(name)
            .map(InputPort::endpoint)
            .ok_or_else(|| {
                PipelineError::wiring(format!(
                    "agent '{}' has no input port named '{name}'",
                    self.kind
                ))
            })
    }

    /// A delivery endpoint for the default input port
    pub fn default_endpoint(&self) -> InputEndpoint {
        self.inputs[0].endpoint()
    }

    /// The output port
    pub fn output(&self) -> &OutputPort {
        &self.output
    }

    /// The output port, mutably
    pub fn output_mut(&mut self) -> &mut OutputPort {
        &mut self.output
    }

    /// Enqueue a seed message on the default input with empty provenance
    pub fn feed(&self, message: Message) {
        self.inputs[0].receive(Envelope::seed(message));
    }

    /// Whether any input port has queued envelopes
    pub fn has_pending_input(&self) -> bool {
        self.inputs.iter().any(|p| !p.is_empty())
    }
}

impl std::fmt::Debug for AgentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCore")
            .field("kind", &self.kind)
            .field("uuid", &self.uuid)
            .field("inputs", &self.inputs)
            .finish()
    }
}

fn check_output_schema(core: &AgentCore, message: &Message) -> Result<()> {
    if let Some(schema) = core.output().schema() {
        if let Err(detail) = schema.check(message) {
            return Err(PipelineError::schema(core.kind(), SchemaSide::Output, detail));
        }
    }
    Ok(())
}

/// A stateful pipeline node driven by the scheduler
///
/// Implement [`core`](Agent::core)/[`core_mut`](Agent::core_mut) plus one
/// of [`run`](Agent::run) or [`process`](Agent::process); everything else
/// has working defaults.
pub trait Agent {
    /// The embedded port/identity plumbing
    fn core(&self) -> &AgentCore;

    /// The embedded port/identity plumbing, mutably
    fn core_mut(&mut self) -> &mut AgentCore;

    /// Handle one message, ignoring provenance
    ///
    /// The default errors; override this or [`process`](Agent::process).
    fn run(&mut self, message: Message) -> Result<StepOutput> {
        let _ = message;
        Err(PipelineError::agent(
            self.core().kind(),
            "neither run nor process is implemented",
        ))
    }

    /// Handle one message with its provenance
    ///
    /// Defaults to delegating to [`run`](Agent::run).
    fn process(&mut self, message: Message, parents: &Parents) -> Result<StepOutput> {
        let _ = parents;
        self.run(message)
    }

    /// Consume at most one envelope from the default input
    ///
    /// Returns [`Activity::Idle`] when the queue is empty. On failure the
    /// offending envelope has already been consumed and travels with the
    /// error; it is not re-queued.
    fn step(&mut self) -> Result<Activity> {
        let Some(envelope) = self.core().default_input().pop() else {
            return Ok(Activity::Idle);
        };
        self.dispatch(DEFAULT_INPUT, envelope)?;
        Ok(Activity::Productive)
    }

    /// Validate an envelope against a named input port's schema, process
    /// it and emit the result
    ///
    /// Building block for custom `step` implementations on multi-port
    /// agents.
    fn dispatch(&mut self, port: &str, envelope: Envelope) -> Result<()> {
        let validation = self
            .core()
            .input(port)
            .and_then(InputPort::schema)
            .map(|schema| schema.check(&envelope.message));
        if let Some(Err(detail)) = validation {
            return Err(
                PipelineError::schema(self.core().kind(), SchemaSide::Input, detail)
                    .with_offending(&envelope),
            );
        }

        let output = self
            .process(envelope.message.clone(), &envelope.parents)
            .map_err(|e| e.with_offending(&envelope))?;
        self.emit(output, &envelope.parents)
            .map_err(|e| e.with_offending(&envelope))
    }

    /// Validate produced messages against the output schema and send them
    ///
    /// Incoming parents pass through unchanged; the output port appends
    /// the fresh per-connection tags.
    fn emit(&mut self, output: StepOutput, parents: &Parents) -> Result<()> {
        match output {
            StepOutput::None => Ok(()),
            StepOutput::Single(message) => {
                check_output_schema(self.core(), &message)?;
                self.core_mut().output_mut().send(message, parents);
                Ok(())
            }
            StepOutput::Many(messages) => {
                for message in &messages {
                    check_output_schema(self.core(), message)?;
                }
                let out = self.core_mut().output_mut();
                for message in messages {
                    out.send(message, parents);
                }
                Ok(())
            }
            StepOutput::Split(messages) => {
                for message in &messages {
                    check_output_schema(self.core(), message)?;
                }
                self.core_mut().output_mut().send_split(messages, parents)
            }
        }
    }

    /// Enqueue a seed message without scheduler involvement
    fn feed(&mut self, message: Message) {
        self.core().feed(message);
    }

    /// Wire this agent's output to a target input endpoint
    fn connect_to(
        &mut self,
        target: InputEndpoint,
        transformer: Option<Transformer>,
        condition: Option<Condition>,
    ) {
        self.core_mut().output_mut().connect(target, transformer, condition);
    }

    /// Version of this agent's persisted state shape
    fn state_version(&self) -> u32 {
        1
    }

    /// Agent-specific state as an explicit JSON value
    ///
    /// Stateless agents keep the default (`null`).
    fn state_json(&self) -> Result<Message> {
        Ok(Message::Null)
    }

    /// Rebuild agent-specific state from [`state_json`](Agent::state_json)
    /// output
    fn restore_state(&mut self, state: Message) -> Result<()> {
        let _ = state;
        Ok(())
    }

    /// Persist uuid, state and every owned port into `dir`
    fn save_state(&self, dir: &Path) -> Result<()> {
        let core = self.core();
        let state = AgentStateFile {
            version: self.state_version(),
            uuid: core.uuid(),
            kind: core.kind().to_string(),
            state: self.state_json()?,
        };
        write_json_atomic(&agent_state_file(dir), &state)?;
        for input in core.inputs() {
            write_json_atomic(&port_file(dir, input.name()), &input.snapshot())?;
        }
        let output = core.output();
        write_json_atomic(&port_file(dir, output.name()), &output.snapshot())?;
        Ok(())
    }

    /// Restore uuid-matched state and ports from `dir`
    ///
    /// Identity is matched by uuid: loading a directory saved by a
    /// different agent is fatal.
    fn load_state(&mut self, dir: &Path) -> Result<()> {
        let state: AgentStateFile = read_json(&agent_state_file(dir))?;
        if state.uuid != self.core().uuid() {
            return Err(CheckpointError::agent_mismatch(format!(
                "directory '{}' holds state for agent {}, not {}",
                dir.display(),
                state.uuid,
                self.core().uuid(),
            ))
            .into());
        }
        if state.version != self.state_version() {
            return Err(CheckpointError::UnsupportedVersion {
                found: state.version,
                expected: self.state_version(),
            }
            .into());
        }
        self.restore_state(state.state)?;

        for input in self.core().inputs() {
            let snapshot = read_json(&port_file(dir, input.name()))?;
            input.restore(&snapshot)?;
        }
        let snapshot = read_json(&port_file(dir, self.core().output().name()))?;
        self.core_mut().output_mut().restore(&snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Doubler {
        core: AgentCore,
    }

    impl Doubler {
        fn new() -> Self {
            Self {
                core: AgentCore::new("Doubler"),
            }
        }
    }

    impl Agent for Doubler {
        fn core(&self) -> &AgentCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut AgentCore {
            &mut self.core
        }
        fn run(&mut self, message: Message) -> Result<StepOutput> {
            let n = message
                .as_i64()
                .ok_or_else(|| PipelineError::agent("Doubler", "expected integer"))?;
            Ok(StepOutput::Single(json!(n * 2)))
        }
    }

    #[test]
    fn test_step_idle_on_empty_queue() {
        let mut agent = Doubler::new();
        assert_eq!(agent.step().unwrap(), Activity::Idle);
    }

    #[test]
    fn test_step_consumes_one_message() {
        let mut agent = Doubler::new();
        agent.feed(json!(3));
        agent.feed(json!(4));

        assert_eq!(agent.step().unwrap(), Activity::Productive);
        // Second message still queued after one step.
        assert_eq!(agent.core().default_input().len(), 1);
        assert_eq!(agent.core().output().unconnected_len(), 1);
    }

    #[test]
    fn test_failed_message_is_not_requeued() {
        let mut agent = Doubler::new();
        agent.feed(json!("not a number"));

        let err = agent.step().unwrap_err();
        assert_eq!(err.offending().unwrap().message, json!("not a number"));
        assert!(agent.core().default_input().is_empty());
    }

    #[test]
    fn test_input_schema_rejection() {
        let mut agent = Doubler::new();
        agent.core = AgentCore::new("Doubler")
            .with_input_schema(MessageSchema::compile(json!({"type": "integer"})).unwrap());
        agent.feed(json!("nope"));

        let err = agent.step().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Schema {
                side: SchemaSide::Input,
                ..
            }
        ));
    }

    #[test]
    fn test_output_schema_rejection() {
        let mut agent = Doubler::new();
        agent.core = AgentCore::new("Doubler")
            .with_output_schema(MessageSchema::compile(json!({"type": "string"})).unwrap());
        agent.feed(json!(2));

        let err = agent.step().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Schema {
                side: SchemaSide::Output,
                ..
            }
        ));
        // Nothing was sent.
        assert_eq!(agent.core().output().unconnected_len(), 0);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let mut agent = Doubler::new();
        agent.feed(json!(7));
        agent.save_state(dir.path()).unwrap();

        let mut twin = Doubler::new();
        twin.core.assign_uuid(agent.core().uuid());
        twin.load_state(dir.path()).unwrap();

        assert_eq!(twin.core().default_input().len(), 1);
        assert_eq!(twin.core().default_input().pop().unwrap().message, json!(7));
    }

    #[test]
    fn test_load_rejects_foreign_state() {
        let dir = tempfile::tempdir().unwrap();

        let agent = Doubler::new();
        agent.save_state(dir.path()).unwrap();

        let mut other = Doubler::new();
        let err = other.load_state(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Checkpoint(CheckpointError::AgentMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_endpoint_is_wiring_error() {
        let agent = Doubler::new();
        assert!(matches!(
            agent.core().input_endpoint("sideband"),
            Err(PipelineError::Wiring(_))
        ));
    }
}
