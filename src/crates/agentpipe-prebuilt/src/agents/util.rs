//! Small building-block agents
//!
//! Pass-throughs, sinks and sources used to assemble and test pipelines:
//!
//! - [`IdentityAgent`] - forwards every message unchanged
//! - [`SinkAgent`] - retains every received payload, emits nothing
//! - [`SequenceAgent`] - emits a configured message list when triggered
//! - [`FnAgent`] - wraps a closure as an agent

use agentpipe_core::agent::{Agent, AgentCore, StepOutput};
use agentpipe_core::error::Result;
use agentpipe_core::message::Message;

/// Forwards every message unchanged
pub struct IdentityAgent {
    core: AgentCore,
}

impl IdentityAgent {
    pub fn new() -> Self {
        Self {
            core: AgentCore::new("IdentityAgent"),
        }
    }
}

impl Default for IdentityAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for IdentityAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }
    fn run(&mut self, message: Message) -> Result<StepOutput> {
        Ok(StepOutput::Single(message))
    }
}

/// Retains every received payload and emits nothing
///
/// The received list is the agent's persisted state, so a resumed pipeline
/// keeps what the sink had already collected.
pub struct SinkAgent {
    core: AgentCore,
    received: Vec<Message>,
}

impl SinkAgent {
    pub fn new() -> Self {
        Self {
            core: AgentCore::new("SinkAgent"),
            received: Vec::new(),
        }
    }

    /// Payloads received so far, in arrival order
    pub fn received(&self) -> &[Message] {
        &self.received
    }
}

impl Default for SinkAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for SinkAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }
    fn run(&mut self, message: Message) -> Result<StepOutput> {
        self.received.push(message);
        Ok(StepOutput::None)
    }
    fn state_json(&self) -> Result<Message> {
        Ok(Message::Array(self.received.clone()))
    }
    fn restore_state(&mut self, state: Message) -> Result<()> {
        self.received = serde_json::from_value(state)?;
        Ok(())
    }
}

/// Emits a configured message list, one send per element, when triggered
///
/// Takes no meaningful input: feed it `null` (or anything) to trigger one
/// full emission.
pub struct SequenceAgent {
    core: AgentCore,
    items: Vec<Message>,
}

impl SequenceAgent {
    pub fn new(items: Vec<Message>) -> Self {
        Self {
            core: AgentCore::new("SequenceAgent"),
            items,
        }
    }
}

impl Agent for SequenceAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }
    fn run(&mut self, _trigger: Message) -> Result<StepOutput> {
        Ok(StepOutput::Many(self.items.clone()))
    }
}

/// Wraps a closure as an agent
///
/// Handy for one-off transforms and wiring experiments without a dedicated
/// type.
pub struct FnAgent {
    core: AgentCore,
    handler: Box<dyn FnMut(Message) -> Result<StepOutput>>,
}

impl FnAgent {
    pub fn new(
        kind: impl Into<String>,
        handler: impl FnMut(Message) -> Result<StepOutput> + 'static,
    ) -> Self {
        Self {
            core: AgentCore::new(kind),
            handler: Box::new(handler),
        }
    }
}

impl Agent for FnAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }
    fn run(&mut self, message: Message) -> Result<StepOutput> {
        (self.handler)(message)
    }
}
