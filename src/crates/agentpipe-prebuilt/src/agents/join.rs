//! Multi-port join
//!
//! [`JoinAgent`] merges one message per named input port into a single
//! composite, using provenance to decide which messages belong together:
//! a set of buffered messages (one per port) joins when their full parent
//! sequences share a non-empty common ancestor, found with
//! `longest_common_prefix`. The composite maps port name to payload and
//! carries that common ancestor sequence as its parents.
//!
//! Branches may be of different depths — each accumulates its own
//! intermediate tags after the fork — so matching is by shared ancestry,
//! not by identical provenance prefixes. Candidates are tried oldest
//! arrival first. Partial buffers are agent state and survive checkpoints.

use serde::{Deserialize, Serialize};

use agentpipe_core::agent::{Activity, Agent, AgentCore, StepOutput};
use agentpipe_core::error::{PipelineError, Result, SchemaSide};
use agentpipe_core::message::{Envelope, Message};
use agentpipe_core::parent_id::{longest_common_prefix, Parents};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PortBuffer {
    port: String,
    // Arrival order.
    pending: Vec<Envelope>,
}

/// Joins one message per named input port into a composite message
///
/// Input ports are drained in declaration order, one envelope per step.
/// When several combinations could join, the oldest buffered candidates
/// win.
pub struct JoinAgent {
    core: AgentCore,
    buffers: Vec<PortBuffer>,
}

impl JoinAgent {
    /// A join agent with the given named input ports
    ///
    /// The first name doubles as the default input for seeding.
    ///
    /// # Panics
    ///
    /// Panics when `ports` is empty; a join over zero ports is a
    /// construction bug.
    pub fn new(ports: &[&str]) -> Self {
        assert!(!ports.is_empty(), "a join agent needs at least one input port");
        Self {
            core: AgentCore::with_ports("JoinAgent", ports),
            buffers: ports
                .iter()
                .map(|port| PortBuffer {
                    port: (*port).to_string(),
                    pending: Vec::new(),
                })
                .collect(),
        }
    }

    /// Total number of buffered, not yet joined envelopes
    pub fn pending_len(&self) -> usize {
        self.buffers.iter().map(|b| b.pending.len()).sum()
    }

    fn absorb(&mut self, port: String, envelope: Envelope) -> Result<()> {
        let validation = self
            .core
            .input(&port)
            .and_then(|p| p.schema())
            .map(|schema| schema.check(&envelope.message));
        if let Some(Err(detail)) = validation {
            return Err(PipelineError::schema(
                self.core.kind(),
                SchemaSide::Input,
                detail,
            ));
        }

        let buffer = self
            .buffers
            .iter_mut()
            .find(|b| b.port == port)
            .ok_or_else(|| {
                PipelineError::agent(self.core.kind(), format!("unknown input port '{port}'"))
            })?;
        buffer.pending.push(envelope);

        while self.emit_ready()? {}
        Ok(())
    }

    /// Try to join the oldest compatible combination; true when one
    /// emitted
    fn emit_ready(&mut self) -> Result<bool> {
        // Anchor on the first port's buffer, oldest first; for every other
        // port take the oldest envelope that still shares ancestry with
        // the selection so far.
        let Some((anchor_buffer, rest)) = self.buffers.split_first() else {
            return Ok(false);
        };

        let mut chosen: Option<Vec<usize>> = None;
        'anchors: for (anchor_idx, anchor) in anchor_buffer.pending.iter().enumerate() {
            let mut ancestry = anchor.parents.clone();
            if ancestry.is_empty() {
                continue;
            }
            let mut picks = vec![anchor_idx];
            for buffer in rest {
                let matched = buffer.pending.iter().enumerate().find_map(|(i, e)| {
                    let shared =
                        longest_common_prefix([ancestry.as_slice(), e.parents.as_slice()]);
                    (!shared.is_empty()).then_some((i, shared))
                });
                let Some((pick, shared)) = matched else {
                    continue 'anchors;
                };
                ancestry = shared;
                picks.push(pick);
            }
            chosen = Some(picks);
            break;
        }
        let Some(picks) = chosen else {
            return Ok(false);
        };

        let mut composite = serde_json::Map::new();
        let mut members: Vec<Parents> = Vec::with_capacity(picks.len());
        for (buffer, pick) in self.buffers.iter_mut().zip(&picks) {
            let envelope = buffer.pending.remove(*pick);
            members.push(envelope.parents);
            composite.insert(buffer.port.clone(), envelope.message);
        }
        let ancestry = longest_common_prefix(members.iter().map(|p| p.as_slice()));
        tracing::debug!(pending = self.pending_len(), "join group complete");
        self.emit(StepOutput::Single(Message::Object(composite)), &ancestry)?;
        Ok(true)
    }
}

impl Agent for JoinAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    fn step(&mut self) -> Result<Activity> {
        // First non-empty port in declaration order; one envelope per step.
        let popped = self
            .core
            .inputs()
            .iter()
            .find_map(|p| p.pop().map(|e| (p.name().to_string(), e)));
        let Some((port, envelope)) = popped else {
            return Ok(Activity::Idle);
        };
        let context = envelope.clone();
        self.absorb(port, envelope)
            .map_err(|e| e.with_offending(&context))?;
        Ok(Activity::Productive)
    }

    fn state_json(&self) -> Result<Message> {
        Ok(serde_json::to_value(&self.buffers)?)
    }

    fn restore_state(&mut self, state: Message) -> Result<()> {
        self.buffers = serde_json::from_value(state)?;
        Ok(())
    }
}
