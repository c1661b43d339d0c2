//! Ports and connections
//!
//! An agent owns one or more [`InputPort`]s (FIFO queues of envelopes) and
//! exactly one [`OutputPort`] (an ordered list of [`Connection`]s). A
//! connection carries an optional transformer and an optional condition;
//! delivery applies the transformer first, then evaluates the condition per
//! produced element, then mints a provenance tag and enqueues on the target.
//!
//! The engine is single-threaded cooperative, so input queues are shared
//! handles (`Rc<RefCell<..>>`): a connection holds a clone of its target
//! queue and `send` enqueues directly, without invoking any downstream
//! step. Cyclic wiring therefore cannot recurse.
//!
//! Connections accept only [`InputEndpoint`]s, which are obtainable only
//! from input ports — output-to-output wiring is unrepresentable.
//!
//! # Provenance minting
//!
//! One `send` mints a **fresh uuid per connection**: a message fanned out
//! to K connections receives K distinct batch uuids. Siblings (tags sharing
//! a uuid) only ever arise from one transformer split or one
//! [`OutputPort::send_split`] call on a single connection.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use agentpipe_checkpoint::PortSnapshot;

use crate::error::{PipelineError, Result};
use crate::message::{Envelope, Message};
use crate::parent_id::{ParentId, Parents};
use crate::schema::MessageSchema;

/// Default input port name
pub const DEFAULT_INPUT: &str = "input";
/// Output port name
pub const OUTPUT: &str = "output";

/// Per-connection message transformer
///
/// Returning an empty list drops the message on this connection; returning
/// N elements delivers N siblings tagged `0..N`.
pub type Transformer = Box<dyn Fn(&Message) -> Vec<Message>>;

/// Per-connection delivery filter, evaluated after the transformer
pub type Condition = Box<dyn Fn(&Message) -> bool>;

type SharedQueue = Rc<RefCell<VecDeque<Envelope>>>;

/// A cloneable delivery handle onto an input port
///
/// Obtainable only from an [`InputPort`]; this is what connections point
/// at, together with enough identity for introspection and rendering.
#[derive(Clone)]
pub struct InputEndpoint {
    queue: SharedQueue,
    agent_uuid: Uuid,
    agent_kind: String,
    port_name: String,
}

impl InputEndpoint {
    /// Uuid of the agent owning the target port
    pub fn agent_uuid(&self) -> Uuid {
        self.agent_uuid
    }

    /// Kind of the agent owning the target port
    pub fn agent_kind(&self) -> &str {
        &self.agent_kind
    }

    /// Name of the target port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn deliver(&self, envelope: Envelope) {
        self.queue.borrow_mut().push_back(envelope);
    }
}

impl fmt::Debug for InputEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.agent_kind, self.agent_uuid, self.port_name)
    }
}

/// A typed FIFO input endpoint owned by an agent
pub struct InputPort {
    name: String,
    owner_uuid: Uuid,
    owner_kind: String,
    schema: Option<MessageSchema>,
    queue: SharedQueue,
}

impl InputPort {
    pub(crate) fn new(name: impl Into<String>, owner_uuid: Uuid, owner_kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner_uuid,
            owner_kind: owner_kind.into(),
            schema: None,
            queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Port name, unique within its owning agent
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared message schema, if any
    pub fn schema(&self) -> Option<&MessageSchema> {
        self.schema.as_ref()
    }

    pub(crate) fn set_schema(&mut self, schema: MessageSchema) {
        self.schema = Some(schema);
    }

    pub(crate) fn set_owner_uuid(&mut self, uuid: Uuid) {
        self.owner_uuid = uuid;
    }

    /// Append an envelope to the queue
    pub fn receive(&self, envelope: Envelope) {
        self.queue.borrow_mut().push_back(envelope);
    }

    /// Pop the oldest queued envelope
    pub fn pop(&self) -> Option<Envelope> {
        self.queue.borrow_mut().pop_front()
    }

    /// Number of queued envelopes
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// A delivery handle for wiring connections to this port
    pub fn endpoint(&self) -> InputEndpoint {
        InputEndpoint {
            queue: Rc::clone(&self.queue),
            agent_uuid: self.owner_uuid,
            agent_kind: self.owner_kind.clone(),
            port_name: self.name.clone(),
        }
    }

    /// Queue contents as a persisted snapshot
    pub fn snapshot(&self) -> PortSnapshot {
        PortSnapshot {
            queue: self.queue.borrow().iter().map(Envelope::to_record).collect(),
            unconnected: Vec::new(),
        }
    }

    /// Replace queue contents from a persisted snapshot
    pub fn restore(&self, snapshot: &PortSnapshot) -> Result<()> {
        let mut queue = self.queue.borrow_mut();
        queue.clear();
        for record in &snapshot.queue {
            queue.push_back(Envelope::from_record(record.clone())?);
        }
        Ok(())
    }
}

impl fmt::Debug for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputPort")
            .field("name", &self.name)
            .field("owner", &self.owner_kind)
            .field("queued", &self.len())
            .finish()
    }
}

/// A directed link from an output port to an input port
pub struct Connection {
    target: InputEndpoint,
    transformer: Option<Transformer>,
    condition: Option<Condition>,
    // Weak back-reference to the source, for introspection and rendering.
    source_uuid: Uuid,
    source_kind: String,
}

impl Connection {
    /// Uuid of the target agent
    pub fn target_uuid(&self) -> Uuid {
        self.target.agent_uuid()
    }

    /// Kind of the target agent
    pub fn target_kind(&self) -> &str {
        self.target.agent_kind()
    }

    /// Name of the target input port
    pub fn target_port(&self) -> &str {
        self.target.port_name()
    }

    /// Uuid of the source agent
    pub fn source_uuid(&self) -> Uuid {
        self.source_uuid
    }

    /// Kind of the source agent
    pub fn source_kind(&self) -> &str {
        &self.source_kind
    }

    /// Whether a transformer is attached
    pub fn has_transformer(&self) -> bool {
        self.transformer.is_some()
    }

    /// Whether a condition is attached
    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}@{}{}{}",
            self.source_kind,
            self.target.agent_kind(),
            self.target.port_name(),
            if self.has_transformer() { " [transform]" } else { "" },
            if self.has_condition() { " [filter]" } else { "" },
        )
    }
}

/// The single outbound endpoint of an agent
///
/// Holds the ordered connection list and the buffer of envelopes sent
/// while no connection was attached (a sink-inspection aid).
pub struct OutputPort {
    name: String,
    owner_uuid: Uuid,
    owner_kind: String,
    schema: Option<MessageSchema>,
    connections: Vec<Connection>,
    unconnected: VecDeque<Envelope>,
}

impl OutputPort {
    pub(crate) fn new(owner_uuid: Uuid, owner_kind: impl Into<String>) -> Self {
        Self {
            name: OUTPUT.to_string(),
            owner_uuid,
            owner_kind: owner_kind.into(),
            schema: None,
            connections: Vec::new(),
            unconnected: VecDeque::new(),
        }
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared message schema, if any
    pub fn schema(&self) -> Option<&MessageSchema> {
        self.schema.as_ref()
    }

    pub(crate) fn set_schema(&mut self, schema: MessageSchema) {
        self.schema = Some(schema);
    }

    pub(crate) fn set_owner_uuid(&mut self, uuid: Uuid) {
        self.owner_uuid = uuid;
    }

    /// Append a connection; declaration order is delivery order
    pub fn connect(
        &mut self,
        target: InputEndpoint,
        transformer: Option<Transformer>,
        condition: Option<Condition>,
    ) {
        self.connections.push(Connection {
            target,
            transformer,
            condition,
            source_uuid: self.owner_uuid,
            source_kind: self.owner_kind.clone(),
        });
    }

    /// Outbound connections in declaration order
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Envelopes sent while no connection was attached
    pub fn unconnected(&self) -> impl Iterator<Item = &Envelope> {
        self.unconnected.iter()
    }

    /// Number of buffered unconnected envelopes
    pub fn unconnected_len(&self) -> usize {
        self.unconnected.len()
    }

    /// Broadcast one message through every connection
    ///
    /// Per connection, in declaration order: the transformer produces the
    /// candidate list (default `[message]`), a fresh batch uuid is minted,
    /// and each candidate passing the condition is delivered with
    /// `parents ++ [uuid:i:L]`. An empty candidate list makes the send a
    /// no-op on that connection. With zero connections the message lands in
    /// the unconnected buffer, tagged `0:1`.
    pub fn send(&mut self, message: Message, parents: &Parents) {
        if self.connections.is_empty() {
            let mut tagged = parents.clone();
            tagged.push(ParentId::mint(0, 1));
            self.unconnected.push_back(Envelope::new(tagged, message));
            return;
        }

        for conn in &self.connections {
            let candidates = match &conn.transformer {
                Some(transform) => transform(&message),
                None => vec![message.clone()],
            };
            let total = candidates.len();
            if total == 0 {
                continue;
            }

            let batch = Uuid::new_v4();
            for (index, candidate) in candidates.into_iter().enumerate() {
                if let Some(condition) = &conn.condition {
                    if !condition(&candidate) {
                        continue;
                    }
                }
                let mut tagged = parents.clone();
                tagged.push(ParentId::in_batch(batch, index as u32, total as u32));
                conn.target.deliver(Envelope::new(tagged, candidate));
            }
        }
    }

    /// Send a pre-split sibling batch
    ///
    /// The privileged overload for agents that split a message for
    /// downstream reassembly: per connection one batch uuid is minted and
    /// element `i` is delivered tagged `uuid:i:L`. A transformer on the
    /// connection is applied per element and must yield at most one value,
    /// since sibling indices cannot be renumbered; an empty result drops
    /// the element (its index never arrives downstream).
    pub fn send_split(&mut self, messages: Vec<Message>, parents: &Parents) -> Result<()> {
        let total = messages.len();
        if total == 0 {
            return Ok(());
        }

        if self.connections.is_empty() {
            let batch = Uuid::new_v4();
            for (index, message) in messages.into_iter().enumerate() {
                let mut tagged = parents.clone();
                tagged.push(ParentId::in_batch(batch, index as u32, total as u32));
                self.unconnected.push_back(Envelope::new(tagged, message));
            }
            return Ok(());
        }

        for conn in &self.connections {
            let batch = Uuid::new_v4();
            for (index, message) in messages.iter().enumerate() {
                let candidate = match &conn.transformer {
                    Some(transform) => {
                        let mut produced = transform(message);
                        match produced.len() {
                            0 => continue,
                            1 => produced.pop().unwrap_or_default(),
                            n => {
                                return Err(PipelineError::wiring(format!(
                                    "transformer on connection {} -> {}@{} produced {} values \
                                     for one element of a split send",
                                    self.owner_kind,
                                    conn.target_kind(),
                                    conn.target_port(),
                                    n,
                                )));
                            }
                        }
                    }
                    None => message.clone(),
                };
                if let Some(condition) = &conn.condition {
                    if !condition(&candidate) {
                        continue;
                    }
                }
                let mut tagged = parents.clone();
                tagged.push(ParentId::in_batch(batch, index as u32, total as u32));
                conn.target.deliver(Envelope::new(tagged, candidate));
            }
        }
        Ok(())
    }

    /// Unconnected buffer as a persisted snapshot
    pub fn snapshot(&self) -> PortSnapshot {
        PortSnapshot {
            queue: Vec::new(),
            unconnected: self.unconnected.iter().map(Envelope::to_record).collect(),
        }
    }

    /// Replace the unconnected buffer from a persisted snapshot
    pub fn restore(&mut self, snapshot: &PortSnapshot) -> Result<()> {
        self.unconnected.clear();
        for record in &snapshot.unconnected {
            self.unconnected.push_back(Envelope::from_record(record.clone())?);
        }
        Ok(())
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputPort")
            .field("owner", &self.owner_kind)
            .field("connections", &self.connections)
            .field("unconnected", &self.unconnected.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(name: &str) -> InputPort {
        InputPort::new(name, Uuid::new_v4(), "Sink")
    }

    fn output() -> OutputPort {
        OutputPort::new(Uuid::new_v4(), "Source")
    }

    #[test]
    fn test_send_delivers_fifo() {
        let target = input(DEFAULT_INPUT);
        let mut out = output();
        out.connect(target.endpoint(), None, None);

        out.send(json!("a"), &Vec::new());
        out.send(json!("b"), &Vec::new());

        assert_eq!(target.pop().unwrap().message, json!("a"));
        assert_eq!(target.pop().unwrap().message, json!("b"));
        assert!(target.pop().is_none());
    }

    #[test]
    fn test_send_appends_one_parent_per_traversal() {
        let target = input(DEFAULT_INPUT);
        let mut out = output();
        out.connect(target.endpoint(), None, None);

        let upstream = vec![ParentId::mint(0, 1)];
        out.send(json!(1), &upstream);

        let env = target.pop().unwrap();
        assert_eq!(env.parents.len(), 2);
        assert_eq!(env.parents[0], upstream[0]);
        assert_eq!(env.parents[1].index(), 0);
        assert_eq!(env.parents[1].total(), 1);
    }

    #[test]
    fn test_fan_out_mints_distinct_batches() {
        let left = input(DEFAULT_INPUT);
        let right = input(DEFAULT_INPUT);
        let mut out = output();
        out.connect(left.endpoint(), None, None);
        out.connect(right.endpoint(), None, None);

        out.send(json!("x"), &Vec::new());

        let l = left.pop().unwrap();
        let r = right.pop().unwrap();
        assert_eq!(l.message, json!("x"));
        assert_eq!(r.message, json!("x"));
        assert_ne!(l.parents[0].uuid(), r.parents[0].uuid());
    }

    #[test]
    fn test_transformer_split_tags_siblings() {
        let target = input(DEFAULT_INPUT);
        let mut out = output();
        out.connect(
            target.endpoint(),
            Some(Box::new(|m: &Message| {
                m.as_array().cloned().unwrap_or_default()
            })),
            None,
        );

        out.send(json!(["a", "b", "c"]), &Vec::new());

        let mut seen = Vec::new();
        while let Some(env) = target.pop() {
            let pid = env.parents.last().unwrap().clone();
            seen.push((pid, env.message));
        }
        assert_eq!(seen.len(), 3);
        let batch = seen[0].0.uuid();
        for (i, (pid, message)) in seen.iter().enumerate() {
            assert_eq!(pid.uuid(), batch);
            assert_eq!(pid.index() as usize, i);
            assert_eq!(pid.total(), 3);
            assert_eq!(*message, json!(["a", "b", "c"][i]));
        }
    }

    #[test]
    fn test_transformer_empty_output_is_noop() {
        let target = input(DEFAULT_INPUT);
        let mut out = output();
        out.connect(target.endpoint(), Some(Box::new(|_| Vec::new())), None);

        out.send(json!("dropped"), &Vec::new());
        assert!(target.is_empty());
    }

    #[test]
    fn test_condition_filters_after_transform() {
        let target = input(DEFAULT_INPUT);
        let mut out = output();
        out.connect(
            target.endpoint(),
            None,
            Some(Box::new(|m: &Message| m.as_i64().is_some_and(|v| v % 2 == 0))),
        );

        for v in 1..=5 {
            out.send(json!(v), &Vec::new());
        }

        let received: Vec<_> = std::iter::from_fn(|| target.pop())
            .map(|e| e.message)
            .collect();
        assert_eq!(received, vec![json!(2), json!(4)]);
    }

    #[test]
    fn test_unconnected_output_buffers() {
        let mut out = output();
        out.send(json!(1), &Vec::new());
        out.send(json!(2), &Vec::new());

        assert_eq!(out.unconnected_len(), 2);
        let buffered: Vec<_> = out.unconnected().collect();
        assert_eq!(buffered[0].message, json!(1));
        assert_eq!(buffered[0].parents.len(), 1);
        assert!(buffered[0].parents[0].is_last_sibling());
    }

    #[test]
    fn test_send_split_shares_batch() {
        let target = input(DEFAULT_INPUT);
        let mut out = output();
        out.connect(target.endpoint(), None, None);

        out.send_split(vec![json!("a"), json!("b")], &Vec::new()).unwrap();

        let first = target.pop().unwrap();
        let second = target.pop().unwrap();
        let (p1, p2) = (&first.parents[0], &second.parents[0]);
        assert!(p1.is_sibling_of(p2));
        assert_eq!((p1.index(), p1.total()), (0, 2));
        assert_eq!((p2.index(), p2.total()), (1, 2));
    }

    #[test]
    fn test_send_split_rejects_expanding_transformer() {
        let target = input(DEFAULT_INPUT);
        let mut out = output();
        out.connect(
            target.endpoint(),
            Some(Box::new(|m: &Message| vec![m.clone(), m.clone()])),
            None,
        );

        let err = out
            .send_split(vec![json!("a"), json!("b")], &Vec::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Wiring(_)));
    }

    #[test]
    fn test_self_connection_enqueues_without_recursion() {
        // A port wired to its own agent's input just enqueues; nothing runs.
        let loopback = input(DEFAULT_INPUT);
        let mut out = output();
        out.connect(loopback.endpoint(), None, None);

        out.send(json!("again"), &Vec::new());
        assert_eq!(loopback.len(), 1);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let port = input(DEFAULT_INPUT);
        port.receive(Envelope::new(vec![ParentId::mint(0, 1)], json!("kept")));

        let snap = port.snapshot();
        let other = input(DEFAULT_INPUT);
        other.restore(&snap).unwrap();

        assert_eq!(other.len(), 1);
        assert_eq!(other.pop().unwrap().message, json!("kept"));
    }
}
