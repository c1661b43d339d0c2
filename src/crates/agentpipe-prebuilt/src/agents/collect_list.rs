//! List reassembly
//!
//! [`CollectListAgent`] gathers the sibling pieces of a split message and
//! emits one composed message when every piece has arrived. Grouping needs
//! nothing from the sender: siblings share everything but their final
//! provenance tag, so the bucket key is `parents[:-1]` and completeness is
//! "all indices `0..len` present", with `len` read off any member's final
//! tag.
//!
//! Partial buckets are ordinary agent state: they survive steps and
//! checkpoints, so an interrupted pipeline resumes mid-reassembly.

use serde::{Deserialize, Serialize};

use agentpipe_core::agent::{Activity, Agent, AgentCore, StepOutput};
use agentpipe_core::error::{PipelineError, Result, SchemaSide};
use agentpipe_core::message::{Envelope, Message};
use agentpipe_core::parent_id::{sibling_group, Parents};

/// Composes the ordered piece payloads into the emitted message
pub type Composer = Box<dyn Fn(Vec<Message>) -> Message>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bucket {
    key: Parents,
    items: Vec<Envelope>,
}

impl Bucket {
    fn total(&self) -> Option<u32> {
        self.items
            .first()
            .and_then(|e| e.parents.last())
            .map(|pid| pid.total())
    }

    fn is_complete(&self) -> bool {
        self.total()
            .is_some_and(|total| self.items.len() as u32 == total)
    }
}

/// Buffers sibling pieces by provenance group and emits the reassembled
/// message
///
/// The default composition collects the per-index payloads into a JSON
/// array; [`with_composer`](CollectListAgent::with_composer) replaces it.
/// The emitted message carries the bucket's group key as its parents, so
/// downstream consumers see the split as if it never happened.
pub struct CollectListAgent {
    core: AgentCore,
    buckets: Vec<Bucket>,
    compose: Composer,
}

impl CollectListAgent {
    /// A collector composing pieces into a JSON array
    pub fn new() -> Self {
        Self {
            core: AgentCore::new("CollectListAgent"),
            buckets: Vec::new(),
            compose: Box::new(Message::Array),
        }
    }

    /// Replace the composition function
    pub fn with_composer(mut self, compose: impl Fn(Vec<Message>) -> Message + 'static) -> Self {
        self.compose = Box::new(compose);
        self
    }

    /// Number of incomplete buckets currently buffered
    pub fn pending_buckets(&self) -> usize {
        self.buckets.len()
    }

    fn absorb(&mut self, envelope: Envelope) -> Result<()> {
        if let Some(schema) = self.core.default_input().schema() {
            if let Err(detail) = schema.check(&envelope.message) {
                return Err(PipelineError::schema(
                    self.core.kind(),
                    SchemaSide::Input,
                    detail,
                ));
            }
        }

        let Some(last) = envelope.parents.last().cloned() else {
            return Err(PipelineError::agent(
                self.core.kind(),
                "message without provenance cannot be grouped",
            ));
        };
        let key = sibling_group(&envelope.parents).to_vec();

        let position = match self.buckets.iter().position(|b| b.key == key) {
            Some(position) => position,
            None => {
                self.buckets.push(Bucket {
                    key,
                    items: Vec::new(),
                });
                self.buckets.len() - 1
            }
        };
        let bucket = &mut self.buckets[position];

        if bucket.total().is_some_and(|total| total != last.total()) {
            return Err(PipelineError::agent(
                self.core.kind(),
                format!(
                    "sibling length disagreement in group: {} vs {}",
                    last.total(),
                    bucket.total().unwrap_or_default(),
                ),
            ));
        }
        if bucket
            .items
            .iter()
            .filter_map(|e| e.parents.last())
            .any(|pid| pid.index() == last.index())
        {
            return Err(PipelineError::agent(
                self.core.kind(),
                format!("duplicate sibling index {} in group", last.index()),
            ));
        }
        bucket.items.push(envelope);

        if bucket.is_complete() {
            let mut done = self.buckets.swap_remove(position);
            done.items.sort_by_key(|e| {
                e.parents.last().map(|pid| pid.index()).unwrap_or_default()
            });
            tracing::debug!(
                pieces = done.items.len(),
                pending = self.buckets.len(),
                "sibling group complete"
            );

            let payloads = done.items.into_iter().map(|e| e.message).collect();
            let composed = (self.compose)(payloads);
            self.emit(StepOutput::Single(composed), &done.key)?;
        }
        Ok(())
    }
}

impl Default for CollectListAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for CollectListAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    fn step(&mut self) -> Result<Activity> {
        let Some(envelope) = self.core.default_input().pop() else {
            return Ok(Activity::Idle);
        };
        let context = envelope.clone();
        self.absorb(envelope)
            .map_err(|e| e.with_offending(&context))?;
        Ok(Activity::Productive)
    }

    fn state_json(&self) -> Result<Message> {
        Ok(serde_json::to_value(&self.buckets)?)
    }

    fn restore_state(&mut self, state: Message) -> Result<()> {
        self.buckets = serde_json::from_value(state)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpipe_core::parent_id::ParentId;
    use serde_json::json;
    use uuid_like::batch;

    // Small helper for minting sibling batches in tests.
    mod uuid_like {
        use agentpipe_core::parent_id::ParentId;

        pub fn batch(total: u32) -> Vec<ParentId> {
            let seed = ParentId::mint(0, total);
            (0..total)
                .map(|i| ParentId::in_batch(seed.uuid(), i, total))
                .collect()
        }
    }

    fn deliver(agent: &mut CollectListAgent, prefix: &Parents, pid: ParentId, message: Message) {
        let mut parents = prefix.clone();
        parents.push(pid);
        agent
            .core()
            .default_input()
            .receive(Envelope::new(parents, message));
    }

    #[test]
    fn test_emits_once_group_is_complete() {
        let mut agent = CollectListAgent::new();
        let prefix = vec![ParentId::mint(0, 1)];
        let tags = batch(3);

        // Out-of-order arrival.
        deliver(&mut agent, &prefix, tags[2].clone(), json!("c"));
        deliver(&mut agent, &prefix, tags[0].clone(), json!("a"));
        deliver(&mut agent, &prefix, tags[1].clone(), json!("b"));

        agent.step().unwrap();
        agent.step().unwrap();
        assert_eq!(agent.core().output().unconnected_len(), 0);
        assert_eq!(agent.pending_buckets(), 1);

        agent.step().unwrap();
        let out: Vec<_> = agent.core().output().unconnected().cloned().collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, json!(["a", "b", "c"]));
        // Emitted parents are the group key plus the fresh output tag.
        assert_eq!(out[0].parents[..out[0].parents.len() - 1], prefix[..]);
        assert_eq!(agent.pending_buckets(), 0);
    }

    #[test]
    fn test_distinct_groups_do_not_mix() {
        let mut agent = CollectListAgent::new();
        let prefix_a = vec![ParentId::mint(0, 1)];
        let prefix_b = vec![ParentId::mint(0, 1)];
        let tags_a = batch(2);
        let tags_b = batch(2);

        deliver(&mut agent, &prefix_a, tags_a[0].clone(), json!(1));
        deliver(&mut agent, &prefix_b, tags_b[0].clone(), json!(10));
        deliver(&mut agent, &prefix_b, tags_b[1].clone(), json!(11));

        for _ in 0..3 {
            agent.step().unwrap();
        }

        let out: Vec<_> = agent.core().output().unconnected().cloned().collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, json!([10, 11]));
        assert_eq!(agent.pending_buckets(), 1);
    }

    #[test]
    fn test_custom_composer() {
        let mut agent = CollectListAgent::new().with_composer(|pieces| {
            let joined = pieces
                .iter()
                .filter_map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            json!(joined)
        });

        let tags = batch(2);
        deliver(&mut agent, &Vec::new(), tags[0].clone(), json!("hello"));
        deliver(&mut agent, &Vec::new(), tags[1].clone(), json!("world"));
        agent.step().unwrap();
        agent.step().unwrap();

        let out: Vec<_> = agent.core().output().unconnected().cloned().collect();
        assert_eq!(out[0].message, json!("hello world"));
    }

    #[test]
    fn test_message_without_provenance_fails() {
        let mut agent = CollectListAgent::new();
        agent.core().default_input().receive(Envelope::seed(json!(1)));
        assert!(agent.step().is_err());
    }

    #[test]
    fn test_duplicate_index_fails() {
        let mut agent = CollectListAgent::new();
        let tags = batch(2);
        deliver(&mut agent, &Vec::new(), tags[0].clone(), json!(1));
        deliver(&mut agent, &Vec::new(), tags[0].clone(), json!(1));
        agent.step().unwrap();
        assert!(agent.step().is_err());
    }

    #[test]
    fn test_buckets_survive_save_load() {
        let dir = tempfile::tempdir().unwrap();

        let mut agent = CollectListAgent::new();
        let tags = batch(2);
        deliver(&mut agent, &Vec::new(), tags[0].clone(), json!("x"));
        agent.step().unwrap();
        assert_eq!(agent.pending_buckets(), 1);
        agent.save_state(dir.path()).unwrap();

        let mut resumed = CollectListAgent::new();
        resumed.core_mut().assign_uuid(agent.core().uuid());
        resumed.load_state(dir.path()).unwrap();
        assert_eq!(resumed.pending_buckets(), 1);

        // The missing sibling completes the restored bucket.
        deliver(&mut resumed, &Vec::new(), tags[1].clone(), json!("y"));
        resumed.step().unwrap();
        let out: Vec<_> = resumed.core().output().unconnected().cloned().collect();
        assert_eq!(out[0].message, json!(["x", "y"]));
    }
}
