//! Round-robin scheduler
//!
//! The scheduler owns an ordered agent list and drives it cooperatively:
//! one [`step`](Scheduler::step) visits one agent, lets it consume at most
//! one message, and advances the cursor. [`step_all`](Scheduler::step_all)
//! repeats until quiescence — a full round in which every agent reported
//! idle.
//!
//! Failures are captured, never swallowed: a failing step is wrapped into
//! a [`SchedulerError`] carrying the agent, step counter and offending
//! envelope, optionally frozen to disk, and either collected on an error
//! list or returned, per [`ErrorPolicy`]. The cursor advances past the
//! failure either way, so a later `step_all` continues with the next agent
//! instead of live-locking.
//!
//! With a `save_dir` configured, a full snapshot is written every
//! `save_step` steps; `scheduler.json` is written last so interrupted
//! snapshots are never mistaken for valid ones.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut scheduler = Scheduler::with_config(
//!     SchedulerConfig::new().with_save_dir("snapshots").with_save_step(10),
//! );
//! scheduler.add_agent(source.clone());
//! scheduler.add_agent(sink.clone());
//! source.borrow_mut().feed(json!({"url": "https://example.org"}));
//! scheduler.step_all()?;
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use agentpipe_checkpoint::{
    agent_dir, error_file, is_complete_step_dir, read_json, scheduler_file, step_dir,
    write_json_atomic, CheckpointError, ErrorReport, SchedulerSnapshot,
};

use crate::agent::{Activity, Agent};
use crate::error::{PipelineError, Result};
use crate::message::Envelope;

/// A registered agent, shared between caller and scheduler
pub type SharedAgent = Rc<RefCell<dyn Agent>>;

/// What the scheduler does with a captured agent failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Record on the scheduler's error list and keep stepping
    #[default]
    Collect,
    /// Return the error from `step`/`step_all`
    Fail,
}

/// Scheduler options, builder style
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    save_dir: Option<PathBuf>,
    save_step: u64,
    error_dir: Option<PathBuf>,
    error_policy: ErrorPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            save_dir: None,
            save_step: 1,
            error_dir: None,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Default configuration: no persistence, collect errors
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a checkpoint under this directory every `save_step` steps
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    /// Checkpoint cadence in steps (default 1)
    pub fn with_save_step(mut self, steps: u64) -> Self {
        self.save_step = steps;
        self
    }

    /// Freeze failing steps (full snapshot + error report) under this
    /// directory
    pub fn with_error_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.error_dir = Some(dir.into());
        self
    }

    /// How captured failures are surfaced
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

/// An agent failure captured by the scheduler
///
/// Records which agent failed, at which step, the underlying error and —
/// when the failure happened while handling a message — the envelope that
/// triggered it. The offending input has already been consumed.
#[derive(Debug, Error)]
#[error("agent '{agent_kind}' ({agent_uuid}) failed at step {step}: {source}")]
pub struct SchedulerError {
    /// Uuid of the failing agent
    pub agent_uuid: Uuid,
    /// Kind of the failing agent
    pub agent_kind: String,
    /// Step counter value of the failing step
    pub step: u64,
    /// The underlying failure
    #[source]
    pub source: PipelineError,
    /// The envelope being handled when the failure occurred
    pub offending: Option<Envelope>,
}

impl SchedulerError {
    /// The persisted form of this error
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            ts: Utc::now(),
            agent_uuid: self.agent_uuid,
            agent_kind: self.agent_kind.clone(),
            step: self.step,
            kind: self.source.kind_label().to_string(),
            message: self.source.to_string(),
            offending: self.offending.as_ref().map(Envelope::to_record),
        }
    }
}

/// Cooperative round-robin driver over an ordered agent list
#[derive(Default)]
pub struct Scheduler {
    agents: Vec<SharedAgent>,
    agent_idx: usize,
    step_counter: u64,
    all_done_counter: usize,
    errors: Vec<SchedulerError>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// A scheduler with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler with the given configuration
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Register an agent; registration order is round-robin order
    pub fn add_agent(&mut self, agent: SharedAgent) {
        self.agents.push(agent);
    }

    /// Registered agents, in registration order
    pub fn agents(&self) -> &[SharedAgent] {
        &self.agents
    }

    /// Total single-step calls performed
    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    /// Round-robin cursor position
    pub fn agent_idx(&self) -> usize {
        self.agent_idx
    }

    /// Consecutive idle single-step calls
    pub fn all_done_counter(&self) -> usize {
        self.all_done_counter
    }

    /// Failures captured under [`ErrorPolicy::Collect`]
    pub fn errors(&self) -> &[SchedulerError] {
        &self.errors
    }

    /// Drain the captured failure list
    pub fn take_errors(&mut self) -> Vec<SchedulerError> {
        std::mem::take(&mut self.errors)
    }

    /// Step the agent under the cursor and advance
    ///
    /// Counts the step, updates the quiescence counter, captures failures
    /// per policy and writes a checkpoint when the cadence says so. The
    /// cursor advances even when the agent fails.
    pub fn step(&mut self) -> Result<Activity> {
        if self.agents.is_empty() {
            return Ok(Activity::Idle);
        }

        let idx = self.agent_idx;
        let agent = Rc::clone(&self.agents[idx]);
        let outcome = agent.borrow_mut().step();
        self.step_counter += 1;
        self.agent_idx = (idx + 1) % self.agents.len();

        let activity = match outcome {
            Ok(Activity::Idle) => {
                self.all_done_counter += 1;
                Activity::Idle
            }
            Ok(Activity::Productive) => {
                tracing::debug!(
                    step = self.step_counter,
                    agent = %agent.borrow().core().kind(),
                    "productive step"
                );
                self.all_done_counter = 0;
                Activity::Productive
            }
            Err(source) => {
                // The offending input was consumed; the step did work.
                self.all_done_counter = 0;
                let error = self.capture(&agent, source);
                match self.config.error_policy {
                    ErrorPolicy::Collect => self.errors.push(error),
                    ErrorPolicy::Fail => return Err(error.into()),
                }
                Activity::Productive
            }
        };

        self.maybe_checkpoint();
        Ok(activity)
    }

    /// Drive until a full round produces no work
    ///
    /// Quiescence is stable: calling this again without an intervening
    /// `feed` performs no steps.
    pub fn step_all(&mut self) -> Result<()> {
        if self.agents.is_empty() {
            return Ok(());
        }
        if self.all_done_counter >= self.agents.len() {
            if !self.has_pending_work() {
                return Ok(());
            }
            // New input arrived since quiescence.
            self.all_done_counter = 0;
        }
        while self.all_done_counter < self.agents.len() {
            self.step()?;
        }
        tracing::debug!(steps = self.step_counter, "pipeline quiescent");
        Ok(())
    }

    fn has_pending_work(&self) -> bool {
        self.agents
            .iter()
            .any(|agent| agent.borrow().core().has_pending_input())
    }

    fn capture(&self, agent: &SharedAgent, source: PipelineError) -> SchedulerError {
        let (agent_uuid, agent_kind) = {
            let agent = agent.borrow();
            (agent.core().uuid(), agent.core().kind().to_string())
        };
        let offending = source.offending().cloned();
        let error = SchedulerError {
            agent_uuid,
            agent_kind,
            step: self.step_counter,
            source,
            offending,
        };
        tracing::error!(
            agent = %error.agent_kind,
            step = error.step,
            error = %error.source,
            "agent step failed"
        );

        if let Some(root) = self.config.error_dir.clone() {
            if let Err(snapshot_err) = self.write_error_snapshot(&root, &error) {
                tracing::warn!(error = %snapshot_err, "could not persist error snapshot");
            }
        }
        error
    }

    fn write_error_snapshot(&self, root: &Path, error: &SchedulerError) -> Result<()> {
        let dir = step_dir(root, error.step);
        self.save_state(&dir)?;
        write_json_atomic(&error_file(&dir), &error.report())?;
        Ok(())
    }

    fn maybe_checkpoint(&self) {
        let Some(root) = &self.config.save_dir else {
            return;
        };
        if self.config.save_step == 0 || self.step_counter % self.config.save_step != 0 {
            return;
        }
        let dir = step_dir(root, self.step_counter);
        match self.save_state(&dir) {
            Ok(()) => {
                tracing::debug!(step = self.step_counter, dir = %dir.display(), "checkpoint written");
            }
            Err(err) => {
                // Save-time failures are non-fatal; the in-memory state is
                // still valid and this checkpoint is not retried.
                tracing::warn!(step = self.step_counter, error = %err, "checkpoint write failed");
            }
        }
    }

    /// Write a full snapshot of scheduler and agents into `dir`
    ///
    /// The scheduler state file is written last; its presence marks the
    /// snapshot complete.
    pub fn save_state(&self, dir: &Path) -> Result<()> {
        let mut order = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let agent = agent.borrow();
            let uuid = agent.core().uuid();
            agent.save_state(&agent_dir(dir, &uuid))?;
            order.push(uuid);
        }
        let snapshot =
            SchedulerSnapshot::new(self.agent_idx, self.step_counter, self.all_done_counter, order);
        write_json_atomic(&scheduler_file(dir), &snapshot)?;
        Ok(())
    }

    /// Restore every registered agent's state from a snapshot directory
    ///
    /// The snapshot must hold the same agent list — same uuids, same
    /// order — as is registered; any difference is fatal.
    pub fn load_agents(&mut self, dir: &Path) -> Result<()> {
        let snapshot = self.read_snapshot(dir)?;
        for (agent, uuid) in self.agents.iter().zip(&snapshot.order) {
            agent.borrow_mut().load_state(&agent_dir(dir, uuid))?;
        }
        Ok(())
    }

    /// Restore the scheduler cursor and counters from a snapshot directory
    pub fn load_state(&mut self, dir: &Path) -> Result<()> {
        let snapshot = self.read_snapshot(dir)?;
        self.agent_idx = snapshot.agent_idx;
        self.step_counter = snapshot.step_counter;
        self.all_done_counter = snapshot.all_done_counter;
        Ok(())
    }

    fn read_snapshot(&self, dir: &Path) -> Result<SchedulerSnapshot> {
        if !is_complete_step_dir(dir) {
            return Err(CheckpointError::InvalidSnapshot(dir.to_path_buf()).into());
        }
        let snapshot: SchedulerSnapshot = read_json(&scheduler_file(dir))?;
        snapshot.check_version()?;

        if snapshot.order.len() != self.agents.len() {
            return Err(CheckpointError::agent_mismatch(format!(
                "snapshot holds {} agents, {} registered",
                snapshot.order.len(),
                self.agents.len(),
            ))
            .into());
        }
        for (position, (agent, expected)) in
            self.agents.iter().zip(&snapshot.order).enumerate()
        {
            let actual = agent.borrow().core().uuid();
            if actual != *expected {
                return Err(CheckpointError::agent_mismatch(format!(
                    "agent at position {position} is {actual}, snapshot expects {expected}",
                ))
                .into());
            }
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentCore, StepOutput};
    use crate::message::Message;
    use serde_json::json;

    struct Relay {
        core: AgentCore,
        seen: Vec<Message>,
    }

    impl Relay {
        fn new() -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                core: AgentCore::new("Relay"),
                seen: Vec::new(),
            }))
        }
    }

    impl Agent for Relay {
        fn core(&self) -> &AgentCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut AgentCore {
            &mut self.core
        }
        fn run(&mut self, message: Message) -> Result<StepOutput> {
            self.seen.push(message.clone());
            Ok(StepOutput::Single(message))
        }
    }

    struct Exploder {
        core: AgentCore,
    }

    impl Agent for Exploder {
        fn core(&self) -> &AgentCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut AgentCore {
            &mut self.core
        }
        fn run(&mut self, _message: Message) -> Result<StepOutput> {
            Err(PipelineError::agent("Exploder", "intentional failure"))
        }
    }

    #[test]
    fn test_round_robin_is_strict() {
        let a = Relay::new();
        let b = Relay::new();

        let mut scheduler = Scheduler::new();
        scheduler.add_agent(a.clone());
        scheduler.add_agent(b.clone());

        assert_eq!(scheduler.agent_idx(), 0);
        scheduler.step().unwrap();
        assert_eq!(scheduler.agent_idx(), 1);
        scheduler.step().unwrap();
        assert_eq!(scheduler.agent_idx(), 0);
        assert_eq!(scheduler.step_counter(), 2);
    }

    #[test]
    fn test_step_all_reaches_quiescence() {
        let a = Relay::new();
        let b = Relay::new();
        let endpoint = b.borrow().core().default_endpoint();
        a.borrow_mut().connect_to(endpoint, None, None);

        let mut scheduler = Scheduler::new();
        scheduler.add_agent(a.clone());
        scheduler.add_agent(b.clone());

        a.borrow_mut().feed(json!("ping"));
        scheduler.step_all().unwrap();

        assert_eq!(a.borrow().seen, vec![json!("ping")]);
        assert_eq!(b.borrow().seen, vec![json!("ping")]);
        assert_eq!(scheduler.all_done_counter(), 2);
    }

    #[test]
    fn test_quiescence_is_stable() {
        let a = Relay::new();
        let mut scheduler = Scheduler::new();
        scheduler.add_agent(a.clone());

        a.borrow_mut().feed(json!(1));
        scheduler.step_all().unwrap();
        let steps = scheduler.step_counter();

        scheduler.step_all().unwrap();
        assert_eq!(scheduler.step_counter(), steps);
    }

    #[test]
    fn test_feed_after_quiescence_resumes() {
        let a = Relay::new();
        let mut scheduler = Scheduler::new();
        scheduler.add_agent(a.clone());

        a.borrow_mut().feed(json!(1));
        scheduler.step_all().unwrap();

        a.borrow_mut().feed(json!(2));
        scheduler.step_all().unwrap();
        assert_eq!(a.borrow().seen, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_error_collected_and_cursor_advances() {
        let bad = Rc::new(RefCell::new(Exploder {
            core: AgentCore::new("Exploder"),
        }));
        let good = Relay::new();

        let mut scheduler = Scheduler::new();
        scheduler.add_agent(bad.clone());
        scheduler.add_agent(good.clone());

        bad.borrow_mut().feed(json!("boom"));
        good.borrow_mut().feed(json!("fine"));
        scheduler.step_all().unwrap();

        assert_eq!(scheduler.errors().len(), 1);
        let error = &scheduler.errors()[0];
        assert_eq!(error.agent_kind, "Exploder");
        assert_eq!(error.step, 1);
        assert_eq!(error.offending.as_ref().unwrap().message, json!("boom"));
        // The healthy agent still ran.
        assert_eq!(good.borrow().seen, vec![json!("fine")]);
    }

    #[test]
    fn test_fail_policy_returns_error() {
        let bad = Rc::new(RefCell::new(Exploder {
            core: AgentCore::new("Exploder"),
        }));
        let mut scheduler = Scheduler::with_config(
            SchedulerConfig::new().with_error_policy(ErrorPolicy::Fail),
        );
        scheduler.add_agent(bad.clone());

        bad.borrow_mut().feed(json!(0));
        let err = scheduler.step_all().unwrap_err();
        assert!(matches!(err, PipelineError::Scheduler(_)));
        // Cursor advanced past the failure even so.
        assert_eq!(scheduler.agent_idx(), 0);
        assert_eq!(scheduler.step_counter(), 1);
    }

    #[test]
    fn test_empty_scheduler_is_trivially_quiescent() {
        let mut scheduler = Scheduler::new();
        scheduler.step_all().unwrap();
        assert_eq!(scheduler.step_counter(), 0);
    }

    #[test]
    fn test_error_snapshot_written() {
        let dir = tempfile::tempdir().unwrap();
        let bad = Rc::new(RefCell::new(Exploder {
            core: AgentCore::new("Exploder"),
        }));

        let mut scheduler = Scheduler::with_config(
            SchedulerConfig::new().with_error_dir(dir.path()),
        );
        scheduler.add_agent(bad.clone());

        bad.borrow_mut().feed(json!(1));
        scheduler.step_all().unwrap();

        let step_1 = step_dir(dir.path(), 1);
        assert!(is_complete_step_dir(&step_1));
        let report: ErrorReport = read_json(&error_file(&step_1)).unwrap();
        assert_eq!(report.agent_kind, "Exploder");
        assert_eq!(report.kind, "agent");
        assert!(report.offending.is_some());
    }

    #[test]
    fn test_load_rejects_mismatched_registration() {
        let dir = tempfile::tempdir().unwrap();

        let a = Relay::new();
        let mut scheduler = Scheduler::new();
        scheduler.add_agent(a.clone());
        scheduler.save_state(dir.path()).unwrap();

        // A fresh pipeline with a different agent list must not load.
        let b = Relay::new();
        let mut other = Scheduler::new();
        other.add_agent(b.clone());
        let err = other.load_state(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Checkpoint(CheckpointError::AgentMismatch(_))
        ));
    }
}
