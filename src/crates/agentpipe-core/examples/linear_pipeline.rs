//! A three-stage pipeline: normalize -> enrich -> collect
//!
//! Run with: cargo run --example linear_pipeline

use std::cell::RefCell;
use std::rc::Rc;

use agentpipe_core::agent::{Agent, AgentCore, StepOutput};
use agentpipe_core::error::Result;
use agentpipe_core::message::Message;
use agentpipe_core::render_pipeline;
use agentpipe_core::scheduler::Scheduler;
use serde_json::json;

struct Normalize {
    core: AgentCore,
}

impl Agent for Normalize {
    fn core(&self) -> &AgentCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }
    fn run(&mut self, message: Message) -> Result<StepOutput> {
        let text = message.as_str().unwrap_or_default().trim().to_lowercase();
        Ok(StepOutput::Single(json!(text)))
    }
}

struct WordCount {
    core: AgentCore,
}

impl Agent for WordCount {
    fn core(&self) -> &AgentCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }
    fn run(&mut self, message: Message) -> Result<StepOutput> {
        let text = message.as_str().unwrap_or_default();
        Ok(StepOutput::Single(json!({
            "text": text,
            "words": text.split_whitespace().count(),
        })))
    }
}

fn main() -> Result<()> {
    let normalize = Rc::new(RefCell::new(Normalize {
        core: AgentCore::new("Normalize"),
    }));
    let count = Rc::new(RefCell::new(WordCount {
        core: AgentCore::new("WordCount"),
    }));

    let count_in = count.borrow().core().default_endpoint();
    normalize.borrow_mut().connect_to(count_in, None, None);

    let mut scheduler = Scheduler::new();
    scheduler.add_agent(normalize.clone());
    scheduler.add_agent(count.clone());

    println!("{}", render_pipeline(&scheduler));

    normalize.borrow_mut().feed(json!("  The Quick Brown Fox  "));
    scheduler.step_all()?;

    let count = count.borrow();
    for envelope in count.core().output().unconnected() {
        println!("{} (provenance depth {})", envelope.message, envelope.parents.len());
    }
    Ok(())
}
