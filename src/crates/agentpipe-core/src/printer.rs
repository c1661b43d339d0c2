//! Pipeline rendering
//!
//! Two views of the wiring graph, both pure data traversals:
//!
//! - [`render_pipeline`] - an ASCII tree for quick console inspection
//! - [`PipelineGraph`] - a serializable node/edge description for external
//!   renderers, with a DOT/Graphviz export ([`PipelineGraph::to_dot`])
//!
//! Rendering is total and stable: every registered agent appears (sinks
//! included), agents in registration order, connections in declaration
//! order. Instance labels are `<Kind>#<n>` with `n` counting registration
//! order per kind.
//!
//! ```text
//! FetchAgent#0
//!   ├─▶ ParseAgent#0
//!   └─▶ JoinAgent#0@meta
//! ParseAgent#0
//!   └─▶ JoinAgent#0@text
//! JoinAgent#0
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::port::DEFAULT_INPUT;
use crate::scheduler::Scheduler;

/// A rendered agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Agent uuid
    pub uuid: Uuid,
    /// Agent kind
    pub kind: String,
    /// Display label, `<Kind>#<n>`
    pub label: String,
}

/// A rendered connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source agent uuid
    pub source: Uuid,
    /// Target agent uuid
    pub target: Uuid,
    /// Target input port name
    pub target_port: String,
    /// Whether the connection carries a transformer
    pub transformed: bool,
    /// Whether the connection carries a condition
    pub conditional: bool,
}

/// A structured description of the wiring graph
///
/// This is what an external renderer receives; [`to_dot`]
/// (PipelineGraph::to_dot) is the built-in export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineGraph {
    /// Agents in registration order
    pub nodes: Vec<GraphNode>,
    /// Connections in declaration order, grouped by source
    pub edges: Vec<GraphEdge>,
}

impl PipelineGraph {
    /// Capture the wiring of every registered agent
    pub fn from_scheduler(scheduler: &Scheduler) -> Self {
        let mut kind_counts: HashMap<String, usize> = HashMap::new();
        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        for agent in scheduler.agents() {
            let agent = agent.borrow();
            let core = agent.core();
            let kind = core.kind().to_string();
            let instance = {
                let n = kind_counts.entry(kind.clone()).or_insert(0);
                let current = *n;
                *n += 1;
                current
            };
            nodes.push(GraphNode {
                uuid: core.uuid(),
                kind: kind.clone(),
                label: format!("{kind}#{instance}"),
            });

            for conn in core.output().connections() {
                edges.push(GraphEdge {
                    source: core.uuid(),
                    target: conn.target_uuid(),
                    target_port: conn.target_port().to_string(),
                    transformed: conn.has_transformer(),
                    conditional: conn.has_condition(),
                });
            }
        }
        Self { nodes, edges }
    }

    /// DOT/Graphviz rendering
    ///
    /// Conditional connections are dashed; named input targets are edge
    /// labels. Render with `dot -Tpng pipeline.dot -o pipeline.png`.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n");
        for node in &self.nodes {
            let _ = writeln!(out, "    \"{}\" [label=\"{}\"];", node.uuid, node.label);
        }
        for edge in &self.edges {
            let mut attrs = Vec::new();
            if edge.target_port != DEFAULT_INPUT {
                attrs.push(format!("label=\"@{}\"", edge.target_port));
            }
            if edge.conditional {
                attrs.push("style=dashed".to_string());
            }
            let attrs = if attrs.is_empty() {
                String::new()
            } else {
                format!(" [{}]", attrs.join(", "))
            };
            let _ = writeln!(out, "    \"{}\" -> \"{}\"{};", edge.source, edge.target, attrs);
        }
        out.push_str("}\n");
        out
    }
}

/// ASCII tree of the wiring graph, one block per registered agent
pub fn render_pipeline(scheduler: &Scheduler) -> String {
    let graph = PipelineGraph::from_scheduler(scheduler);
    let labels: HashMap<Uuid, &str> = graph
        .nodes
        .iter()
        .map(|n| (n.uuid, n.label.as_str()))
        .collect();

    let mut out = String::new();
    for node in &graph.nodes {
        out.push_str(&node.label);
        out.push('\n');

        let outgoing: Vec<&GraphEdge> =
            graph.edges.iter().filter(|e| e.source == node.uuid).collect();
        for (i, edge) in outgoing.iter().enumerate() {
            let branch = if i + 1 == outgoing.len() {
                "└─▶"
            } else {
                "├─▶"
            };
            // Connections may point at an unregistered agent; render a
            // placeholder rather than omitting the edge.
            let target = labels.get(&edge.target).copied().unwrap_or("<unregistered>");
            let port = if edge.target_port == DEFAULT_INPUT {
                String::new()
            } else {
                format!("@{}", edge.target_port)
            };
            let _ = writeln!(out, "  {branch} {target}{port}");
        }
    }
    out
}
