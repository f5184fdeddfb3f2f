//! Serializable workspace snapshots
//!
//! A [`WorkspaceSnapshot`] carries everything needed to rebuild a job: the
//! job config, every node's persistent fields and the edges. Transient
//! machine state (run results, current state, last request) and the
//! highlighted `rich` text are not persisted.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::NodeGraph;
use crate::job::{Job, JobConfig};
use crate::task_node::{TaskNode, TaskNodeEvent};
use crate::types::{Edge, MockConfig, NodeId, Position, TaskKind, TaskSpecific};

/// Current snapshot format
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Persistent part of one task node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub custom_id: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub task_specific: TaskSpecific,
    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub position: Position,
}

impl From<&TaskNode> for NodeSnapshot {
    fn from(node: &TaskNode) -> Self {
        Self {
            id: node.id().to_string(),
            custom_id: node.custom_id().to_string(),
            kind: node.kind(),
            task_specific: node.task_specific().clone(),
            mock: node.mock().clone(),
            position: node.position(),
        }
    }
}

/// Id counters, kept so restored graphs never reissue a used id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdCounters {
    pub nodes_added: u64,
    pub edges_added: u64,
}

/// A job captured for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSnapshot {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub config: JobConfig,
    #[serde(default)]
    pub nodes: Vec<NodeSnapshot>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub counters: IdCounters,
}

fn default_format_version() -> u32 {
    SNAPSHOT_FORMAT_VERSION
}

impl WorkspaceSnapshot {
    /// Capture a job
    pub fn capture(job: &Job) -> Self {
        let (nodes_added, edges_added) = job.graph.counters();
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            config: job.config.clone(),
            nodes: job.graph.nodes().iter().map(NodeSnapshot::from).collect(),
            edges: job.graph.edges().to_vec(),
            counters: IdCounters {
                nodes_added,
                edges_added,
            },
        }
    }

    /// Rebuild the job.
    ///
    /// Nodes are revalidated and their incoming/outgoing lists are rebuilt
    /// from the edges, so every node comes back `idle` with no run result.
    pub fn restore(&self) -> Result<Job> {
        let mut nodes: Vec<TaskNode> = self
            .nodes
            .iter()
            .map(|snapshot| {
                let mut node = TaskNode::new(
                    snapshot.id.clone(),
                    snapshot.custom_id.clone(),
                    snapshot.kind,
                    snapshot.position,
                );
                node.send(TaskNodeEvent::ResetTaskSpecific(snapshot.task_specific.clone()));
                node.send(TaskNodeEvent::SetMock(snapshot.mock.clone()));
                node
            })
            .collect();

        let mut edges = Vec::with_capacity(self.edges.len());
        for edge in &self.edges {
            let custom_id = |id: &str| {
                nodes
                    .iter()
                    .find(|n| n.id() == id)
                    .map(|n| n.custom_id().to_string())
            };
            // Edges naming unknown nodes are rejected by NodeGraph::from_parts
            let (Some(source_custom_id), Some(target_custom_id)) = (custom_id(&edge.source), custom_id(&edge.target))
            else {
                edges.push(edge.clone());
                continue;
            };
            for node in nodes.iter_mut() {
                if node.id() == edge.source {
                    node.send(TaskNodeEvent::AddOutgoingNode(target_custom_id.clone()));
                }
                if node.id() == edge.target {
                    node.send(TaskNodeEvent::AddIncomingNode(source_custom_id.clone()));
                }
            }
            edges.push(Edge {
                source_custom_id,
                target_custom_id,
                ..edge.clone()
            });
        }

        let graph = NodeGraph::from_parts(
            nodes,
            edges,
            (self.counters.nodes_added, self.counters.edges_added),
        )?;
        Ok(Job {
            config: self.config.clone(),
            graph,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PipelineBuilder;
    use crate::compiler::compile_job;
    use crate::error::EngineError;
    use crate::evaluator::EvaluationResponse;
    use crate::job::JobType;
    use crate::vars::VarSnapshot;

    fn job() -> Job {
        let mut job = Job::new(JobType::Cron);
        job.config.name = Some("ticker".into());
        job.graph = PipelineBuilder::new()
            .add_task("fetch", TaskKind::Http)
            .with_field("url", "https://x/y")
            .with_mock(r#"{"page":2}"#)
            .add_task("parse", TaskKind::JsonParse)
            .with_field("data", "$(fetch)")
            .with_field("path", "page")
            .connect("fetch", "parse")
            .build();
        job
    }

    #[test]
    fn test_restore_reproduces_document() {
        let original = job();
        let json = WorkspaceSnapshot::capture(&original).to_json().unwrap();
        assert!(!json.contains("<var>"));

        let restored = WorkspaceSnapshot::from_json(&json).unwrap().restore().unwrap();
        assert_eq!(compile_job(&restored).to_text(), compile_job(&original).to_text());
        assert_eq!(restored.graph.node_by_custom_id("parse").unwrap().incoming_nodes(), ["fetch"]);
        assert_eq!(restored.graph.node_by_custom_id("fetch").unwrap().outgoing_nodes(), ["parse"]);
        assert_eq!(restored.graph.counters(), original.graph.counters());
    }

    #[test]
    fn test_restore_drops_run_results() {
        let mut original = job();
        let parse = original.graph.resolve_custom_id("parse").unwrap().clone();
        original.graph.send(&parse, TaskNodeEvent::SetPendingRun).unwrap();
        original
            .graph
            .send(
                &parse,
                TaskNodeEvent::TryRun {
                    inputs: vec![],
                    vars: VarSnapshot::new(),
                },
            )
            .unwrap();
        original
            .graph
            .send(
                &parse,
                TaskNodeEvent::EvaluationSettled(EvaluationResponse::value(serde_json::json!(2))),
            )
            .unwrap();
        assert!(original.graph.node(&parse).unwrap().run_result().is_some());

        let restored = WorkspaceSnapshot::capture(&original).restore().unwrap();
        let node = restored.graph.node(&parse).unwrap();
        assert!(node.run_result().is_none());
        assert!(node.last_request().is_none());
    }

    #[test]
    fn test_restore_rejects_dangling_edge() {
        let mut snapshot = WorkspaceSnapshot::capture(&job());
        snapshot.edges[0].target = "node_99".into();
        assert!(matches!(snapshot.restore(), Err(EngineError::UnknownEdge(_))));
    }
}
