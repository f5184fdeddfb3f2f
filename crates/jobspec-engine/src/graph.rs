//! Node graph and identity management
//!
//! Nodes are addressed two ways: a stable id (`node_<n>`) assigned at
//! creation and never changed, and a user-editable custom id that names the
//! node in the observation source and in `$(...)` references. The graph keeps
//! a uniqueness-checked index from custom id to stable id, rebuilt on every
//! rename.
//!
//! Nodes never touch each other directly: every structural change is
//! delivered to the affected nodes as reference events.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::catalog::descriptor;
use crate::error::{EngineError, Result};
use crate::task_node::{TaskNode, TaskNodeEffect, TaskNodeEvent};
use crate::types::{is_valid_identifier, Edge, EdgeId, MockConfig, NodeId, Position, TaskKind};
use crate::vars::rename_references;

/// Which end of the new edge the newly added node sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRole {
    /// The new node is the edge's source: `new -> adjacent`
    Source,
    /// The new node is the edge's target: `adjacent -> new`
    Target,
}

/// Connect a node to an existing one as it is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeContext {
    pub adjacent: NodeId,
    pub role: EdgeRole,
}

impl EdgeContext {
    /// The new node consumes the output of `adjacent`
    pub fn after(adjacent: impl Into<NodeId>) -> Self {
        Self {
            adjacent: adjacent.into(),
            role: EdgeRole::Target,
        }
    }

    /// The new node feeds into `adjacent`
    pub fn before(adjacent: impl Into<NodeId>) -> Self {
        Self {
            adjacent: adjacent.into(),
            role: EdgeRole::Source,
        }
    }
}

/// What happens to `$(old)` tokens in other nodes' fields on rename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenamePolicy {
    /// Edges and reference lists follow the rename; field text is untouched
    #[default]
    Preserve,
    /// Also rewrite `$(old...)` tokens in every node's fields
    RewriteReferences,
}

/// The task graph owned by a job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGraph {
    /// Nodes in insertion order
    nodes: Vec<TaskNode>,
    edges: Vec<Edge>,
    /// Custom id -> stable id
    custom_index: HashMap<String, NodeId>,
    total_nodes_added: u64,
    total_edges_added: u64,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn node_by_custom_id(&self, custom_id: &str) -> Option<&TaskNode> {
        self.custom_index.get(custom_id).and_then(|id| self.node(id))
    }

    /// Stable id for a custom id
    pub fn resolve_custom_id(&self, custom_id: &str) -> Option<&NodeId> {
        self.custom_index.get(custom_id)
    }

    pub fn contains_custom_id(&self, custom_id: &str) -> bool {
        self.custom_index.contains_key(custom_id)
    }

    /// Counters used for the next stable node and edge ids
    pub fn counters(&self) -> (u64, u64) {
        (self.total_nodes_added, self.total_edges_added)
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut TaskNode> {
        self.nodes
            .iter_mut()
            .find(|n| n.id() == id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_string()))
    }

    fn require(&self, id: &str) -> Result<&TaskNode> {
        self.node(id).ok_or_else(|| EngineError::UnknownNode(id.to_string()))
    }

    /// Deliver an event to one node
    pub fn send(&mut self, id: &str, event: TaskNodeEvent) -> Result<Option<TaskNodeEffect>> {
        Ok(self.node_mut(id)?.send(event))
    }

    /// Smallest `task_<n>` (n >= 1) not yet used as a custom id
    pub fn next_custom_id(&self) -> String {
        (1..)
            .map(|n| format!("task_{}", n))
            .find(|candidate| !self.custom_index.contains_key(candidate))
            .unwrap_or_else(|| format!("task_{}", self.total_nodes_added + 1))
    }

    /// Add a node with a default custom id.
    ///
    /// With an edge context the new node is connected to `adjacent` in the
    /// same step, and both ends receive the reciprocal reference event.
    pub fn add_node(
        &mut self,
        kind: TaskKind,
        position: Position,
        edge_context: Option<EdgeContext>,
    ) -> Result<NodeId> {
        let custom_id = self.next_custom_id();
        self.add_node_with_custom_id(kind, custom_id, position, edge_context)
    }

    /// Add a node with a caller-chosen custom id
    pub fn add_node_with_custom_id(
        &mut self,
        kind: TaskKind,
        custom_id: impl Into<String>,
        position: Position,
        edge_context: Option<EdgeContext>,
    ) -> Result<NodeId> {
        let custom_id = custom_id.into();
        self.check_custom_id(&custom_id, None)?;
        if let Some(ctx) = &edge_context {
            self.require(&ctx.adjacent)?;
        }

        self.total_nodes_added += 1;
        let id = format!("node_{}", self.total_nodes_added);
        self.nodes.push(TaskNode::new(id.clone(), custom_id.clone(), kind, position));
        self.custom_index.insert(custom_id, id.clone());

        if let Some(ctx) = edge_context {
            let (source, target) = match ctx.role {
                EdgeRole::Source => (id.clone(), ctx.adjacent),
                EdgeRole::Target => (ctx.adjacent, id.clone()),
            };
            self.insert_edge(&source, &target)?;
        }
        log::debug!("Added {} node {}", kind, id);
        Ok(id)
    }

    /// Connect two nodes by stable id.
    ///
    /// Rejects self-loops, duplicate edges and edges that would close a cycle.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<EdgeId> {
        let source_custom = self.require(source)?.custom_id().to_string();
        let target_custom = self.require(target)?.custom_id().to_string();

        let invalid = |reason: &str| EngineError::InvalidEdge {
            source_id: source_custom.clone(),
            target_id: target_custom.clone(),
            reason: reason.to_string(),
        };
        if source == target {
            return Err(invalid("a task cannot feed itself"));
        }
        if self.edges.iter().any(|e| e.source == source && e.target == target) {
            return Err(invalid("edge already exists"));
        }
        if self.reaches(target, source) {
            return Err(EngineError::CycleDetected {
                source_id: source_custom,
                target_id: target_custom,
            });
        }
        self.insert_edge(source, target)
    }

    /// Connect two nodes by custom id
    pub fn connect_custom(&mut self, source: &str, target: &str) -> Result<EdgeId> {
        let source = self
            .resolve_custom_id(source)
            .cloned()
            .ok_or_else(|| EngineError::UnknownNode(source.to_string()))?;
        let target = self
            .resolve_custom_id(target)
            .cloned()
            .ok_or_else(|| EngineError::UnknownNode(target.to_string()))?;
        self.connect(&source, &target)
    }

    fn insert_edge(&mut self, source: &str, target: &str) -> Result<EdgeId> {
        let source_custom = self.require(source)?.custom_id().to_string();
        let target_custom = self.require(target)?.custom_id().to_string();

        self.total_edges_added += 1;
        let id = format!("edge_{}", self.total_edges_added);
        self.edges.push(Edge {
            id: id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            source_custom_id: source_custom.clone(),
            target_custom_id: target_custom.clone(),
        });

        self.send(source, TaskNodeEvent::AddOutgoingNode(target_custom))?;
        self.send(target, TaskNodeEvent::AddIncomingNode(source_custom))?;
        Ok(id)
    }

    /// Remove an edge, notifying both endpoints
    pub fn disconnect(&mut self, edge_id: &str) -> Result<Edge> {
        let idx = self
            .edges
            .iter()
            .position(|e| e.id == edge_id)
            .ok_or_else(|| EngineError::UnknownEdge(edge_id.to_string()))?;
        let edge = self.edges.remove(idx);
        self.send(&edge.source, TaskNodeEvent::RemoveOutgoingNode(edge.target_custom_id.clone()))?;
        self.send(&edge.target, TaskNodeEvent::RemoveIncomingNode(edge.source_custom_id.clone()))?;
        Ok(edge)
    }

    /// Rename a node, leaving `$(old)` tokens in field text untouched
    pub fn rename_node(&mut self, id: &str, new_custom_id: &str) -> Result<()> {
        self.rename_node_with(id, new_custom_id, RenamePolicy::Preserve)
    }

    /// Rename a node.
    ///
    /// The rename is atomic: a duplicate or malformed id leaves the graph
    /// unchanged. On success the new id is propagated into every edge and
    /// every neighbour's incoming/outgoing list.
    pub fn rename_node_with(&mut self, id: &str, new_custom_id: &str, policy: RenamePolicy) -> Result<()> {
        let old = self.require(id)?.custom_id().to_string();
        if old == new_custom_id {
            return Ok(());
        }
        self.check_custom_id(new_custom_id, Some(id))?;

        self.send(id, TaskNodeEvent::SetCustomId(new_custom_id.to_string()))?;
        self.custom_index.remove(&old);
        self.custom_index.insert(new_custom_id.to_string(), id.to_string());

        for edge in &mut self.edges {
            if edge.source == id {
                edge.source_custom_id = new_custom_id.to_string();
            }
            if edge.target == id {
                edge.target_custom_id = new_custom_id.to_string();
            }
        }
        for node in self.nodes.iter_mut().filter(|n| n.id() != id) {
            node.send(TaskNodeEvent::RenameReference {
                from: old.clone(),
                to: new_custom_id.to_string(),
            });
        }

        if policy == RenamePolicy::RewriteReferences {
            for node in &mut self.nodes {
                let rewrites: Vec<(String, String)> = node
                    .task_specific()
                    .iter()
                    .filter_map(|(key, value)| {
                        let rewritten = rename_references(&value.raw, &old, new_custom_id);
                        (rewritten != value.raw).then(|| (key.clone(), rewritten))
                    })
                    .collect();
                if !rewrites.is_empty() {
                    node.send(TaskNodeEvent::SetTaskSpecificProps(rewrites));
                }
            }
        }
        log::debug!("Renamed task '{}' to '{}'", old, new_custom_id);
        Ok(())
    }

    /// Delete a node and every edge touching it.
    ///
    /// Returns the stable ids of the formerly adjacent nodes, each of which
    /// has been told to drop its reference. Dependents are not deleted.
    pub fn delete_node(&mut self, id: &str) -> Result<Vec<NodeId>> {
        let idx = self
            .nodes
            .iter()
            .position(|n| n.id() == id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_string()))?;
        let removed = self.nodes.remove(idx);
        self.custom_index.remove(removed.custom_id());

        let (touching, kept): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|e| e.source == id || e.target == id);
        self.edges = kept;

        let mut notified = Vec::new();
        for edge in touching {
            if edge.source == id {
                self.send(&edge.target, TaskNodeEvent::RemoveIncomingNode(edge.source_custom_id))?;
                notified.push(edge.target);
            } else {
                self.send(&edge.source, TaskNodeEvent::RemoveOutgoingNode(edge.target_custom_id))?;
                notified.push(edge.source);
            }
        }
        notified.dedup();
        log::debug!("Deleted task '{}', notified {:?}", removed.custom_id(), notified);
        Ok(notified)
    }

    /// Change a node's kind, keeping identity, position and edges.
    ///
    /// Fields are reset to the new kind's defaults.
    pub fn replace_node_type(&mut self, id: &str, kind: TaskKind) -> Result<()> {
        self.node_mut(id)?.replace_kind(kind);
        log::debug!("Replaced type of {} with {}", id, descriptor(kind).label);
        Ok(())
    }

    /// Set field raw values on a node
    pub fn set_task_fields<I, K, V>(&mut self, id: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let props = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.send(id, TaskNodeEvent::SetTaskSpecificProps(props))?;
        Ok(())
    }

    pub fn set_mock(&mut self, id: &str, mock: MockConfig) -> Result<()> {
        self.send(id, TaskNodeEvent::SetMock(mock))?;
        Ok(())
    }

    pub fn set_position(&mut self, id: &str, position: Position) -> Result<()> {
        self.node_mut(id)?.set_position(position);
        Ok(())
    }

    /// Return every node to `idle`, dropping run results
    pub fn reset_all(&mut self) {
        for node in &mut self.nodes {
            node.send(TaskNodeEvent::Reset);
        }
    }

    /// Rebuild a graph from restored parts; counters are raised to cover the ids present
    pub(crate) fn from_parts(nodes: Vec<TaskNode>, edges: Vec<Edge>, counters: (u64, u64)) -> Result<Self> {
        let mut custom_index = HashMap::new();
        for node in &nodes {
            if custom_index
                .insert(node.custom_id().to_string(), node.id().to_string())
                .is_some()
            {
                return Err(EngineError::DuplicateIdentifier(node.custom_id().to_string()));
            }
        }
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id()).collect();
        if let Some(edge) = edges
            .iter()
            .find(|e| !ids.contains(e.source.as_str()) || !ids.contains(e.target.as_str()))
        {
            return Err(EngineError::UnknownEdge(edge.id.clone()));
        }

        let node_counter = counters.0.max(max_suffix(nodes.iter().map(|n| n.id()), "node_"));
        let edge_counter = counters.1.max(max_suffix(edges.iter().map(|e| e.id.as_str()), "edge_"));

        Ok(Self {
            nodes,
            edges,
            custom_index,
            total_nodes_added: node_counter,
            total_edges_added: edge_counter,
        })
    }

    fn check_custom_id(&self, custom_id: &str, owner: Option<&str>) -> Result<()> {
        if !is_valid_identifier(custom_id) {
            return Err(EngineError::InvalidIdentifier(custom_id.to_string()));
        }
        match self.custom_index.get(custom_id) {
            Some(holder) if Some(holder.as_str()) != owner => {
                Err(EngineError::DuplicateIdentifier(custom_id.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Whether `to` is reachable from `from` along edges
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            for edge in self.edges.iter().filter(|e| e.source == current) {
                queue.push_back(edge.target.as_str());
            }
        }
        false
    }
}

/// Largest `n` among ids of the form `<prefix><n>`
fn max_suffix<'a>(ids: impl Iterator<Item = &'a str>, prefix: &str) -> u64 {
    ids.filter_map(|id| id.strip_prefix(prefix)?.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}
