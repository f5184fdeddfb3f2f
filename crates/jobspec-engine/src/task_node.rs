//! Per-node execution state machine
//!
//! Each [`TaskNode`] owns its own context (fields, references, mock, last
//! result) and changes only through [`TaskNode::send`]. A transition may
//! produce a [`TaskNodeEffect`] that the owner (graph or simulator) acts on:
//! evaluating a request, prompting for a side-effect decision, or recording a
//! settled result. Events the current state does not accept are ignored.
//!
//! ```text
//! idle --SET_PENDING_RUN--> pendingRun --TRY_RUN--> running --settle--> success | error
//!                                      \
//!                                       (side effect) pendingSideEffect
//!                                          --EXECUTE--> executingSideEffect --settle--> success | error
//!                                          --SKIP-----> success | error
//! success | error --RESET--> idle
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{descriptor, FieldStyle};
use crate::evaluator::{EvaluationRequest, EvaluationResponse};
use crate::types::{FieldValue, MockConfig, NodeId, Position, TaskKind, TaskRunResult, TaskSpecific};
use crate::validation::{validate_task_fields, FieldError};
use crate::vars::{resolve_field, VarSnapshot};

/// Lifecycle state of a task node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeState {
    #[default]
    Idle,
    PendingRun,
    Running,
    PendingSideEffect,
    ExecutingSideEffect,
    Success,
    Error,
}

impl NodeState {
    /// Whether the node has a settled run result
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Events a task node accepts
#[derive(Debug, Clone, PartialEq)]
pub enum TaskNodeEvent {
    /// Set (or add) field raw values; other fields are left untouched
    SetTaskSpecificProps(Vec<(String, String)>),
    /// Replace all fields, e.g. after a type change
    ResetTaskSpecific(TaskSpecific),
    SetMock(MockConfig),
    SetCustomId(String),
    AddIncomingNode(String),
    AddOutgoingNode(String),
    RemoveIncomingNode(String),
    RemoveOutgoingNode(String),
    /// A neighbour was renamed
    RenameReference { from: String, to: String },
    SetPendingRun,
    TryRun { inputs: Vec<Value>, vars: VarSnapshot },
    /// The evaluator answered for the in-flight request
    EvaluationSettled(EvaluationResponse),
    ExecuteSideEffect,
    SkipSideEffect,
    Reset,
}

/// Work a transition asks the owner to perform
#[derive(Debug, Clone, PartialEq)]
pub enum TaskNodeEffect {
    /// Evaluate the request and send back `EvaluationSettled`
    Evaluate(EvaluationRequest),
    /// Ask the user to run the real side effect or use the stored mock
    PromptSideEffect(EvaluationRequest),
    /// The node reached success or error
    Settled(TaskRunResult),
}

/// A pipeline task and its execution context
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    id: NodeId,
    custom_id: String,
    kind: TaskKind,
    task_specific: TaskSpecific,
    incoming_nodes: Vec<String>,
    outgoing_nodes: Vec<String>,
    position: Position,
    mock: MockConfig,
    state: NodeState,
    field_errors: Vec<FieldError>,
    run_result: Option<TaskRunResult>,
    last_request: Option<EvaluationRequest>,
}

impl TaskNode {
    /// Create an idle node with the kind's default fields
    pub fn new(id: impl Into<NodeId>, custom_id: impl Into<String>, kind: TaskKind, position: Position) -> Self {
        let mut node = Self {
            id: id.into(),
            custom_id: custom_id.into(),
            kind,
            task_specific: descriptor(kind).defaults(),
            incoming_nodes: Vec::new(),
            outgoing_nodes: Vec::new(),
            position,
            mock: MockConfig::default(),
            state: NodeState::Idle,
            field_errors: Vec::new(),
            run_result: None,
            last_request: None,
        };
        node.revalidate();
        node
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn custom_id(&self) -> &str {
        &self.custom_id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn task_specific(&self) -> &TaskSpecific {
        &self.task_specific
    }

    /// Raw value of a field, empty if unset
    pub fn field(&self, key: &str) -> &str {
        self.task_specific.get(key).map(|v| v.raw.as_str()).unwrap_or("")
    }

    pub fn incoming_nodes(&self) -> &[String] {
        &self.incoming_nodes
    }

    pub fn outgoing_nodes(&self) -> &[String] {
        &self.outgoing_nodes
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn mock(&self) -> &MockConfig {
        &self.mock
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.field_errors.is_empty()
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    pub fn run_result(&self) -> Option<&TaskRunResult> {
        self.run_result.as_ref()
    }

    /// The last request this node produced, with resolved options
    pub fn last_request(&self) -> Option<&EvaluationRequest> {
        self.last_request.as_ref()
    }

    /// Change the node's kind in place, resetting fields to the new defaults
    pub(crate) fn replace_kind(&mut self, kind: TaskKind) {
        self.kind = kind;
        self.send(TaskNodeEvent::ResetTaskSpecific(descriptor(kind).defaults()));
    }

    /// Apply an event, returning the effect of the transition if any
    pub fn send(&mut self, event: TaskNodeEvent) -> Option<TaskNodeEffect> {
        use NodeState::*;
        use TaskNodeEvent::*;

        match (self.state, event) {
            (_, SetTaskSpecificProps(props)) => {
                for (key, raw) in props {
                    self.task_specific.insert(key, FieldValue::new(raw));
                }
                self.revalidate();
                None
            }
            (_, ResetTaskSpecific(fields)) => {
                self.task_specific = fields;
                self.revalidate();
                None
            }
            (_, SetMock(mock)) => {
                self.mock = mock;
                None
            }
            (_, SetCustomId(custom_id)) => {
                self.custom_id = custom_id;
                self.run_result = None;
                None
            }
            (_, AddIncomingNode(id)) => {
                if !self.incoming_nodes.contains(&id) {
                    self.incoming_nodes.push(id);
                    self.run_result = None;
                }
                None
            }
            (_, RemoveIncomingNode(id)) => {
                let before = self.incoming_nodes.len();
                self.incoming_nodes.retain(|n| n != &id);
                if self.incoming_nodes.len() != before {
                    self.run_result = None;
                }
                None
            }
            (_, AddOutgoingNode(id)) => {
                if !self.outgoing_nodes.contains(&id) {
                    self.outgoing_nodes.push(id);
                }
                None
            }
            (_, RemoveOutgoingNode(id)) => {
                self.outgoing_nodes.retain(|n| n != &id);
                None
            }
            (_, RenameReference { from, to }) => {
                for list in [&mut self.incoming_nodes, &mut self.outgoing_nodes] {
                    for entry in list.iter_mut().filter(|entry| **entry == from) {
                        *entry = to.clone();
                    }
                }
                None
            }
            (_, Reset) => {
                self.state = Idle;
                self.run_result = None;
                self.last_request = None;
                None
            }
            (Idle, SetPendingRun) => {
                self.state = PendingRun;
                None
            }
            (PendingRun, TryRun { inputs, vars }) => {
                let request = self.build_request(inputs, &vars);
                self.last_request = Some(request.clone());
                if self.kind.is_side_effect() {
                    self.state = PendingSideEffect;
                    Some(TaskNodeEffect::PromptSideEffect(request))
                } else {
                    self.state = Running;
                    Some(TaskNodeEffect::Evaluate(request))
                }
            }
            (PendingSideEffect, ExecuteSideEffect) => {
                self.state = ExecutingSideEffect;
                self.last_request.clone().map(TaskNodeEffect::Evaluate)
            }
            (PendingSideEffect, SkipSideEffect) => {
                let response = match self.mock.value() {
                    Some(value) => EvaluationResponse::value(value),
                    None => EvaluationResponse::error("no stored mock response to use"),
                };
                Some(self.settle(response))
            }
            (Running, EvaluationSettled(response)) => Some(self.settle(response)),
            (ExecutingSideEffect, EvaluationSettled(response)) => {
                if response.error.is_none() {
                    self.mock = MockConfig::new(payload_text(&response.value));
                }
                Some(self.settle(response))
            }
            (state, event) => {
                log::debug!(
                    "Task '{}' ignored {} in state {:?}",
                    self.custom_id,
                    event_name(&event),
                    state
                );
                None
            }
        }
    }

    fn settle(&mut self, response: EvaluationResponse) -> TaskNodeEffect {
        let mut vars = if response.vars.is_empty() {
            self.last_request
                .as_ref()
                .map(|r| r.variables.clone())
                .unwrap_or_default()
        } else {
            response.vars
        };

        let result = match response.error {
            Some(error) => {
                self.state = NodeState::Error;
                TaskRunResult::failure(self.custom_id.clone(), error, vars)
            }
            None => {
                self.state = NodeState::Success;
                vars.insert(self.custom_id.clone(), response.value.clone());
                TaskRunResult::success(self.custom_id.clone(), response.value, vars)
            }
        };
        self.run_result = Some(result.clone());
        TaskNodeEffect::Settled(result)
    }

    fn build_request(&self, inputs: Vec<Value>, vars: &VarSnapshot) -> EvaluationRequest {
        let mut options = Map::new();
        for spec in descriptor(self.kind).fields {
            let raw = self.field(spec.key);
            let value = if spec.style == FieldStyle::IncomingArray && raw.trim().is_empty() {
                let refs: Vec<String> = self.incoming_nodes.iter().map(|id| format!("$({})", id)).collect();
                resolve_field(&refs.join(","), spec.style, vars)
            } else {
                resolve_field(raw, spec.style, vars)
            };
            options.insert(spec.key.to_string(), value);
        }
        for (key, value) in &self.task_specific {
            if !options.contains_key(key) {
                options.insert(key.clone(), resolve_field(&value.raw, FieldStyle::Quoted, vars));
            }
        }

        EvaluationRequest {
            id: self.custom_id.clone(),
            task_kind: self.kind,
            inputs,
            options,
            variables: vars.as_map().clone(),
        }
    }

    fn revalidate(&mut self) {
        self.field_errors = validate_task_fields(self.kind, &self.task_specific);
    }
}

/// Text stored as a mock payload for a real result
fn payload_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn event_name(event: &TaskNodeEvent) -> &'static str {
    match event {
        TaskNodeEvent::SetPendingRun => "SET_PENDING_RUN",
        TaskNodeEvent::TryRun { .. } => "TRY_RUN",
        TaskNodeEvent::EvaluationSettled(_) => "EVALUATION_SETTLED",
        TaskNodeEvent::ExecuteSideEffect => "EXECUTE",
        TaskNodeEvent::SkipSideEffect => "SKIP",
        _ => "PROPERTY_EVENT",
    }
}
