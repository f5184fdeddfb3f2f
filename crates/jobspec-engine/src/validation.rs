//! Validation for task fields, job fields and whole job graphs
//!
//! Validation never blocks compilation or simulation. Field errors are
//! attached to the owning node; graph-level problems are returned as a list.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::catalog::{descriptor, FieldRule};
use crate::fields::token_spans;
use crate::graph::NodeGraph;
use crate::job::{Job, JobType};
use crate::types::{TaskKind, TaskSpecific};
use crate::vars::find_references;

/// Namespaces that are always resolvable from the job config
pub const JOB_VAR_NAMESPACES: [&str; 2] = ["jobSpec", "jobRun"];

/// A problem with one field of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Graph- or job-level validation error with location context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Cycle detected in the graph
    CycleDetected,
    /// A task field is invalid
    InvalidField {
        node_id: String,
        field: String,
        message: String,
    },
    /// A `$(id)` reference names no task and no job namespace
    DanglingReference { node_id: String, reference: String },
    /// A task kind the compiler does not render
    UnsupportedTaskKind { node_id: String, kind: TaskKind },
    /// A job-type-specific field is invalid
    InvalidJobField { key: String, value: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected => write!(f, "Cycle detected in graph"),
            Self::InvalidField {
                node_id,
                field,
                message,
            } => write!(f, "Task '{}' field '{}': {}", node_id, field, message),
            Self::DanglingReference { node_id, reference } => {
                write!(f, "Task '{}' references unknown task '{}'", node_id, reference)
            }
            Self::UnsupportedTaskKind { node_id, kind } => {
                write!(f, "Task '{}' has type '{}' which is not compiled", node_id, kind)
            }
            Self::InvalidJobField { key, value } => {
                write!(f, "Job field '{}' has invalid value '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// `0x` followed by exactly 40 hex digits. The EIP-55 checksum is not verified.
pub fn is_address(value: &str) -> bool {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Validate a task's fields against its kind's rules
pub fn validate_task_fields(kind: TaskKind, fields: &TaskSpecific) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for spec in descriptor(kind).fields {
        let raw = fields.get(spec.key).map(|v| v.raw.trim()).unwrap_or("");
        match spec.rule {
            FieldRule::Optional => {}
            FieldRule::NonEmpty => {
                if raw.is_empty() {
                    errors.push(FieldError::new(spec.key, "is required"));
                }
            }
            FieldRule::Address => {
                if raw.is_empty() {
                    errors.push(FieldError::new(spec.key, "is required"));
                } else if token_spans(raw).is_empty() && !is_address(raw) {
                    errors.push(FieldError::new(spec.key, "must be a valid address"));
                }
            }
        }
        if spec.style.is_array() && !angles_balanced(raw) {
            errors.push(FieldError::new(spec.key, "must not contain unbalanced '<' or '>'"));
        }
    }
    errors
}

/// Array values are written inside `<...>`, which nests but knows no quoting
fn angles_balanced(value: &str) -> bool {
    let mut depth = 0usize;
    for c in value.chars() {
        match c {
            '<' => depth += 1,
            '>' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0
}

/// Validate one job-type-specific preamble field
pub fn validate_job_field(job_type: JobType, key: &str, value: &str) -> bool {
    let value = value.trim();
    match (job_type, key) {
        (JobType::Cron, "schedule") => {
            let parts = value.split_whitespace().count();
            (5..=6).contains(&parts)
        }
        (JobType::DirectRequest, "contractAddress") => is_address(value),
        (JobType::DirectRequest, "minContractPaymentLinkJuels") => {
            value.parse::<f64>().map(|v| v >= 0.0).unwrap_or(false)
        }
        (JobType::DirectRequest, "minIncomingConfirmations") => {
            value.parse::<u64>().map(|v| v >= 1).unwrap_or(false)
        }
        _ => true,
    }
}

/// Validate a whole job
///
/// Returns all validation errors found (not just the first).
pub fn validate_job(job: &Job) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (key, field) in &job.config.specifics {
        if !field.valid {
            errors.push(ValidationError::InvalidJobField {
                key: key.clone(),
                value: field.value.clone(),
            });
        }
    }
    validate_graph_into(&job.graph, &mut errors);
    errors
}

/// Validate a task graph: field errors, unsupported kinds, dangling references and cycles
pub fn validate_graph(graph: &NodeGraph) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_graph_into(graph, &mut errors);
    errors
}

fn validate_graph_into(graph: &NodeGraph, errors: &mut Vec<ValidationError>) {
    for node in graph.nodes() {
        if !node.kind().is_supported() {
            errors.push(ValidationError::UnsupportedTaskKind {
                node_id: node.custom_id().to_string(),
                kind: node.kind(),
            });
        }
        for err in node.field_errors() {
            errors.push(ValidationError::InvalidField {
                node_id: node.custom_id().to_string(),
                field: err.field.clone(),
                message: err.message.clone(),
            });
        }
    }
    errors.extend(dangling_references(graph));
    detect_cycles(graph, errors);
}

/// References to tasks that do not exist, e.g. after a rename
pub fn dangling_references(graph: &NodeGraph) -> Vec<ValidationError> {
    let known: HashSet<&str> = graph.nodes().iter().map(|n| n.custom_id()).collect();
    let mut errors = Vec::new();
    for node in graph.nodes() {
        for value in node.task_specific().values() {
            for reference in find_references(&value.raw) {
                let resolvable = known.contains(reference.id.as_str())
                    || JOB_VAR_NAMESPACES.contains(&reference.id.as_str());
                if !resolvable {
                    errors.push(ValidationError::DanglingReference {
                        node_id: node.custom_id().to_string(),
                        reference: reference.id,
                    });
                }
            }
        }
    }
    errors
}

/// Detect cycles using Kahn's algorithm
fn detect_cycles(graph: &NodeGraph, errors: &mut Vec<ValidationError>) {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for node in graph.nodes() {
        in_degree.entry(node.id()).or_insert(0);
        adjacency.entry(node.id()).or_default();
    }

    for edge in graph.edges() {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node) = queue.pop_front() {
        visited += 1;
        if let Some(neighbors) = adjacency.get(node) {
            for &neighbor in neighbors {
                if let Some(deg) = in_degree.get_mut(neighbor) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
    }

    if visited < in_degree.len() {
        errors.push(ValidationError::CycleDetected);
    }
}
