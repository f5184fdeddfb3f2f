//! Core types for pipeline graphs
//!
//! These types define the pieces a job spec is assembled from: task kinds,
//! field values, mock configuration, edges and settled run results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fields::highlight;

/// Stable, immutable identifier for a node (`node_<n>`)
pub type NodeId = String;

/// Unique identifier for an edge (`edge_<n>`)
pub type EdgeId = String;

/// Task parameters keyed by field name
pub type TaskSpecific = BTreeMap<String, FieldValue>;

/// The closed set of task kinds a pipeline node can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Http,
    Bridge,
    JsonParse,
    CborParse,
    EthTx,
    EthCall,
    Sum,
    Multiply,
    Divide,
    Any,
    Mean,
    Mode,
    Median,
    EthAbiDecodeLog,
    EthAbiDecode,
    EthAbiEncode,
    LessThan,
    Length,
    Lookup,
    Uppercase,
    Lowercase,
    Merge,
}

impl TaskKind {
    /// Every kind, in palette order
    pub const ALL: [TaskKind; 22] = [
        TaskKind::Http,
        TaskKind::Bridge,
        TaskKind::JsonParse,
        TaskKind::CborParse,
        TaskKind::EthTx,
        TaskKind::EthCall,
        TaskKind::Sum,
        TaskKind::Multiply,
        TaskKind::Divide,
        TaskKind::Any,
        TaskKind::Mean,
        TaskKind::Mode,
        TaskKind::Median,
        TaskKind::EthAbiDecodeLog,
        TaskKind::EthAbiDecode,
        TaskKind::EthAbiEncode,
        TaskKind::LessThan,
        TaskKind::Length,
        TaskKind::Lookup,
        TaskKind::Uppercase,
        TaskKind::Lowercase,
        TaskKind::Merge,
    ];

    /// The `type="..."` attribute value used in the observation source
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Bridge => "bridge",
            Self::JsonParse => "jsonparse",
            Self::CborParse => "cborparse",
            Self::EthTx => "ethtx",
            Self::EthCall => "ethcall",
            Self::Sum => "sum",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Any => "any",
            Self::Mean => "mean",
            Self::Mode => "mode",
            Self::Median => "median",
            Self::EthAbiDecodeLog => "ethabidecodelog",
            Self::EthAbiDecode => "ethabidecode",
            Self::EthAbiEncode => "ethabiencode",
            Self::LessThan => "lessthan",
            Self::Length => "length",
            Self::Lookup => "lookup",
            Self::Uppercase => "uppercase",
            Self::Lowercase => "lowercase",
            Self::Merge => "merge",
        }
    }

    /// Whether evaluating this kind touches the outside world
    pub fn is_side_effect(&self) -> bool {
        matches!(self, Self::Http | Self::Bridge | Self::EthCall | Self::EthTx)
    }

    /// Whether the compiler has a block template for this kind.
    ///
    /// Unsupported kinds are still recognised by the parser and importer but
    /// contribute nothing to compiled output.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Uppercase | Self::Lowercase | Self::Merge)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a `type` attribute names no known task kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTaskKind(pub String);

impl fmt::Display for UnknownTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown task type '{}'", self.0)
    }
}

impl std::error::Error for UnknownTaskKind {}

impl FromStr for TaskKind {
    type Err = UnknownTaskKind;

    /// Task types are matched case-insensitively (`HTTP` and `http` both work).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| UnknownTaskKind(s.to_string()))
    }
}

/// Canvas position of a node
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A task field value: the raw text plus its highlighted rendering.
///
/// Only `raw` is authoritative. `rich` is recomputed whenever the raw text is
/// set and is never persisted; deserializing rebuilds it from `raw`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FieldValue {
    pub raw: String,
    pub rich: String,
}

impl FieldValue {
    /// Create a value, deriving the highlighted form
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let rich = highlight(&raw);
        Self { raw, rich }
    }

    /// Create a value whose rich form is the raw text, as produced by parsing
    pub fn verbatim(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            rich: raw.clone(),
            raw,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }
}

impl From<String> for FieldValue {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for FieldValue {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<FieldValue> for String {
    fn from(value: FieldValue) -> Self {
        value.raw
    }
}

/// Stored response used in place of a real side effect during simulation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockConfig {
    /// Whether the stored payload should be offered when skipping the effect
    pub enabled: bool,
    /// Raw payload text; JSON when it parses as JSON, a string otherwise
    pub payload: String,
}

impl MockConfig {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            enabled: true,
            payload: payload.into(),
        }
    }

    /// The payload as a value, or `None` if the mock is disabled or empty
    pub fn value(&self) -> Option<Value> {
        if !self.enabled || self.payload.trim().is_empty() {
            return None;
        }
        Some(
            serde_json::from_str(&self.payload)
                .unwrap_or_else(|_| Value::String(self.payload.clone())),
        )
    }
}

/// A directed edge between two nodes.
///
/// Indexed by stable id for graph integrity and by custom id for text
/// generation; the custom ids are rewritten on every rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub source_custom_id: String,
    pub target_custom_id: String,
}

/// Settled outcome of one task evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRunResult {
    /// Custom id of the task that produced the result
    pub node_id: String,
    pub value: Value,
    /// Variables carried forward to the next task
    pub vars: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskRunResult {
    pub fn success(node_id: impl Into<String>, value: Value, vars: Map<String, Value>) -> Self {
        Self {
            node_id: node_id.into(),
            value,
            vars,
            error: None,
        }
    }

    pub fn failure(node_id: impl Into<String>, error: impl Into<String>, vars: Map<String, Value>) -> Self {
        Self {
            node_id: node_id.into(),
            value: Value::Null,
            vars,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The settled value, or the task's error
    pub fn into_value(self) -> crate::Result<Value> {
        match self.error {
            None => Ok(self.value),
            Some(message) => Err(crate::EngineError::TaskEvaluation {
                task_id: self.node_id,
                message,
            }),
        }
    }
}

/// Words a DOT parser reads as statements, in any case
const DOT_KEYWORDS: [&str; 6] = ["node", "edge", "graph", "digraph", "subgraph", "strict"];

/// True if `id` can be used as a node identifier in the observation source
pub fn is_valid_identifier(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !DOT_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(id))
}
