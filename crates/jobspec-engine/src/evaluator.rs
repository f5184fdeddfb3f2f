//! Task evaluation boundary
//!
//! The engine never evaluates tasks itself. A [`TaskEvaluator`] receives a
//! fully resolved request and answers with a value, carried variables, or an
//! error message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::TaskKind;
use crate::Result;

/// A task evaluation request with options already resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    /// Custom id of the task
    pub id: String,
    pub task_kind: TaskKind,
    /// Results of the task's propagating inputs, in declared order
    pub inputs: Vec<Value>,
    /// Field values after variable resolution
    pub options: Map<String, Value>,
    /// Variable snapshot the options were resolved against
    pub variables: Map<String, Value>,
}

/// The evaluator's answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub vars: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResponse {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Trait for evaluating a single task.
///
/// Implementations perform the task's real semantics (HTTP, arithmetic,
/// codecs). Returning `Err` means the evaluator itself could not be reached;
/// a task-level failure is an `Ok` response carrying `error`.
#[async_trait]
pub trait TaskEvaluator: Send + Sync {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResponse>;
}
