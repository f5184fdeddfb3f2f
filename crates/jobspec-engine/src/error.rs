//! Error types for the job-spec engine

use thiserror::Error;

use crate::parser::ParseError;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while editing, compiling or simulating a job spec
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another node already holds the requested custom id
    #[error("Duplicate identifier: '{0}' is already used by another task")]
    DuplicateIdentifier(String),

    /// The requested custom id cannot appear in the observation source
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// No node with the given stable or custom id
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// No edge with the given id
    #[error("Unknown edge: {0}")]
    UnknownEdge(String),

    /// Edge would be a self-loop or duplicate an existing edge
    #[error("Invalid edge {source_id} -> {target_id}: {reason}")]
    InvalidEdge {
        source_id: String,
        target_id: String,
        reason: String,
    },

    /// Connecting the nodes would create a cycle
    #[error("Edge {source_id} -> {target_id} would create a cycle")]
    CycleDetected { source_id: String, target_id: String },

    /// The observation source could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A single task failed to evaluate
    #[error("Task '{task_id}' failed: {message}")]
    TaskEvaluation { task_id: String, message: String },

    /// Graph and plan disagree; should not happen while graph invariants hold
    #[error("Compiler invariant violated: {0}")]
    CompilerInvariant(String),

    /// A TOML job spec could not be imported
    #[error("Import error: {0}")]
    Import(String),

    /// An external collaborator (graph parser, task evaluator) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Simulation step requested while simulation mode is off
    #[error("Simulation is not active")]
    SimulationInactive,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a parse error without a location
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(ParseError::new(msg))
    }

    /// Create a compiler invariant error with a message
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::CompilerInvariant(msg.into())
    }

    /// Create an import error with a message
    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }

    /// Create a collaborator error with a message
    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Whether this error halts the simulator until it is re-entered
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::CompilerInvariant(_))
    }
}
