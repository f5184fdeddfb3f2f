//! HTTP collaborators for the job spec engine
//!
//! `reqwest` implementations of the engine's [`GraphParser`] and
//! [`TaskEvaluator`] seams, for hosts that delegate plan construction and
//! task semantics to an external service.
//!
//! [`GraphParser`]: jobspec_engine::GraphParser
//! [`TaskEvaluator`]: jobspec_engine::TaskEvaluator

pub mod config;
pub mod error;
pub mod graph_parser;
pub mod task_evaluator;

pub use config::CollaboratorConfig;
pub use error::{AdapterError, Result};
pub use graph_parser::HttpGraphParser;
pub use task_evaluator::HttpTaskEvaluator;
