//! Job Spec Engine - visual pipeline building for job specs
//!
//! This crate turns a graph of typed task nodes into a TOML job spec with an
//! embedded DOT `observationSource` body, parses that body back into a graph
//! and an execution plan, and simulates the pipeline one task at a time with
//! mocked side effects.
//!
//! # Architecture
//!
//! - `NodeGraph`: arena of `TaskNode` machines with a custom-id index
//! - `compiler` / `parser`: the text round trip
//! - `Simulator`: walks an `ExecutionPlan`, delegating task semantics to a
//!   `TaskEvaluator` and plan construction to a `GraphParser`
//! - `EventSink`: generic event streaming for simulation progress
//!
//! # Example
//!
//! ```ignore
//! use jobspec_engine::{PipelineBuilder, TaskKind, Workspace, Job, JobType};
//!
//! let mut job = Job::new(JobType::Cron);
//! job.graph = PipelineBuilder::new()
//!     .add_task("fetch", TaskKind::Http)
//!     .with_field("url", "https://x/y")
//!     .add_task("parse", TaskKind::JsonParse)
//!     .with_field("data", "$(fetch)")
//!     .with_field("path", "page")
//!     .connect("fetch", "parse")
//!     .build();
//! println!("{}", Workspace::from_job(job).text());
//! ```

pub mod builder;
pub mod catalog;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod fields;
pub mod graph;
pub mod import;
pub mod job;
pub mod parser;
pub mod plan;
pub mod simulator;
pub mod snapshot;
pub mod store;
pub mod task_node;
pub mod types;
pub mod validation;
pub mod vars;
pub mod workspace;

// Re-export key types
pub use builder::{JobBuilder, PipelineBuilder};
pub use compiler::{compile, compile_job, CompiledDocument, DocumentLine};
pub use error::{EngineError, Result};
pub use evaluator::{EvaluationRequest, EvaluationResponse, TaskEvaluator};
pub use events::{EventSink, LogEventSink, NullEventSink, PipelineEvent, VecEventSink};
pub use graph::{EdgeContext, NodeGraph, RenamePolicy};
pub use import::{import_job_spec, ImportedJob};
pub use job::{Job, JobConfig, JobType};
pub use parser::{parse_graph, parse_observation_source, ParseError};
pub use plan::{ExecutionPlan, GraphParser, LocalGraphParser, PlanInput, TaskInstruction};
pub use simulator::{SimulationStatus, Simulator, StepOutcome};
pub use snapshot::WorkspaceSnapshot;
pub use store::SpecStore;
pub use task_node::{NodeState, TaskNode};
pub use types::{MockConfig, Position, TaskKind, TaskRunResult};
pub use validation::{validate_job, ValidationError};
pub use workspace::Workspace;
