//! Fluent builders for pipelines and jobs
//!
//! Provides a fluent API for constructing graphs programmatically, mostly
//! used by tests and by callers that assemble jobs without a canvas.

use crate::error::{EngineError, Result};
use crate::graph::NodeGraph;
use crate::job::{Job, JobType};
use crate::types::{MockConfig, NodeId, Position, TaskKind};

/// Vertical distance between successively added tasks
const ROW_SPACING: f64 = 150.0;

/// Fluent builder for task graphs
///
/// # Example
///
/// ```ignore
/// let graph = PipelineBuilder::new()
///     .add_task("fetch", TaskKind::Http)
///     .with_field("url", "https://x/y")
///     .add_task("parse", TaskKind::JsonParse)
///     .with_field("data", "$(fetch)")
///     .with_field("path", "page")
///     .connect("fetch", "parse")
///     .build();
/// ```
///
/// Steps are applied as they are chained. The first failing step is kept
/// and reported by [`try_build`](Self::try_build); later steps still run.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    graph: NodeGraph,
    last: Option<NodeId>,
    error: Option<EngineError>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task with the given custom id, stacked below the previous one
    pub fn add_task(mut self, custom_id: impl Into<String>, kind: TaskKind) -> Self {
        let position = Position::new(0.0, self.graph.len() as f64 * ROW_SPACING);
        let added = self
            .graph
            .add_node_with_custom_id(kind, custom_id, position, None);
        self.last = self.record(added);
        self
    }

    /// Set a field on the most recently added task
    ///
    /// Must be called after `add_task`.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(id) = self.last.clone() {
            let result = self.graph.set_task_fields(&id, [(key.into(), value.into())]);
            self.record(result);
        }
        self
    }

    /// Store a mock response on the most recently added task
    pub fn with_mock(mut self, payload: impl Into<String>) -> Self {
        if let Some(id) = self.last.clone() {
            let result = self.graph.set_mock(&id, MockConfig::new(payload));
            self.record(result);
        }
        self
    }

    /// Connect two tasks by custom id
    pub fn connect(mut self, source: &str, target: &str) -> Self {
        let result = self.graph.connect_custom(source, target);
        self.record(result);
        self
    }

    /// Build the graph, logging any step that failed
    pub fn build(self) -> NodeGraph {
        if let Some(error) = &self.error {
            log::warn!("Pipeline builder skipped a step: {}", error);
        }
        self.graph
    }

    /// Build the graph, failing on the first step that failed
    pub fn try_build(self) -> Result<NodeGraph> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.graph),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                if self.error.is_none() {
                    self.error = Some(error);
                }
                None
            }
        }
    }
}

/// Fluent builder for complete jobs
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job: Job::new(job_type),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.job.config.name = Some(name.into());
        self
    }

    pub fn external_job_id(mut self, id: impl Into<String>) -> Self {
        self.job.config.external_job_id = Some(id.into());
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.job.config.gas_limit = Some(gas_limit);
        self
    }

    pub fn max_task_duration(mut self, duration: impl Into<String>) -> Self {
        self.job.config.max_task_duration = Some(duration.into());
        self
    }

    pub fn forwarding_allowed(mut self, allowed: bool) -> Self {
        self.job.config.forwarding_allowed = Some(allowed);
        self
    }

    /// Set a job-type-specific field such as `schedule`
    pub fn specific(mut self, key: &str, value: impl Into<String>) -> Self {
        self.job.config.set_specific(key, value);
        self
    }

    pub fn run_variable(mut self, name: &str, value: impl Into<String>) -> Self {
        self.job.config.set_run_variable(name, value);
        self
    }

    pub fn pipeline(mut self, graph: NodeGraph) -> Self {
        self.job.graph = graph;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_builder() {
        let graph = PipelineBuilder::new()
            .add_task("fetch", TaskKind::Http)
            .with_field("url", "https://x/y")
            .with_mock(r#"{"page": 2}"#)
            .add_task("parse", TaskKind::JsonParse)
            .connect("fetch", "parse")
            .try_build()
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges().len(), 1);
        let fetch = graph.node_by_custom_id("fetch").unwrap();
        assert_eq!(fetch.field("url"), "https://x/y");
        assert!(fetch.mock().enabled);
        assert_eq!(graph.node_by_custom_id("parse").unwrap().incoming_nodes(), ["fetch"]);
    }

    #[test]
    fn test_first_error_is_kept() {
        let result = PipelineBuilder::new()
            .add_task("a", TaskKind::Any)
            .add_task("a", TaskKind::Any)
            .connect("a", "missing")
            .try_build();
        assert!(matches!(result, Err(EngineError::DuplicateIdentifier(id)) if id == "a"));
    }

    #[test]
    fn test_job_builder() {
        let job = JobBuilder::new(JobType::Cron)
            .name("ticker")
            .specific("schedule", "0 0 * * * *")
            .pipeline(PipelineBuilder::new().add_task("a", TaskKind::Any).build())
            .build();
        assert_eq!(job.config.name.as_deref(), Some("ticker"));
        assert_eq!(job.config.specific("schedule").unwrap().value, "0 0 * * * *");
        assert_eq!(job.graph.len(), 1);
    }
}
