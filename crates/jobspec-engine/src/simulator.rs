//! Stepwise pipeline simulation
//!
//! The [`Simulator`] walks an [`ExecutionPlan`] one task at a time. It owns
//! sequencing only: each step dispatches `SET_PENDING_RUN` and `TRY_RUN` to
//! the task's node machine, performs the evaluation effect the machine
//! returns, and feeds the settled response back.
//!
//! Side-effect tasks pause the walk with [`StepOutcome::AwaitingSideEffect`]
//! until the caller decides to execute or skip them. A failed task does not
//! advance; the caller moves on with [`Simulator::next`].

use std::sync::Arc;

use serde_json::Value;

use crate::compiler::compile_job;
use crate::error::{EngineError, Result};
use crate::evaluator::{EvaluationRequest, EvaluationResponse, TaskEvaluator};
use crate::events::{EventSink, NullEventSink, PipelineEvent};
use crate::job::Job;
use crate::parser::ParseError;
use crate::plan::{ExecutionPlan, GraphParser, TaskInstruction};
use crate::task_node::{NodeState, TaskNodeEffect, TaskNodeEvent};
use crate::types::{NodeId, TaskRunResult};
use crate::vars::VarSnapshot;

/// Where the simulator currently stands
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationStatus {
    /// Not in simulation mode
    Inactive,
    /// A plan is loaded; the current task can be run
    Ready,
    /// The current task is a side effect waiting for execute or skip
    AwaitingSideEffect,
    /// The plan could not be built; terminal until the next `enter`
    Failed(ParseError),
}

/// Result of one simulation step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The current task settled (successfully or not)
    Settled(TaskRunResult),
    /// The current task needs an execute or skip decision
    AwaitingSideEffect(EvaluationRequest),
    /// Every task in the plan has been visited
    Finished,
}

/// Drives node machines through an execution plan
pub struct Simulator<P: GraphParser, E: TaskEvaluator> {
    parser: P,
    evaluator: E,
    event_sink: Arc<dyn EventSink>,
    plan: ExecutionPlan,
    current_task_index: usize,
    results: Vec<TaskRunResult>,
    status: SimulationStatus,
    execution_id: String,
}

impl<P: GraphParser, E: TaskEvaluator> Simulator<P, E> {
    pub fn new(parser: P, evaluator: E) -> Self {
        Self {
            parser,
            evaluator,
            event_sink: Arc::new(NullEventSink),
            plan: ExecutionPlan::default(),
            current_task_index: 0,
            results: Vec::new(),
            status: SimulationStatus::Inactive,
            execution_id: String::new(),
        }
    }

    /// Report progress to the given sink
    pub fn with_event_sink(mut self, event_sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    pub fn status(&self) -> &SimulationStatus {
        &self.status
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.status, SimulationStatus::Inactive)
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn current_task_index(&self) -> usize {
        self.current_task_index
    }

    /// The plan entry at the current index, if any
    pub fn current_task(&self) -> Option<&TaskInstruction> {
        self.plan.get(self.current_task_index)
    }

    pub fn results(&self) -> &[TaskRunResult] {
        &self.results
    }

    /// Stored result for a task, by custom id
    pub fn result(&self, custom_id: &str) -> Option<&TaskRunResult> {
        self.results.iter().find(|r| r.node_id == custom_id)
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Enter simulation mode.
    ///
    /// Resets every node, clears prior results and re-parses the job's
    /// current compiled observation source. A parse error leaves the
    /// simulator in [`SimulationStatus::Failed`].
    pub async fn enter(&mut self, job: &mut Job) -> Result<()> {
        job.graph.reset_all();
        self.results.clear();
        self.current_task_index = 0;
        self.plan = ExecutionPlan::default();
        self.execution_id = format!("sim-exec-{}", uuid::Uuid::new_v4());

        let source = compile_job(job).observation_source();
        match self.parser.parse(&source).await {
            Ok(plan) => {
                log::info!(
                    "Entered simulation {} with {} task(s)",
                    self.execution_id,
                    plan.len()
                );
                self.emit(PipelineEvent::SimulationStarted {
                    execution_id: self.execution_id.clone(),
                    task_count: plan.len(),
                });
                self.plan = plan;
                self.status = SimulationStatus::Ready;
                Ok(())
            }
            Err(EngineError::Parse(error)) => {
                log::warn!("Simulation {} failed to parse: {}", self.execution_id, error);
                self.emit_failed(&error.to_string());
                self.status = SimulationStatus::Failed(error.clone());
                Err(EngineError::Parse(error))
            }
            Err(error) => {
                self.emit_failed(&error.to_string());
                self.status = SimulationStatus::Inactive;
                Err(error)
            }
        }
    }

    /// Leave simulation mode, returning every node to idle.
    ///
    /// Mock payloads overwritten by executed side effects are kept.
    pub fn exit(&mut self, job: &mut Job) {
        job.graph.reset_all();
        self.plan = ExecutionPlan::default();
        self.results.clear();
        self.current_task_index = 0;
        self.status = SimulationStatus::Inactive;
        log::info!("Exited simulation {}", self.execution_id);
        self.emit(PipelineEvent::SimulationExited {
            execution_id: self.execution_id.clone(),
        });
    }

    /// Run the task at the current index
    pub async fn run_current(&mut self, job: &mut Job) -> Result<StepOutcome> {
        self.check_active()?;
        let Some(instruction) = self.plan.get(self.current_task_index).cloned() else {
            return Ok(StepOutcome::Finished);
        };
        let node_id = self.node_for(job, &instruction)?;

        if self.status == SimulationStatus::AwaitingSideEffect {
            if let Some(request) = job.graph.node(&node_id).and_then(|n| n.last_request()) {
                return Ok(StepOutcome::AwaitingSideEffect(request.clone()));
            }
        }

        let inputs = self.inputs_for(&instruction);
        let vars = self.vars_for(job);
        if job.graph.node(&node_id).map(|n| n.state()) != Some(NodeState::Idle) {
            job.graph.send(&node_id, TaskNodeEvent::Reset)?;
        }
        job.graph.send(&node_id, TaskNodeEvent::SetPendingRun)?;
        let effect = job.graph.send(&node_id, TaskNodeEvent::TryRun { inputs, vars })?;

        match effect {
            Some(TaskNodeEffect::Evaluate(request)) => self.evaluate(job, &node_id, request).await,
            Some(TaskNodeEffect::PromptSideEffect(request)) => {
                self.status = SimulationStatus::AwaitingSideEffect;
                self.emit(PipelineEvent::SideEffectPending {
                    task_id: instruction.id.clone(),
                    execution_id: self.execution_id.clone(),
                });
                Ok(StepOutcome::AwaitingSideEffect(request))
            }
            Some(TaskNodeEffect::Settled(result)) => Ok(self.record(result)),
            None => Err(EngineError::invariant(format!(
                "task '{}' did not accept TRY_RUN",
                instruction.id
            ))),
        }
    }

    /// Run the pending side effect for real
    pub async fn execute_side_effect(&mut self, job: &mut Job) -> Result<StepOutcome> {
        let node_id = self.pending_side_effect(job)?;
        match job.graph.send(&node_id, TaskNodeEvent::ExecuteSideEffect)? {
            Some(TaskNodeEffect::Evaluate(request)) => {
                self.status = SimulationStatus::Ready;
                self.evaluate(job, &node_id, request).await
            }
            _ => Err(EngineError::invariant(format!(
                "task '{}' has no request to execute",
                node_id
            ))),
        }
    }

    /// Settle the pending side effect with its stored mock payload
    pub fn skip_side_effect(&mut self, job: &mut Job) -> Result<StepOutcome> {
        let node_id = self.pending_side_effect(job)?;
        match job.graph.send(&node_id, TaskNodeEvent::SkipSideEffect)? {
            Some(TaskNodeEffect::Settled(result)) => {
                self.status = SimulationStatus::Ready;
                Ok(self.record(result))
            }
            _ => Err(EngineError::invariant(format!(
                "task '{}' could not skip its side effect",
                node_id
            ))),
        }
    }

    /// Advance past the current task without running it again
    pub fn next(&mut self) -> Result<usize> {
        self.check_active()?;
        if self.current_task_index < self.plan.len() {
            self.current_task_index += 1;
        }
        if self.status == SimulationStatus::AwaitingSideEffect {
            self.status = SimulationStatus::Ready;
        }
        Ok(self.current_task_index)
    }

    /// Step back one task, discarding that task's stored result
    pub fn previous(&mut self) -> Result<usize> {
        self.check_active()?;
        if self.current_task_index > 0 {
            self.current_task_index -= 1;
            if let Some(task) = self.plan.get(self.current_task_index) {
                let id = task.id.clone();
                self.results.retain(|r| r.node_id != id);
            }
        }
        if self.status == SimulationStatus::AwaitingSideEffect {
            self.status = SimulationStatus::Ready;
        }
        Ok(self.current_task_index)
    }

    async fn evaluate(&mut self, job: &mut Job, node_id: &str, request: EvaluationRequest) -> Result<StepOutcome> {
        self.emit(PipelineEvent::TaskStarted {
            task_id: request.id.clone(),
            execution_id: self.execution_id.clone(),
        });
        let response = match self.evaluator.evaluate(&request).await {
            Ok(response) => response,
            Err(error) => {
                log::warn!("Evaluation of '{}' failed: {}", request.id, error);
                EvaluationResponse::error(error.to_string())
            }
        };

        match job.graph.send(node_id, TaskNodeEvent::EvaluationSettled(response))? {
            Some(TaskNodeEffect::Settled(result)) => Ok(self.record(result)),
            _ => Err(EngineError::invariant(format!(
                "task '{}' did not settle",
                request.id
            ))),
        }
    }

    fn record(&mut self, result: TaskRunResult) -> StepOutcome {
        self.results.retain(|r| r.node_id != result.node_id);
        self.results.push(result.clone());

        match &result.error {
            None => {
                self.emit(PipelineEvent::TaskCompleted {
                    task_id: result.node_id.clone(),
                    execution_id: self.execution_id.clone(),
                    output: result.value.clone(),
                });
                self.current_task_index += 1;
            }
            Some(error) => {
                log::info!("Task '{}' failed: {}", result.node_id, error);
                self.emit(PipelineEvent::TaskFailed {
                    task_id: result.node_id.clone(),
                    execution_id: self.execution_id.clone(),
                    error: error.clone(),
                });
            }
        }
        StepOutcome::Settled(result)
    }

    /// Results of the task's propagating inputs, null where missing
    fn inputs_for(&self, instruction: &TaskInstruction) -> Vec<Value> {
        instruction
            .propagated_inputs()
            .map(|id| {
                self.result(id)
                    .filter(|r| !r.is_error())
                    .map(|r| r.value.clone())
                    .unwrap_or(Value::Null)
            })
            .collect()
    }

    /// The previous result's vars (job-level vars for the first task),
    /// overlaid with every prior successful result keyed by custom id
    fn vars_for(&self, job: &Job) -> VarSnapshot {
        let mut vars = match self.results.last() {
            Some(previous) => VarSnapshot::from(previous.vars.clone()),
            None => VarSnapshot::from(job.config.job_level_vars()),
        };
        for result in self.results.iter().filter(|r| !r.is_error()) {
            vars.insert(result.node_id.clone(), result.value.clone());
        }
        vars
    }

    fn node_for(&self, job: &Job, instruction: &TaskInstruction) -> Result<NodeId> {
        job.graph
            .resolve_custom_id(&instruction.id)
            .cloned()
            .ok_or_else(|| {
                EngineError::invariant(format!(
                    "planned task '{}' is missing from the graph",
                    instruction.id
                ))
            })
    }

    fn pending_side_effect(&self, job: &Job) -> Result<NodeId> {
        self.check_active()?;
        if self.status != SimulationStatus::AwaitingSideEffect {
            return Err(EngineError::invariant("no side effect is pending"));
        }
        let instruction = self
            .plan
            .get(self.current_task_index)
            .ok_or_else(|| EngineError::invariant("side effect pending past the end of the plan"))?;
        self.node_for(job, instruction)
    }

    fn check_active(&self) -> Result<()> {
        match &self.status {
            SimulationStatus::Inactive => Err(EngineError::SimulationInactive),
            SimulationStatus::Failed(error) => Err(EngineError::Parse(error.clone())),
            _ => Ok(()),
        }
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.event_sink.send(event);
    }

    fn emit_failed(&self, error: &str) {
        self.emit(PipelineEvent::SimulationFailed {
            execution_id: self.execution_id.clone(),
            error: error.to_string(),
        });
    }
}
