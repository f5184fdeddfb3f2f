//! End-to-end simulation through the workspace

use std::sync::Arc;

use async_trait::async_trait;
use jobspec_engine::{
    EvaluationRequest, EvaluationResponse, JobType, LocalGraphParser, PipelineBuilder, PipelineEvent, Result,
    Simulator, StepOutcome, TaskEvaluator, TaskKind, VecEventSink, Workspace,
};
use serde_json::{json, Value};

/// Implements the few task kinds these pipelines use
struct LocalEvaluator;

#[async_trait]
impl TaskEvaluator for LocalEvaluator {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResponse> {
        let option = |key: &str| request.options.get(key).cloned().unwrap_or(Value::Null);
        Ok(match request.task_kind {
            TaskKind::JsonParse => {
                let mut current = option("data");
                for segment in option("path").as_str().unwrap_or_default().split(',') {
                    current = current.get(segment).cloned().unwrap_or(Value::Null);
                }
                if current.is_null() {
                    EvaluationResponse::error("path not found")
                } else {
                    EvaluationResponse::value(current)
                }
            }
            TaskKind::Median => {
                let mut values: Vec<f64> = request.inputs.iter().filter_map(Value::as_f64).collect();
                values.sort_by(|a, b| a.total_cmp(b));
                match values.len() {
                    0 => EvaluationResponse::error("no inputs"),
                    n if n % 2 == 1 => EvaluationResponse::value(json!(values[n / 2])),
                    n => EvaluationResponse::value(json!((values[n / 2 - 1] + values[n / 2]) / 2.0)),
                }
            }
            other => EvaluationResponse::error(format!("{} is not simulated", other)),
        })
    }
}

fn fetch_parse() -> Workspace {
    let mut ws = Workspace::new(JobType::Cron);
    ws.job_mut().graph = PipelineBuilder::new()
        .add_task("fetch", TaskKind::Http)
        .with_field("url", "https://x/y")
        .with_mock(r#"{"page":2}"#)
        .add_task("parse", TaskKind::JsonParse)
        .with_field("data", "$(fetch)")
        .with_field("path", "page")
        .connect("fetch", "parse")
        .build();
    ws.recompile();
    ws
}

#[tokio::test]
async fn fetch_then_parse_with_mocked_fetch() {
    let mut ws = fetch_parse();
    let text = ws.text();
    assert!(text.contains("fetch [type=\"http\""));
    assert!(text.contains("parse [type=\"jsonparse\""));
    assert!(text.lines().any(|l| l == "fetch -> parse"));

    let sink = Arc::new(VecEventSink::new());
    let mut sim = Simulator::new(LocalGraphParser, LocalEvaluator).with_event_sink(sink.clone());
    sim.enter(ws.job_mut()).await.unwrap();

    assert!(matches!(
        sim.run_current(ws.job_mut()).await.unwrap(),
        StepOutcome::AwaitingSideEffect(_)
    ));
    sim.skip_side_effect(ws.job_mut()).unwrap();

    let StepOutcome::Settled(parse) = sim.run_current(ws.job_mut()).await.unwrap() else {
        panic!("parse should settle");
    };
    assert_eq!(parse.clone().into_value().unwrap(), json!(2));

    let request = ws.job().graph.node_by_custom_id("parse").unwrap().last_request().unwrap();
    assert_eq!(request.options["data"], json!({"page": 2}));

    let kinds: Vec<&str> = sink
        .events()
        .iter()
        .map(|e| match e {
            PipelineEvent::SimulationStarted { .. } => "started",
            PipelineEvent::SideEffectPending { .. } => "pending",
            PipelineEvent::TaskStarted { .. } => "task",
            PipelineEvent::TaskCompleted { .. } => "completed",
            PipelineEvent::TaskFailed { .. } => "failed",
            PipelineEvent::SimulationFailed { .. } => "simulation-failed",
            PipelineEvent::SimulationExited { .. } => "exited",
        })
        .collect();
    assert_eq!(kinds, vec!["started", "pending", "completed", "task", "completed"]);
}

#[tokio::test]
async fn upstream_error_leaves_downstream_input_null() {
    let mut ws = Workspace::new(JobType::Cron);
    ws.job_mut().graph = PipelineBuilder::new()
        .add_task("fetch", TaskKind::Http)
        .with_field("url", "https://x/y")
        .with_mock(r#"{"price":"n/a"}"#)
        .add_task("parse", TaskKind::JsonParse)
        .with_field("data", "$(fetch)")
        .with_field("path", "missing")
        .add_task("median", TaskKind::Median)
        .connect("fetch", "parse")
        .connect("parse", "median")
        .build();

    let mut sim = Simulator::new(LocalGraphParser, LocalEvaluator);
    sim.enter(ws.job_mut()).await.unwrap();
    sim.run_current(ws.job_mut()).await.unwrap();
    sim.skip_side_effect(ws.job_mut()).unwrap();

    let StepOutcome::Settled(parse) = sim.run_current(ws.job_mut()).await.unwrap() else {
        panic!("parse should settle");
    };
    assert!(parse.into_value().is_err());
    assert_eq!(sim.current_task_index(), 1);

    sim.next().unwrap();
    let StepOutcome::Settled(median) = sim.run_current(ws.job_mut()).await.unwrap() else {
        panic!("median should settle");
    };
    assert!(median.is_error());
    let request = ws.job().graph.node_by_custom_id("median").unwrap().last_request().unwrap();
    assert_eq!(request.inputs, vec![Value::Null]);
}

#[test]
fn reentering_reparses_current_text() {
    tokio_test::block_on(async {
        let mut ws = fetch_parse();
        let mut sim = Simulator::new(LocalGraphParser, LocalEvaluator);
        sim.enter(ws.job_mut()).await.unwrap();
        assert_eq!(sim.plan().order(), vec!["fetch", "parse"]);
        sim.exit(ws.job_mut());

        let fetch = ws.job().graph.resolve_custom_id("fetch").unwrap().clone();
        ws.rename_node(&fetch, "download").unwrap();
        sim.enter(ws.job_mut()).await.unwrap();
        assert_eq!(sim.plan().order(), vec!["download", "parse"]);
        assert_eq!(sim.current_task_index(), 0);
        assert!(sim.results().is_empty());
    });
}
