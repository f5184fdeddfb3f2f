//! The `simulate` command
//!
//! Walks the whole plan. Side effects use their stored mocks unless
//! `--execute` is given; a failed task is reported and skipped.

use std::sync::Arc;

use jobspec_engine::{GraphParser, LogEventSink, LocalGraphParser, Simulator, StepOutcome, TaskEvaluator, Workspace};
use jobspec_http_adapter::{HttpGraphParser, HttpTaskEvaluator};

use crate::config::CliConfig;

pub async fn run(ws: Workspace, config: &CliConfig, remote_parser: bool, execute: bool) -> anyhow::Result<()> {
    let evaluator = HttpTaskEvaluator::new(config.collaborators.clone());
    if remote_parser {
        let parser = HttpGraphParser::new(config.collaborators.clone());
        walk(Simulator::new(parser, evaluator), ws, execute).await
    } else {
        walk(Simulator::new(LocalGraphParser, evaluator), ws, execute).await
    }
}

async fn walk<P: GraphParser, E: TaskEvaluator>(
    simulator: Simulator<P, E>,
    mut ws: Workspace,
    execute: bool,
) -> anyhow::Result<()> {
    let mut sim = simulator.with_event_sink(Arc::new(LogEventSink));
    sim.enter(ws.job_mut()).await?;
    log::info!("Simulating {} task(s)", sim.plan().len());

    loop {
        let outcome = match sim.run_current(ws.job_mut()).await? {
            StepOutcome::AwaitingSideEffect(request) if execute => {
                log::info!("Executing side effect '{}'", request.id);
                sim.execute_side_effect(ws.job_mut()).await?
            }
            StepOutcome::AwaitingSideEffect(request) => {
                log::info!("Skipping side effect '{}' with its mock", request.id);
                sim.skip_side_effect(ws.job_mut())?
            }
            other => other,
        };

        match outcome {
            StepOutcome::Settled(result) => {
                println!("{}", serde_json::to_string(&result)?);
                if result.is_error() {
                    sim.next()?;
                }
            }
            StepOutcome::Finished => break,
            StepOutcome::AwaitingSideEffect(request) => {
                anyhow::bail!("side effect '{}' was left pending", request.id)
            }
        }
    }

    sim.exit(ws.job_mut());
    Ok(())
}
