//! Execution plans
//!
//! An [`ExecutionPlan`] is the canonical task order the simulator walks. It
//! comes from a [`GraphParser`]: either the in-process [`LocalGraphParser`]
//! or an external service speaking the same `{id, inputs}` contract.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::parser::{parse_observation_source, ParseError, ParsedObservationSource};
use crate::vars::find_references;
use crate::Result;

/// A declared input of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInput {
    /// Custom id of the upstream task
    pub id: String,
    /// True for edges (the upstream result is passed as an input); false
    /// for dependencies that only come from a `$(id)` reference
    pub propagate_result: bool,
}

/// One step of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstruction {
    /// Custom id of the task
    pub id: String,
    #[serde(default)]
    pub inputs: Vec<PlanInput>,
}

impl TaskInstruction {
    /// Ids of the inputs whose results are passed along
    pub fn propagated_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .filter(|i| i.propagate_result)
            .map(|i| i.id.as_str())
    }
}

/// Ordered task instructions; every task comes after all of its inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub tasks: Vec<TaskInstruction>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TaskInstruction> {
        self.tasks.get(index)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Task ids in execution order
    pub fn order(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }
}

/// Build a plan from a parsed observation source.
///
/// Order is a topological sort that breaks ties by declaration order, so the
/// same text always yields the same plan. A cycle is a parse error.
pub fn build_plan(parsed: &ParsedObservationSource) -> std::result::Result<ExecutionPlan, ParseError> {
    let index: HashMap<&str, usize> = parsed
        .tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.custom_id.as_str(), i))
        .collect();

    let mut inputs: Vec<Vec<PlanInput>> = vec![Vec::new(); parsed.tasks.len()];
    for edge in &parsed.edges {
        if let Some(&target) = index.get(edge.target.as_str()) {
            inputs[target].push(PlanInput {
                id: edge.source.clone(),
                propagate_result: true,
            });
        }
    }
    for (i, task) in parsed.tasks.iter().enumerate() {
        for value in task.attributes.values() {
            for reference in find_references(&value.raw) {
                let known = index.contains_key(reference.id.as_str());
                let listed = inputs[i].iter().any(|input| input.id == reference.id);
                if known && !listed && reference.id != task.custom_id {
                    inputs[i].push(PlanInput {
                        id: reference.id,
                        propagate_result: false,
                    });
                }
            }
        }
    }

    let mut in_degree: Vec<usize> = inputs.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); parsed.tasks.len()];
    for (i, task_inputs) in inputs.iter().enumerate() {
        for input in task_inputs {
            if let Some(&source) = index.get(input.id.as_str()) {
                dependents[source].push(i);
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..parsed.tasks.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(parsed.tasks.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < parsed.tasks.len() {
        let stuck: Vec<&str> = (0..parsed.tasks.len())
            .filter(|i| !order.contains(i))
            .map(|i| parsed.tasks[i].custom_id.as_str())
            .collect();
        return Err(ParseError::new(format!("cycle detected between tasks: {}", stuck.join(", "))));
    }

    Ok(ExecutionPlan {
        tasks: order
            .into_iter()
            .map(|i| TaskInstruction {
                id: parsed.tasks[i].custom_id.clone(),
                inputs: std::mem::take(&mut inputs[i]),
            })
            .collect(),
    })
}

/// Trait for turning observation source text into an execution plan.
///
/// Parse failures are reported as `EngineError::Parse` and are terminal for
/// the simulator.
#[async_trait]
pub trait GraphParser: Send + Sync {
    async fn parse(&self, observation_source: &str) -> Result<ExecutionPlan>;
}

/// In-process graph parser using the built-in grammar
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalGraphParser;

#[async_trait]
impl GraphParser for LocalGraphParser {
    async fn parse(&self, observation_source: &str) -> Result<ExecutionPlan> {
        let parsed = parse_observation_source(observation_source)?;
        Ok(build_plan(&parsed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(text: &str) -> ExecutionPlan {
        build_plan(&parse_observation_source(text).unwrap()).unwrap()
    }

    #[test]
    fn test_order_respects_edges_over_declaration() {
        let text = r#"
parse [type="jsonparse" data="$(fetch)" path="page"]
fetch [type="http" url="https://x/y"]
fetch -> parse
"#;
        let plan = plan(text);
        assert_eq!(plan.order(), vec!["fetch", "parse"]);
        assert_eq!(
            plan.tasks[1].inputs,
            vec![PlanInput {
                id: "fetch".into(),
                propagate_result: true
            }]
        );
    }

    #[test]
    fn test_ties_break_by_declaration_order() {
        let text = r#"
b [type="http" url="u"]
a [type="http" url="u"]
c [type="median"]
a -> c
b -> c
"#;
        let plan = plan(text);
        assert_eq!(plan.order(), vec!["b", "a", "c"]);
        let inputs: Vec<&str> = plan.tasks[2].propagated_inputs().collect();
        assert_eq!(inputs, vec!["a", "b"]);
    }

    #[test]
    fn test_references_add_non_propagating_inputs() {
        let text = r#"
encode [type="ethabiencode" abi="f(uint256 v)" data="{ \"v\": $(mul) }"]
fetch [type="http" url="u"]
mul [type="multiply" input="$(fetch.price)" times="100"]
fetch -> mul
"#;
        let plan = plan(text);
        assert_eq!(plan.order(), vec!["fetch", "mul", "encode"]);
        assert_eq!(
            plan.tasks[2].inputs,
            vec![PlanInput {
                id: "mul".into(),
                propagate_result: false
            }]
        );
    }

    #[test]
    fn test_reference_cycle_is_parse_error() {
        let text = r#"
a [type="multiply" input="$(b)" times="2"]
b [type="multiply" input="$(a)" times="2"]
"#;
        let err = build_plan(&parse_observation_source(text).unwrap()).unwrap_err();
        assert!(err.message.contains("cycle"), "{}", err);
    }

    #[tokio::test]
    async fn test_local_graph_parser() {
        let plan = LocalGraphParser
            .parse("a [type=\"any\"]\nb [type=\"any\"]\na -> b")
            .await
            .unwrap();
        assert_eq!(plan.order(), vec!["a", "b"]);

        let err = LocalGraphParser.parse("a [").await.unwrap_err();
        assert!(matches!(err, crate::EngineError::Parse(_)));
    }
}
