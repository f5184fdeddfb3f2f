//! Observation source parser and graph reconstruction
//!
//! Parses the DOT-subset pipeline body with a pest grammar
//! (`observation_source.pest`) into an ordered task list, and rebuilds a
//! [`NodeGraph`] from it. Stable ids are assigned strictly in declaration
//! order, so parsing the same text twice yields the same ids and order.

use std::collections::HashMap;

use pest::Parser;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};

use crate::fields::unescape_quoted;
use crate::graph::NodeGraph;
use crate::types::{FieldValue, NodeId, Position, TaskKind, TaskSpecific};

#[derive(Parser)]
#[grammar = "parser/observation_source.pest"]
struct ObservationSourceParser;

/// Horizontal and vertical spacing used when laying out reconstructed graphs
const LAYOUT_SPACING: (f64, f64) = (250.0, 150.0);

/// The observation source could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Parse error{}: {message}", location(.line, .column))]
pub struct ParseError {
    pub message: String,
    /// 1-based line, when known
    pub line: Option<usize>,
    /// 1-based column, when known
    pub column: Option<usize>,
}

fn location(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(l), Some(c)) => format!(" at {}:{}", l, c),
        (Some(l), None) => format!(" at line {}", l),
        _ => String::new(),
    }
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(message: impl Into<String>, (line, column): (usize, usize)) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        let message = match &err.variant {
            pest::error::ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
                let expected: Vec<String> = positives.iter().map(|r| format!("{:?}", r)).collect();
                format!("expected {}", expected.join(" or "))
            }
            pest::error::ErrorVariant::CustomError { message } => message.clone(),
            _ => "unexpected input".to_string(),
        };
        Self::at(message, (line, column))
    }
}

/// One declared task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTask {
    /// Freshly assigned stable id, sequential by declaration
    pub id: NodeId,
    pub custom_id: String,
    pub kind: TaskKind,
    /// Attributes other than `type`; rich text is the raw text
    pub attributes: TaskSpecific,
    /// 1-based line of the declaration
    pub line: usize,
}

/// One binary edge, by custom id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEdge {
    pub source: String,
    pub target: String,
}

/// Parsed observation source in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedObservationSource {
    pub tasks: Vec<ParsedTask>,
    pub edges: Vec<ParsedEdge>,
}

impl ParsedObservationSource {
    pub fn task(&self, custom_id: &str) -> Option<&ParsedTask> {
        self.tasks.iter().find(|t| t.custom_id == custom_id)
    }

    /// Custom ids feeding `custom_id`, in edge declaration order
    pub fn sources_of(&self, custom_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target == custom_id)
            .map(|e| e.source.as_str())
            .collect()
    }
}

/// Parse an observation source body.
///
/// Duplicate declarations, missing or unknown `type` attributes and edges
/// naming undeclared tasks are errors. A chain `a -> b -> c` becomes the two
/// edges `a -> b` and `b -> c`.
pub fn parse_observation_source(text: &str) -> Result<ParsedObservationSource, ParseError> {
    let mut pairs = ObservationSourceParser::parse(Rule::source, text)?;
    let source = pairs.next().ok_or_else(|| ParseError::new("empty parse"))?;

    let mut parsed = ParsedObservationSource::default();
    let mut edge_lines: Vec<(ParsedEdge, (usize, usize))> = Vec::new();

    for stmt in source.into_inner() {
        match stmt.as_rule() {
            Rule::node_stmt => {
                let pos = stmt.as_span().start_pos().line_col();
                let mut inner = stmt.into_inner();
                let custom_id = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
                let mut attributes = match inner.next() {
                    Some(list) => parse_attributes(list)?,
                    None => Vec::new(),
                };
                if parsed.task(&custom_id).is_some() {
                    return Err(ParseError::at(format!("task '{}' is declared more than once", custom_id), pos));
                }
                let type_idx = attributes
                    .iter()
                    .position(|(k, _)| k == "type")
                    .ok_or_else(|| ParseError::at(format!("task '{}' has no type", custom_id), pos))?;
                let (_, type_value) = attributes.remove(type_idx);
                let kind: TaskKind = type_value
                    .parse()
                    .map_err(|e| ParseError::at(format!("task '{}': {}", custom_id, e), pos))?;

                parsed.tasks.push(ParsedTask {
                    id: format!("node_{}", parsed.tasks.len() + 1),
                    custom_id,
                    kind,
                    attributes: attributes
                        .into_iter()
                        .map(|(k, v)| (k, FieldValue::verbatim(v)))
                        .collect(),
                    line: pos.0,
                });
            }
            Rule::edge_stmt => {
                let pos = stmt.as_span().start_pos().line_col();
                let ids: Vec<String> = stmt
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::ident)
                    .map(|p| p.as_str().to_string())
                    .collect();
                for pair in ids.windows(2) {
                    edge_lines.push((
                        ParsedEdge {
                            source: pair[0].clone(),
                            target: pair[1].clone(),
                        },
                        pos,
                    ));
                }
            }
            _ => {}
        }
    }

    for (edge, pos) in edge_lines {
        for end in [&edge.source, &edge.target] {
            if parsed.task(end).is_none() {
                return Err(ParseError::at(format!("edge references undeclared task '{}'", end), pos));
            }
        }
        if !parsed.edges.contains(&edge) {
            parsed.edges.push(edge);
        }
    }
    Ok(parsed)
}

fn parse_attributes(list: pest::iterators::Pair<Rule>) -> Result<Vec<(String, String)>, ParseError> {
    let mut attributes = Vec::new();
    for attr in list.into_inner() {
        let pos = attr.as_span().start_pos().line_col();
        let mut inner = attr.into_inner();
        let (Some(key), Some(value)) = (inner.next(), inner.next()) else {
            return Err(ParseError::at("malformed attribute", pos));
        };
        let text = match value.as_rule() {
            Rule::quoted => unescape_quoted(inner_text(value)),
            Rule::html => inner_text(value).to_string(),
            _ => value.as_str().to_string(),
        };
        attributes.push((key.as_str().to_string(), text));
    }
    Ok(attributes)
}

/// Text between the delimiters of a quoted or `<...>` value
fn inner_text<'i>(value: pest::iterators::Pair<'i, Rule>) -> &'i str {
    value.into_inner().next().map(|p| p.as_str()).unwrap_or("")
}

/// Rebuild a node graph from a parsed observation source.
///
/// Stable ids follow declaration order (`node_1`, `node_2`, ...). Positions
/// come from a simple layered layout: each task sits one layer below its
/// deepest source.
pub fn reconstruct_graph(parsed: &ParsedObservationSource) -> crate::Result<NodeGraph> {
    let mut graph = NodeGraph::new();
    let layers = layer_of_each(parsed);
    let mut per_layer: HashMap<usize, usize> = HashMap::new();

    for task in &parsed.tasks {
        let layer = layers.get(task.custom_id.as_str()).copied().unwrap_or(0);
        let column = per_layer.entry(layer).or_insert(0);
        let position = Position::new(*column as f64 * LAYOUT_SPACING.0, layer as f64 * LAYOUT_SPACING.1);
        *column += 1;

        let id = graph.add_node_with_custom_id(task.kind, task.custom_id.clone(), position, None)?;
        let props: Vec<(String, String)> = task
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.raw.clone()))
            .collect();
        graph.set_task_fields(&id, props)?;
    }
    for edge in &parsed.edges {
        graph.connect_custom(&edge.source, &edge.target)?;
    }
    Ok(graph)
}

/// Parse text and rebuild its graph in one step
pub fn parse_graph(text: &str) -> crate::Result<NodeGraph> {
    let parsed = parse_observation_source(text)?;
    reconstruct_graph(&parsed)
}

fn layer_of_each(parsed: &ParsedObservationSource) -> HashMap<&str, usize> {
    let mut layers: HashMap<&str, usize> = HashMap::new();
    // Longest-path layering; bounded by the task count so cycles cannot loop forever
    for _ in 0..parsed.tasks.len() {
        let mut changed = false;
        for edge in &parsed.edges {
            let next = layers.get(edge.source.as_str()).copied().unwrap_or(0) + 1;
            let current = layers.entry(edge.target.as_str()).or_insert(0);
            if next > *current {
                *current = next;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    layers
}
