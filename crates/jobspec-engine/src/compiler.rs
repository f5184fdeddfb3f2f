//! Job spec compiler
//!
//! Turns a job config and its task graph into the TOML job spec text, line by
//! line. Compilation is pure and deterministic: the same input always yields
//! byte-identical output. It never fails on invalid input; invalid fields
//! still produce a structurally complete line, flagged invalid.

use serde::{Deserialize, Serialize};

use crate::catalog::{descriptor, FieldSpec, FieldStyle};
use crate::fields::{array_items, collapse_body, escape_quoted, escape_toml, render_array};
use crate::graph::NodeGraph;
use crate::job::{Job, JobConfig, JobFieldStyle};
use crate::task_node::TaskNode;
use crate::types::is_valid_identifier;

/// One line of compiled output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLine {
    pub value: String,
    /// Validity of the entity the line belongs to, if it has one
    pub valid: Option<bool>,
    /// Whether the line is part of the embedded observation source body
    pub is_observation_src: bool,
}

impl DocumentLine {
    fn preamble(value: impl Into<String>, valid: Option<bool>) -> Self {
        Self {
            value: value.into(),
            valid,
            is_observation_src: false,
        }
    }

    fn body(value: impl Into<String>, valid: Option<bool>) -> Self {
        Self {
            value: value.into(),
            valid,
            is_observation_src: true,
        }
    }
}

/// Compiled job spec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledDocument {
    pub lines: Vec<DocumentLine>,
}

impl CompiledDocument {
    /// The full job spec text
    pub fn to_text(&self) -> String {
        join(self.lines.iter())
    }

    /// Only the observation source body
    pub fn observation_source(&self) -> String {
        join(self.lines.iter().filter(|l| l.is_observation_src))
    }

    /// Whether every line with a validity flag is valid
    pub fn is_valid(&self) -> bool {
        self.lines.iter().all(|l| l.valid != Some(false))
    }
}

fn join<'a>(lines: impl Iterator<Item = &'a DocumentLine>) -> String {
    lines.map(|l| l.value.as_str()).collect::<Vec<_>>().join("\n")
}

/// Compile a job
pub fn compile_job(job: &Job) -> CompiledDocument {
    compile(&job.config, &job.graph)
}

/// Compile a job config and task graph into a document
pub fn compile(config: &JobConfig, graph: &NodeGraph) -> CompiledDocument {
    let mut lines = preamble(config);
    lines.push(DocumentLine::preamble("", None));
    lines.push(DocumentLine::preamble("observationSource = \"\"\"", None));
    lines.extend(observation_source_lines(graph));
    lines.push(DocumentLine::preamble("\"\"\"", None));
    CompiledDocument { lines }
}

/// Compile only the observation source body
pub fn compile_observation_source(graph: &NodeGraph) -> String {
    join(observation_source_lines(graph).iter())
}

fn preamble(config: &JobConfig) -> Vec<DocumentLine> {
    let mut lines = vec![
        DocumentLine::preamble(format!("type = \"{}\"", config.job_type), None),
        DocumentLine::preamble("schemaVersion = 1", None),
    ];
    if let Some(name) = config.name.as_deref().filter(|n| !n.is_empty()) {
        lines.push(DocumentLine::preamble(format!("name = \"{}\"", escape_toml(name)), None));
    }
    if let Some(id) = config.external_job_id.as_deref().filter(|n| !n.is_empty()) {
        lines.push(DocumentLine::preamble(format!("externalJobId = \"{}\"", escape_toml(id)), None));
    }
    if let Some(gas_limit) = config.gas_limit {
        lines.push(DocumentLine::preamble(format!("gasLimit = \"{}\"", gas_limit), None));
    }
    if let Some(duration) = config.max_task_duration.as_deref().filter(|n| !n.is_empty()) {
        lines.push(DocumentLine::preamble(
            format!("maxTaskDuration = \"{}\"", escape_toml(duration)),
            None,
        ));
    }
    if let Some(allowed) = config.forwarding_allowed {
        lines.push(DocumentLine::preamble(format!("forwardingAllowed = {}", allowed), None));
    }

    for spec in config.job_type.field_specs() {
        let (value, valid) = config
            .specific(spec.key)
            .map(|f| (f.value.trim(), f.valid))
            .unwrap_or(("", false));
        let line = match spec.style {
            JobFieldStyle::CronSchedule => format!("{} = \"CRON_TZ=UTC {}\"", spec.key, escape_toml(value)),
            JobFieldStyle::QuotedOptional | JobFieldStyle::Bare if value.is_empty() => continue,
            JobFieldStyle::Quoted | JobFieldStyle::QuotedOptional => {
                format!("{} = \"{}\"", spec.key, escape_toml(value))
            }
            JobFieldStyle::Bare => format!("{} = {}", spec.key, value),
        };
        lines.push(DocumentLine::preamble(line, Some(valid)));
    }
    lines
}

fn observation_source_lines(graph: &NodeGraph) -> Vec<DocumentLine> {
    let mut lines = Vec::new();
    for node in graph.nodes().iter().filter(|n| n.kind().is_supported()) {
        lines.extend(node_block(node, graph));
    }

    let edges: Vec<String> = graph
        .edges()
        .iter()
        .filter(|e| {
            [&e.source, &e.target]
                .iter()
                .all(|id| graph.node(id).is_some_and(|n| n.kind().is_supported()))
        })
        .map(|e| format!("{} -> {}", e.source_custom_id, e.target_custom_id))
        .collect();
    if !edges.is_empty() {
        lines.push(DocumentLine::body("", None));
        lines.extend(edges.into_iter().map(|e| DocumentLine::body(e, None)));
    }
    lines
}

/// The fixed-shape block for one node:
///
/// ```text
/// fetch [type="http"
///        method=GET
///        url="https://x/y"]
/// ```
///
/// An attribute whose value spans several lines yields one document line per
/// text line, each carrying the node's validity.
fn node_block(node: &TaskNode, graph: &NodeGraph) -> Vec<DocumentLine> {
    let valid = Some(node.is_valid());
    let head = format!("{} [type=\"{}\"", node.custom_id(), node.kind());

    let attributes: Vec<String> = descriptor(node.kind())
        .fields
        .iter()
        .filter_map(|spec| render_field(spec, node, graph))
        .collect();

    if attributes.is_empty() {
        return vec![DocumentLine::body(format!("{}]", head), valid)];
    }

    let spacer = " ".repeat(node.custom_id().len() + 2);
    let mut lines = vec![DocumentLine::body(head, valid)];
    let last = attributes.len() - 1;
    for (idx, attribute) in attributes.into_iter().enumerate() {
        let close = if idx == last { "]" } else { "" };
        let text = format!("{}{}{}", spacer, attribute, close);
        lines.extend(text.split('\n').map(|line| DocumentLine::body(line, valid)));
    }
    lines
}

fn render_field(spec: &FieldSpec, node: &TaskNode, graph: &NodeGraph) -> Option<String> {
    let raw = match node.field(spec.key) {
        value if value.trim().is_empty() && !spec.default.is_empty() => spec.default,
        value => value,
    };
    if spec.omit_when_empty && raw.trim().is_empty() {
        return None;
    }
    let rendered = match spec.style {
        FieldStyle::Bare => {
            let value = raw.trim();
            if !is_bare_literal(value) {
                format!("\"{}\"", escape_quoted(value))
            } else {
                value.to_string()
            }
        }
        FieldStyle::Quoted => format!("\"{}\"", escape_quoted(raw.trim())),
        FieldStyle::Body => format!("\"{}\"", escape_quoted(&collapse_body(raw))),
        FieldStyle::Escaped => format!("\"{}\"", escape_quoted(raw)),
        FieldStyle::Array => format!("<{}>", render_array(&array_elements(raw, graph))),
        FieldStyle::IncomingArray => {
            let mut items = array_elements(raw, graph);
            if items.is_empty() {
                items = node.incoming_nodes().iter().map(|id| format!("$({})", id)).collect();
            }
            format!("<{}>", render_array(&items))
        }
    };
    Some(format!("{}={}", spec.key, rendered))
}

/// Text the observation source grammar accepts without quotes
fn is_bare_literal(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+' | '$' | '(' | ')'))
}

/// Array items, with bare task names wrapped as `$(name)`
fn array_elements(raw: &str, graph: &NodeGraph) -> Vec<String> {
    array_items(raw)
        .into_iter()
        .map(|item| {
            if is_valid_identifier(&item) && graph.contains_custom_id(&item) {
                format!("$({})", item)
            } else {
                item
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PipelineBuilder;
    use crate::job::JobType;
    use crate::types::TaskKind;

    fn fetch_parse() -> NodeGraph {
        PipelineBuilder::new()
            .add_task("fetch", TaskKind::Http)
            .with_field("url", "https://x/y")
            .add_task("parse", TaskKind::JsonParse)
            .with_field("data", "$(fetch)")
            .with_field("path", "page")
            .connect("fetch", "parse")
            .build()
    }

    #[test]
    fn test_compiles_fetch_parse_pipeline() {
        let doc = compile(&JobConfig::new(JobType::Cron), &fetch_parse());
        let expected = r#"type = "cron"
schemaVersion = 1
schedule = "CRON_TZ=UTC 0 0 18 * * *"

observationSource = """
fetch [type="http"
       method=GET
       url="https://x/y"
       requestData=""]
parse [type="jsonparse"
       data="$(fetch)"
       path="page"]

fetch -> parse
""""#;
        assert_eq!(doc.to_text(), expected);
        assert!(doc.is_valid());
    }

    #[test]
    fn test_observation_source_excludes_preamble() {
        let doc = compile(&JobConfig::new(JobType::Webhook), &fetch_parse());
        let body = doc.observation_source();
        assert!(body.starts_with("fetch [type=\"http\""));
        assert!(body.ends_with("fetch -> parse"));
        assert_eq!(body, compile_observation_source(&fetch_parse()));
    }

    #[test]
    fn test_divide_values_stay_literal() {
        let graph = PipelineBuilder::new()
            .add_task("divide", TaskKind::Divide)
            .with_field("input", "12345.67")
            .with_field("divisor", "100")
            .build();
        let body = compile_observation_source(&graph);
        assert!(body.contains("input=\"12345.67\""), "{}", body);
        assert!(body.contains("divisor=\"100\""), "{}", body);
    }

    #[test]
    fn test_missing_required_field_is_flagged_not_dropped() {
        let graph = PipelineBuilder::new().add_task("fetch", TaskKind::Http).build();
        let doc = compile(&JobConfig::new(JobType::Cron), &graph);
        let url = doc.lines.iter().find(|l| l.value.contains("url=")).unwrap();
        assert_eq!(url.value.trim(), "url=\"\"");
        assert_eq!(url.valid, Some(false));
        assert!(!doc.is_valid());
    }

    #[test]
    fn test_body_fields_are_collapsed_and_escaped() {
        let graph = PipelineBuilder::new()
            .add_task("bridge_1", TaskKind::Bridge)
            .with_field("name", "coingecko")
            .with_field("requestData", "{\n  \"data\": { \"coin\": \"eth\" }\n}")
            .build();
        let body = compile_observation_source(&graph);
        assert!(body.contains(r#"requestData="{\"data\":{\"coin\":\"eth\"}}""#), "{}", body);
        assert!(body.contains(r#"async="no"]"#), "{}", body);
    }

    #[test]
    fn test_arrays_wrap_task_references() {
        let graph = PipelineBuilder::new()
            .add_task("a", TaskKind::Http)
            .add_task("b", TaskKind::Http)
            .add_task("total", TaskKind::Sum)
            .with_field("values", "[a,$(b),3]")
            .add_task("avg", TaskKind::Mean)
            .connect("a", "avg")
            .connect("b", "avg")
            .add_task("empty", TaskKind::Median)
            .build();
        let body = compile_observation_source(&graph);
        assert!(body.contains("values=<[ $(a), $(b), 3 ]>"), "{}", body);
        assert!(!body.contains("allowedFaults"), "{}", body);
        assert!(body.contains("avg [type=\"mean\"\n     values=<[ $(a), $(b) ]>"), "{}", body);
        assert!(body.contains("values=<[]>]"), "{}", body);
    }

    #[test]
    fn test_fieldless_and_unsupported_kinds() {
        let graph = PipelineBuilder::new()
            .add_task("pick", TaskKind::Any)
            .add_task("up", TaskKind::Uppercase)
            .connect("pick", "up")
            .build();
        let body = compile_observation_source(&graph);
        assert_eq!(body, "pick [type=\"any\"]");
    }

    #[test]
    fn test_direct_request_preamble() {
        let mut config = JobConfig::new(JobType::DirectRequest);
        config.name = Some("Get > Uint256".into());
        config.external_job_id = Some("0eec7e1d-d0d2-476c-a1a8-72dfb6633f46".into());
        config.gas_limit = Some(500000);
        config.forwarding_allowed = Some(false);
        config.set_specific("contractAddress", "0x613a38AC1659769640aaE063C651F48E0250454C");

        let doc = compile(&config, &NodeGraph::new());
        let text = doc.to_text();
        assert!(text.starts_with("type = \"directrequest\"\nschemaVersion = 1\nname = \"Get > Uint256\"\n"));
        assert!(text.contains("gasLimit = \"500000\"\n"));
        assert!(text.contains("forwardingAllowed = false\n"));
        assert!(text.contains("contractAddress = \"0x613a38AC1659769640aaE063C651F48E0250454C\""));
        assert!(text.contains("minContractPaymentLinkJuels = \"0\"\nminIncomingConfirmations = 1"));
        assert!(text.ends_with("observationSource = \"\"\"\n\"\"\""));
    }

    #[test]
    fn test_empty_payment_minimum_is_omitted() {
        let mut config = JobConfig::new(JobType::DirectRequest);
        config.set_specific("minContractPaymentLinkJuels", "");
        let text = compile(&config, &NodeGraph::new()).to_text();
        assert!(!text.contains("minContractPaymentLinkJuels"), "{}", text);
        assert!(text.contains("minIncomingConfirmations = 1"), "{}", text);
    }

    #[test]
    fn test_preamble_control_characters_stay_valid_toml() {
        let mut config = JobConfig::new(JobType::Cron);
        config.name = Some("line1\nline2".into());
        config.external_job_id = Some("tab\there".into());
        config.max_task_duration = Some("10s\r\u{7}".into());
        config.gas_limit = Some(42);

        let doc = compile(&config, &fetch_parse());
        let text = doc.to_text();
        assert!(text.contains("name = \"line1\\nline2\"\n"), "{}", text);
        assert!(text.contains("maxTaskDuration = \"10s\\r\\u0007\"\n"), "{}", text);

        let imported = crate::import::import_job_spec(&text).unwrap();
        let round = &imported.job.config;
        assert_eq!(round.name.as_deref(), Some("line1\nline2"));
        assert_eq!(round.external_job_id.as_deref(), Some("tab\there"));
        assert_eq!(round.max_task_duration.as_deref(), Some("10s\r\u{7}"));
        assert_eq!(round.gas_limit, Some(42));
        assert_eq!(compile(round, &imported.job.graph).to_text(), text);
    }

    #[test]
    fn test_empty_fields_fall_back_to_defaults() {
        let graph = PipelineBuilder::new()
            .add_task("fetch", TaskKind::Http)
            .with_field("method", "")
            .with_field("url", "https://x/y")
            .add_task("bridge_1", TaskKind::Bridge)
            .with_field("name", "coingecko")
            .with_field("async", " ")
            .add_task("avg", TaskKind::Mean)
            .with_field("precision", "")
            .build();
        let body = compile_observation_source(&graph);
        assert!(body.contains("method=GET\n"), "{}", body);
        assert!(!body.contains("method=\"\""), "{}", body);
        assert!(body.contains("async=\"no\"]"), "{}", body);
        assert!(body.contains("precision=2]"), "{}", body);
    }

    #[test]
    fn test_multiline_values_split_into_lines() {
        let data = "{\n  \"a\": 1\n}";
        let graph = PipelineBuilder::new()
            .add_task("encode", TaskKind::EthAbiEncode)
            .with_field("data", data)
            .build();
        let doc = compile(&JobConfig::new(JobType::Webhook), &graph);

        let body: Vec<&DocumentLine> = doc.lines.iter().filter(|l| l.is_observation_src).collect();
        assert!(body.iter().all(|l| !l.value.contains('\n')));
        assert!(body.iter().all(|l| l.valid == body[0].valid));
        let data_lines: Vec<&str> = body
            .iter()
            .map(|l| l.value.as_str())
            .skip_while(|l| !l.trim_start().starts_with("data="))
            .collect();
        assert_eq!(data_lines, vec!["        data=\"{", "  \\\"a\\\": 1", "}\"]"]);

        let parsed = crate::parser::parse_graph(&doc.observation_source()).unwrap();
        assert_eq!(parsed.node_by_custom_id("encode").unwrap().field("data"), data);
    }

    #[test]
    fn test_compile_is_idempotent() {
        let graph = fetch_parse();
        let config = JobConfig::new(JobType::Cron);
        assert_eq!(compile(&config, &graph), compile(&config, &graph));
    }
}
