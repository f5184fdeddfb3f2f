//! TOML job-spec import
//!
//! Turns job-spec text (the same shape the compiler emits) back into a
//! [`Job`]. The observation source body is lifted out verbatim before the
//! preamble goes through `toml`, so DOT escapes inside it reach the parser
//! untouched.

use std::str::FromStr;

use crate::error::{EngineError, Result};
use crate::job::{Job, JobConfig, JobFieldStyle, JobType};
use crate::parser::parse_graph;

const OBSERVATION_SOURCE_KEY: &str = "observationSource";
const CRON_PREFIX: &str = "CRON_TZ=UTC";

/// Keys read from the preamble besides the job-type specifics
const PREAMBLE_KEYS: &[&str] = &[
    "type",
    "schemaVersion",
    "name",
    "externalJobId",
    "gasLimit",
    "maxTaskDuration",
    "forwardingAllowed",
    OBSERVATION_SOURCE_KEY,
];

/// An imported job plus everything that was tolerated along the way
#[derive(Debug, Clone)]
pub struct ImportedJob {
    pub job: Job,
    pub warnings: Vec<String>,
}

/// Import a TOML job spec.
///
/// Invalid TOML, a missing or unknown `type` and a malformed observation
/// source are errors. Missing optional parts and values of the wrong type are
/// reported as warnings and left at their defaults.
pub fn import_job_spec(text: &str) -> Result<ImportedJob> {
    let (preamble, body) = split_observation_source(text);
    let table: toml::Table =
        toml::from_str(&preamble).map_err(|e| EngineError::import(format!("invalid TOML: {}", e)))?;

    let type_name = table
        .get("type")
        .and_then(toml::Value::as_str)
        .ok_or_else(|| EngineError::import("job spec has no 'type'"))?;
    let job_type = JobType::from_str(type_name).map_err(EngineError::import)?;

    let mut warnings = Vec::new();
    let mut config = JobConfig::new(job_type);
    read_preamble(&table, &mut config, &mut warnings);
    read_specifics(&table, &mut config, &mut warnings);

    for key in table.keys() {
        let known = PREAMBLE_KEYS.contains(&key.as_str())
            || job_type.field_specs().iter().any(|spec| spec.key == key);
        if !known {
            warnings.push(format!("ignored unknown key '{}'", key));
        }
    }

    let body = body.or_else(|| {
        table
            .get(OBSERVATION_SOURCE_KEY)
            .and_then(toml::Value::as_str)
            .map(str::to_string)
    });
    let graph = match body {
        Some(body) => parse_graph(&body)?,
        None => {
            warnings.push("job spec has no observationSource".to_string());
            Default::default()
        }
    };

    for warning in &warnings {
        log::warn!("Import: {}", warning);
    }
    Ok(ImportedJob {
        job: Job { config, graph },
        warnings,
    })
}

fn read_preamble(table: &toml::Table, config: &mut JobConfig, warnings: &mut Vec<String>) {
    let mut mistyped = |key: &str, expected: &str| {
        warnings.push(format!("'{}' should be {}; ignored", key, expected));
    };

    if let Some(value) = table.get("name") {
        match value.as_str() {
            Some(name) => config.name = Some(name.to_string()),
            None => mistyped("name", "a string"),
        }
    }
    if let Some(value) = table.get("externalJobId") {
        match value.as_str() {
            Some(id) => config.external_job_id = Some(id.to_string()),
            None => mistyped("externalJobId", "a string"),
        }
    }
    if let Some(value) = table.get("gasLimit") {
        let limit = match value {
            toml::Value::Integer(n) => u64::try_from(*n).ok(),
            toml::Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        match limit {
            Some(limit) => config.gas_limit = Some(limit),
            None => mistyped("gasLimit", "a non-negative integer"),
        }
    }
    if let Some(value) = table.get("maxTaskDuration") {
        match value.as_str() {
            Some(duration) => config.max_task_duration = Some(duration.to_string()),
            None => mistyped("maxTaskDuration", "a string"),
        }
    }
    if let Some(value) = table.get("forwardingAllowed") {
        match value.as_bool() {
            Some(allowed) => config.forwarding_allowed = Some(allowed),
            None => mistyped("forwardingAllowed", "a boolean"),
        }
    }
}

fn read_specifics(table: &toml::Table, config: &mut JobConfig, warnings: &mut Vec<String>) {
    for spec in config.job_type.field_specs() {
        let Some(value) = table.get(spec.key) else {
            if spec.style == JobFieldStyle::CronSchedule {
                warnings.push(format!("{} job has no {}", config.job_type, spec.key));
            }
            continue;
        };
        let text = match value {
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(n) => n.to_string(),
            other => {
                warnings.push(format!("'{}' has unsupported value {}; ignored", spec.key, other));
                continue;
            }
        };
        let text = match spec.style {
            JobFieldStyle::CronSchedule => text
                .strip_prefix(CRON_PREFIX)
                .map(|rest| rest.trim_start().to_string())
                .unwrap_or(text),
            _ => text,
        };
        config.set_specific(spec.key, text);
        if config.specific(spec.key).is_some_and(|f| !f.valid) {
            warnings.push(format!("'{}' is not valid", spec.key));
        }
    }
}

/// Split off a `observationSource = """ ... """` block.
///
/// Returns the remaining preamble text and the raw body, or the text
/// unchanged when there is no triple-quoted block.
fn split_observation_source(text: &str) -> (String, Option<String>) {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let opens_block = trimmed
            .strip_prefix(OBSERVATION_SOURCE_KEY)
            .map(str::trim_start)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::trim_start)
            .is_some_and(|rest| rest.starts_with("\"\"\""));
        if opens_block {
            let open = offset + line.find("\"\"\"").unwrap_or(0) + 3;
            let after_open = &text[open..];
            let Some(close) = after_open.find("\"\"\"") else {
                break;
            };
            let body = after_open[..close]
                .strip_prefix("\r\n")
                .or_else(|| after_open[..close].strip_prefix('\n'))
                .unwrap_or(&after_open[..close]);
            let preamble = format!("{}{}", &text[..offset], &after_open[close + 3..]);
            return (preamble, Some(body.to_string()));
        }
        offset += line.len();
    }
    (text.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskKind;

    const CRON_SPEC: &str = r#"type = "cron"
schemaVersion = 1
name = "ticker"
externalJobId = "0eec7e1d-d0d2-476c-a1a8-72dfb6633f46"
schedule = "CRON_TZ=UTC 0 0 18 * * *"

observationSource = """
fetch [type="http"
       method=GET
       url="https://x/y?q=\"a\""]
parse [type="jsonparse" data="$(fetch)" path="page"]

fetch -> parse
"""
"#;

    #[test]
    fn test_import_cron_spec() {
        let imported = import_job_spec(CRON_SPEC).unwrap();
        assert!(imported.warnings.is_empty(), "{:?}", imported.warnings);

        let config = &imported.job.config;
        assert_eq!(config.job_type, JobType::Cron);
        assert_eq!(config.name.as_deref(), Some("ticker"));
        assert_eq!(config.specific("schedule").unwrap().value, "0 0 18 * * *");

        let graph = &imported.job.graph;
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges().len(), 1);
        let fetch = graph.node_by_custom_id("fetch").unwrap();
        assert_eq!(fetch.kind(), TaskKind::Http);
        assert_eq!(fetch.field("url"), r#"https://x/y?q="a""#);
    }

    #[test]
    fn test_missing_parts_are_warnings() {
        let imported = import_job_spec("type = \"cron\"\ngasLimit = \"lots\"\nextra = 1\n").unwrap();
        assert_eq!(imported.warnings.len(), 4, "{:?}", imported.warnings);
        assert!(imported.job.graph.is_empty());
        assert_eq!(imported.job.config.gas_limit, None);
    }

    #[test]
    fn test_gas_limit_as_string_or_integer() {
        for text in ["type = \"webhook\"\ngasLimit = \"500000\"\n", "type = \"webhook\"\ngasLimit = 500000\n"] {
            let imported = import_job_spec(text).unwrap();
            assert_eq!(imported.job.config.gas_limit, Some(500_000), "{}", text);
        }
        let negative = import_job_spec("type = \"webhook\"\ngasLimit = -1\n").unwrap();
        assert_eq!(negative.job.config.gas_limit, None);
        assert!(negative.warnings.iter().any(|w| w.contains("gasLimit")));
    }

    #[test]
    fn test_directrequest_fields() {
        let text = r#"type = "directrequest"
contractAddress = "0x613a38AC1659769640aaE063C651F48E0250454C"
minContractPaymentLinkJuels = 100
minIncomingConfirmations = 3
observationSource = "a [type=\"any\"]"
"#;
        let imported = import_job_spec(text).unwrap();
        let config = &imported.job.config;
        assert_eq!(config.specific("minContractPaymentLinkJuels").unwrap().value, "100");
        assert_eq!(config.specific("minIncomingConfirmations").unwrap().value, "3");
        assert!(config.is_valid());
        assert_eq!(imported.job.graph.len(), 1);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(import_job_spec("name = \"x\""), Err(EngineError::Import(_))));
        assert!(matches!(import_job_spec("type = \"nope\""), Err(EngineError::Import(_))));
        assert!(matches!(import_job_spec("type = "), Err(EngineError::Import(_))));
        assert!(matches!(
            import_job_spec("type = \"webhook\"\nobservationSource = \"\"\"\na [\n\"\"\"\n"),
            Err(EngineError::Parse(_))
        ));
    }
}
