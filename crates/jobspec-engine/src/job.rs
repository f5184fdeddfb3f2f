//! Job-level configuration
//!
//! The job preamble (type, name, external job id, gas limit, ...), the
//! job-type-specific fields with their per-field validity, and the job-run
//! variables that tasks can reference during simulation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::graph::NodeGraph;
use crate::validation::validate_job_field;

/// Default cron schedule for new cron jobs
pub const DEFAULT_CRON_SCHEDULE: &str = "0 0 18 * * *";

/// Kind of job a job spec describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    #[default]
    Cron,
    DirectRequest,
    FluxMonitor,
    Keeper,
    OffchainReporting,
    Webhook,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::Cron,
        JobType::DirectRequest,
        JobType::FluxMonitor,
        JobType::Keeper,
        JobType::OffchainReporting,
        JobType::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cron => "cron",
            Self::DirectRequest => "directrequest",
            Self::FluxMonitor => "fluxmonitor",
            Self::Keeper => "keeper",
            Self::OffchainReporting => "offchainreporting",
            Self::Webhook => "webhook",
        }
    }

    /// Job-type-specific preamble fields, in render order
    pub fn field_specs(&self) -> &'static [JobFieldSpec] {
        match self {
            Self::Cron => CRON_FIELDS,
            Self::DirectRequest => DIRECT_REQUEST_FIELDS,
            _ => &[],
        }
    }

    /// Job-run variables the runtime provides for this job type
    pub fn default_run_variables(&self) -> Vec<JobVariable> {
        match self {
            Self::DirectRequest => vec![
                JobVariable::new("logBlockHash", VarDataType::Bytes32, ""),
                JobVariable::new("logBlockNumber", VarDataType::Int, ""),
                JobVariable::new("logTxHash", VarDataType::Bytes32, ""),
                JobVariable::new("logAddress", VarDataType::Address, ""),
                JobVariable::new("logTopics", VarDataType::String, ""),
                JobVariable::new("logData", VarDataType::Bytes, ""),
            ],
            Self::Webhook => vec![JobVariable::new("requestBody", VarDataType::String, "")],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("invalid job type '{}'", s))
    }
}

/// How a job-type-specific field is rendered in the preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFieldStyle {
    /// `schedule = "CRON_TZ=UTC <value>"`
    CronSchedule,
    /// `key = "value"`
    Quoted,
    /// `key = "value"`, omitted when empty
    QuotedOptional,
    /// `key = value`, omitted when empty
    Bare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobFieldSpec {
    pub key: &'static str,
    pub style: JobFieldStyle,
    pub default: &'static str,
}

const CRON_FIELDS: &[JobFieldSpec] = &[JobFieldSpec {
    key: "schedule",
    style: JobFieldStyle::CronSchedule,
    default: DEFAULT_CRON_SCHEDULE,
}];

const DIRECT_REQUEST_FIELDS: &[JobFieldSpec] = &[
    JobFieldSpec {
        key: "contractAddress",
        style: JobFieldStyle::Quoted,
        default: "",
    },
    JobFieldSpec {
        key: "minContractPaymentLinkJuels",
        style: JobFieldStyle::QuotedOptional,
        default: "0",
    },
    JobFieldSpec {
        key: "minIncomingConfirmations",
        style: JobFieldStyle::Bare,
        default: "1",
    },
];

/// A job-type-specific value and whether it currently validates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobField {
    pub value: String,
    pub valid: bool,
}

/// Data type of a job-run variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarDataType {
    String,
    Bytes,
    Bytes32,
    Int,
    Float,
    Decimal,
    Bool,
    Address,
    Null,
}

/// A job-run variable with a test value used during simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobVariable {
    pub name: String,
    pub data_type: VarDataType,
    pub value: String,
}

impl JobVariable {
    pub fn new(name: impl Into<String>, data_type: VarDataType, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type,
            value: value.into(),
        }
    }

    /// Typed value; text that does not parse as the declared type stays a string
    pub fn to_value(&self) -> Value {
        let text = self.value.trim();
        match self.data_type {
            VarDataType::Null => Value::Null,
            VarDataType::Int => text
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(self.value.clone())),
            VarDataType::Float => text
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(self.value.clone())),
            VarDataType::Bool => match text {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(self.value.clone()),
            },
            _ => Value::String(self.value.clone()),
        }
    }
}

/// Job-level configuration rendered into the preamble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_task_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarding_allowed: Option<bool>,
    #[serde(default)]
    pub specifics: BTreeMap<String, JobField>,
    #[serde(default)]
    pub run_variables: Vec<JobVariable>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self::new(JobType::default())
    }
}

impl JobConfig {
    /// Config for a job type with its default specifics and run variables
    pub fn new(job_type: JobType) -> Self {
        let mut config = Self {
            job_type,
            name: None,
            external_job_id: None,
            gas_limit: None,
            max_task_duration: None,
            forwarding_allowed: None,
            specifics: BTreeMap::new(),
            run_variables: job_type.default_run_variables(),
        };
        for spec in job_type.field_specs() {
            config.set_specific(spec.key, spec.default);
        }
        config
    }

    /// Switch job type, replacing specifics and run variables with the new defaults
    pub fn set_job_type(&mut self, job_type: JobType) {
        let mut fresh = Self::new(job_type);
        fresh.name = self.name.take();
        fresh.external_job_id = self.external_job_id.take();
        fresh.gas_limit = self.gas_limit;
        fresh.max_task_duration = self.max_task_duration.take();
        fresh.forwarding_allowed = self.forwarding_allowed;
        *self = fresh;
    }

    /// Set a job-type-specific field, revalidating it
    pub fn set_specific(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let valid = validate_job_field(self.job_type, key, &value);
        self.specifics.insert(key.to_string(), JobField { value, valid });
    }

    pub fn specific(&self, key: &str) -> Option<&JobField> {
        self.specifics.get(key)
    }

    /// Set (or add) the test value of a job-run variable
    pub fn set_run_variable(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.run_variables.iter_mut().find(|v| v.name == name) {
            Some(var) => var.value = value,
            None => self
                .run_variables
                .push(JobVariable::new(name, VarDataType::String, value)),
        }
    }

    /// True when every job-type-specific field validates
    pub fn is_valid(&self) -> bool {
        self.specifics.values().all(|f| f.valid)
    }

    /// The `jobSpec` and `jobRun` namespaces seen by the first simulated task
    pub fn job_level_vars(&self) -> Map<String, Value> {
        let mut job_spec = Map::new();
        job_spec.insert("databaseID".into(), json!(0));
        job_spec.insert(
            "externalJobID".into(),
            json!(self.external_job_id.clone().unwrap_or_default()),
        );
        job_spec.insert("name".into(), json!(self.name.clone().unwrap_or_default()));

        let mut job_run = Map::new();
        for var in &self.run_variables {
            job_run.insert(var.name.clone(), var.to_value());
        }

        let mut vars = Map::new();
        vars.insert("jobSpec".into(), Value::Object(job_spec));
        vars.insert("jobRun".into(), Value::Object(job_run));
        vars
    }
}

/// A job: its configuration plus the task graph it owns
#[derive(Debug, Clone, Default)]
pub struct Job {
    pub config: JobConfig,
    pub graph: NodeGraph,
}

impl Job {
    pub fn new(job_type: JobType) -> Self {
        Self {
            config: JobConfig::new(job_type),
            graph: NodeGraph::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_defaults() {
        let config = JobConfig::new(JobType::Cron);
        let schedule = config.specific("schedule").unwrap();
        assert_eq!(schedule.value, DEFAULT_CRON_SCHEDULE);
        assert!(schedule.valid);
        assert!(config.run_variables.is_empty());
    }

    #[test]
    fn test_direct_request_field_validity() {
        let mut config = JobConfig::new(JobType::DirectRequest);
        assert!(!config.specific("contractAddress").unwrap().valid);
        assert!(!config.is_valid());

        config.set_specific("contractAddress", "0x613a38AC1659769640aaE063C651F48E0250454C");
        config.set_specific("minIncomingConfirmations", "0");
        assert!(config.specific("contractAddress").unwrap().valid);
        assert!(!config.specific("minIncomingConfirmations").unwrap().valid);

        config.set_specific("minIncomingConfirmations", "3");
        assert!(config.is_valid());
    }

    #[test]
    fn test_switching_type_keeps_common_fields() {
        let mut config = JobConfig::new(JobType::Cron);
        config.name = Some("price feed".into());
        config.set_job_type(JobType::Webhook);
        assert_eq!(config.name.as_deref(), Some("price feed"));
        assert!(config.specifics.is_empty());
        assert_eq!(config.run_variables[0].name, "requestBody");
    }

    #[test]
    fn test_job_level_vars() {
        let mut config = JobConfig::new(JobType::DirectRequest);
        config.external_job_id = Some("abc".into());
        config.set_run_variable("logBlockNumber", "42");
        config.set_run_variable("logData", "0xdead");

        let vars = config.job_level_vars();
        assert_eq!(vars["jobSpec"]["externalJobID"], json!("abc"));
        assert_eq!(vars["jobRun"]["logBlockNumber"], json!(42));
        assert_eq!(vars["jobRun"]["logData"], json!("0xdead"));
    }

    #[test]
    fn test_job_type_parse() {
        assert_eq!("DirectRequest".parse::<JobType>().unwrap(), JobType::DirectRequest);
        assert!("bogus".parse::<JobType>().is_err());
    }
}
