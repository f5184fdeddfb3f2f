//! Task catalog: static metadata for every task kind
//!
//! Each [`TaskDescriptor`] is the single source of truth for a kind's
//! label, category and field layout. The compiler renders fields in the
//! order listed here, validation reads the rules, and new nodes start from
//! the defaults.

use serde::Serialize;

use crate::types::{FieldValue, TaskKind, TaskSpecific};

/// Palette grouping for a task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// HTTP and external adapters
    Network,
    /// Decoders and parsers
    Parsing,
    /// Arithmetic
    Math,
    /// Reducers over several inputs
    Aggregation,
    /// On-chain calls and ABI codecs
    Chain,
    /// Comparisons and lookups
    Logic,
    /// String transforms
    Text,
}

/// How a field value is rendered into the observation source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStyle {
    /// `key=value`, no quoting
    Bare,
    /// `key="value"`, quotes and backslashes escaped
    Quoted,
    /// `key="value"`, whitespace outside strings removed, then escaped
    Body,
    /// `key="value"`, escaped but whitespace kept
    Escaped,
    /// `key=<[ a, b ]>` from the field's own items
    Array,
    /// `key=<[ $(a), $(b) ]>` from the field's items, or from the node's
    /// incoming nodes when the field is empty
    IncomingArray,
}

impl FieldStyle {
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array | Self::IncomingArray)
    }
}

/// Static validation rule for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRule {
    Optional,
    NonEmpty,
    /// Non-empty `0x`-prefixed 20-byte hex address (or a variable reference)
    Address,
}

/// Layout of a single task field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub key: &'static str,
    pub style: FieldStyle,
    pub default: &'static str,
    pub rule: FieldRule,
    /// Skip the attribute line entirely when the value is empty
    pub omit_when_empty: bool,
}

impl FieldSpec {
    const fn new(key: &'static str, style: FieldStyle) -> Self {
        Self {
            key,
            style,
            default: "",
            rule: FieldRule::Optional,
            omit_when_empty: false,
        }
    }

    const fn quoted(key: &'static str) -> Self {
        Self::new(key, FieldStyle::Quoted)
    }

    const fn required(self) -> Self {
        Self {
            rule: FieldRule::NonEmpty,
            ..self
        }
    }

    const fn address(self) -> Self {
        Self {
            rule: FieldRule::Address,
            ..self
        }
    }

    const fn default_value(self, default: &'static str) -> Self {
        Self { default, ..self }
    }

    const fn omit_when_empty(self) -> Self {
        Self {
            omit_when_empty: true,
            ..self
        }
    }
}

/// Complete metadata for a task kind
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub label: &'static str,
    pub category: TaskCategory,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
}

impl TaskDescriptor {
    /// Whether evaluating this kind pauses for a run/skip decision
    pub fn is_side_effect(&self) -> bool {
        self.kind.is_side_effect()
    }

    pub fn field(&self, key: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Fresh task parameters holding every field's default value
    pub fn defaults(&self) -> TaskSpecific {
        self.fields
            .iter()
            .map(|f| (f.key.to_string(), FieldValue::new(f.default)))
            .collect()
    }
}

use FieldStyle::{Array, Bare, Body, Escaped, IncomingArray};

const HTTP_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("method", Bare).default_value("GET"),
    FieldSpec::quoted("url").required(),
    FieldSpec::new("requestData", Body),
];
const BRIDGE_FIELDS: &[FieldSpec] = &[
    FieldSpec::quoted("name").required(),
    FieldSpec::new("requestData", Body),
    FieldSpec::quoted("async").default_value("no"),
];
const JSONPARSE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("data", Body),
    FieldSpec::quoted("path").required(),
];
const CBORPARSE_FIELDS: &[FieldSpec] = &[
    FieldSpec::quoted("data").required(),
    FieldSpec::quoted("mode").default_value("diet"),
];
const ETHTX_FIELDS: &[FieldSpec] = &[
    FieldSpec::quoted("to").address(),
    FieldSpec::quoted("data").required(),
];
const ETHCALL_FIELDS: &[FieldSpec] = &[
    FieldSpec::quoted("contract").address(),
    FieldSpec::quoted("data").required(),
];
const SUM_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("values", Array),
    FieldSpec::new("allowedFaults", Bare).omit_when_empty(),
];
const MULTIPLY_FIELDS: &[FieldSpec] = &[
    FieldSpec::quoted("input"),
    FieldSpec::quoted("times").required(),
];
const DIVIDE_FIELDS: &[FieldSpec] = &[
    FieldSpec::quoted("input"),
    FieldSpec::quoted("divisor").required(),
    FieldSpec::quoted("precision"),
];
const MEAN_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("values", IncomingArray),
    FieldSpec::new("precision", Bare).default_value("2"),
];
const REDUCER_FIELDS: &[FieldSpec] = &[FieldSpec::new("values", IncomingArray)];
const ABI_DECODE_LOG_FIELDS: &[FieldSpec] = &[
    FieldSpec::quoted("abi").required(),
    FieldSpec::quoted("data"),
    FieldSpec::quoted("topics"),
];
const ABI_DECODE_FIELDS: &[FieldSpec] = &[
    FieldSpec::quoted("abi").required(),
    FieldSpec::quoted("data"),
];
const ABI_ENCODE_FIELDS: &[FieldSpec] = &[
    FieldSpec::quoted("abi").required(),
    FieldSpec::new("data", Escaped),
];
const LESSTHAN_FIELDS: &[FieldSpec] = &[
    FieldSpec::quoted("left").required(),
    FieldSpec::quoted("right").required(),
];
const LENGTH_FIELDS: &[FieldSpec] = &[FieldSpec::quoted("input").required()];
const LOOKUP_FIELDS: &[FieldSpec] = &[FieldSpec::quoted("key").required()];
const TEXT_FIELDS: &[FieldSpec] = &[FieldSpec::quoted("input")];
const MERGE_FIELDS: &[FieldSpec] = &[FieldSpec::quoted("left"), FieldSpec::quoted("right")];

const fn describe(
    kind: TaskKind,
    label: &'static str,
    category: TaskCategory,
    description: &'static str,
    fields: &'static [FieldSpec],
) -> TaskDescriptor {
    TaskDescriptor {
        kind,
        label,
        category,
        description,
        fields,
    }
}

/// Descriptors indexed by `TaskKind as usize`, in `TaskKind::ALL` order
static DESCRIPTORS: [TaskDescriptor; 22] = [
    describe(TaskKind::Http, "HTTP", TaskCategory::Network, "Fetch a URL", HTTP_FIELDS),
    describe(TaskKind::Bridge, "Bridge", TaskCategory::Network, "Call an external adapter", BRIDGE_FIELDS),
    describe(TaskKind::JsonParse, "JSON Parse", TaskCategory::Parsing, "Extract a value from JSON by path", JSONPARSE_FIELDS),
    describe(TaskKind::CborParse, "CBOR Parse", TaskCategory::Parsing, "Decode CBOR request data", CBORPARSE_FIELDS),
    describe(TaskKind::EthTx, "ETH Tx", TaskCategory::Chain, "Send a transaction", ETHTX_FIELDS),
    describe(TaskKind::EthCall, "ETH Call", TaskCategory::Chain, "Call a contract read method", ETHCALL_FIELDS),
    describe(TaskKind::Sum, "Sum", TaskCategory::Aggregation, "Add a list of values", SUM_FIELDS),
    describe(TaskKind::Multiply, "Multiply", TaskCategory::Math, "Multiply input by a factor", MULTIPLY_FIELDS),
    describe(TaskKind::Divide, "Divide", TaskCategory::Math, "Divide input by a divisor", DIVIDE_FIELDS),
    describe(TaskKind::Any, "Any", TaskCategory::Aggregation, "Pick any non-error input", &[]),
    describe(TaskKind::Mean, "Mean", TaskCategory::Aggregation, "Average of the inputs", MEAN_FIELDS),
    describe(TaskKind::Mode, "Mode", TaskCategory::Aggregation, "Most common input", REDUCER_FIELDS),
    describe(TaskKind::Median, "Median", TaskCategory::Aggregation, "Median of the inputs", REDUCER_FIELDS),
    describe(TaskKind::EthAbiDecodeLog, "ABI Decode Log", TaskCategory::Chain, "Decode an event log", ABI_DECODE_LOG_FIELDS),
    describe(TaskKind::EthAbiDecode, "ABI Decode", TaskCategory::Chain, "Decode ABI-encoded bytes", ABI_DECODE_FIELDS),
    describe(TaskKind::EthAbiEncode, "ABI Encode", TaskCategory::Chain, "Encode values with an ABI", ABI_ENCODE_FIELDS),
    describe(TaskKind::LessThan, "Less Than", TaskCategory::Logic, "Compare two values", LESSTHAN_FIELDS),
    describe(TaskKind::Length, "Length", TaskCategory::Logic, "Length of a byte string", LENGTH_FIELDS),
    describe(TaskKind::Lookup, "Lookup", TaskCategory::Logic, "Read a key from a map", LOOKUP_FIELDS),
    describe(TaskKind::Uppercase, "Uppercase", TaskCategory::Text, "Uppercase a string", TEXT_FIELDS),
    describe(TaskKind::Lowercase, "Lowercase", TaskCategory::Text, "Lowercase a string", TEXT_FIELDS),
    describe(TaskKind::Merge, "Merge", TaskCategory::Text, "Merge two maps", MERGE_FIELDS),
];

/// Metadata for a task kind
pub fn descriptor(kind: TaskKind) -> &'static TaskDescriptor {
    &DESCRIPTORS[kind as usize]
}

/// All descriptors, in palette order
pub fn descriptors() -> &'static [TaskDescriptor] {
    &DESCRIPTORS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_table_matches_kind_order() {
        for kind in TaskKind::ALL {
            assert_eq!(descriptor(kind).kind, kind);
        }
        assert_eq!(descriptors().len(), TaskKind::ALL.len());
    }

    #[test]
    fn test_defaults() {
        let http = descriptor(TaskKind::Http).defaults();
        assert_eq!(http["method"].raw, "GET");
        assert_eq!(http["url"].raw, "");

        assert_eq!(descriptor(TaskKind::Bridge).defaults()["async"].raw, "no");
        assert_eq!(descriptor(TaskKind::CborParse).defaults()["mode"].raw, "diet");
        assert_eq!(descriptor(TaskKind::Mean).defaults()["precision"].raw, "2");
        assert!(descriptor(TaskKind::Any).defaults().is_empty());
    }

    #[test]
    fn test_side_effect_kinds() {
        let side_effects: Vec<TaskKind> = descriptors()
            .iter()
            .filter(|d| d.is_side_effect())
            .map(|d| d.kind)
            .collect();
        assert_eq!(
            side_effects,
            vec![TaskKind::Http, TaskKind::Bridge, TaskKind::EthTx, TaskKind::EthCall]
        );
    }
}
