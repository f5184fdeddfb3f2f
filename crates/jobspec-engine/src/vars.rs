//! Variable resolution for `$(ref)` tokens
//!
//! Field text may reference job-level variables (`$(jobSpec.externalJobId)`,
//! `$(jobRun.logData)`) or the value of an earlier task (`$(fetch)`,
//! `$(parse.data.0)`). Resolution happens at evaluation time against a flat
//! snapshot; unresolved references become `null` instead of failing the field.

use serde_json::{Map, Value};

use crate::catalog::FieldStyle;
use crate::fields::{array_items, token_spans, unhighlight};

/// A parsed `$(id.path...)` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The first segment: a task custom id or a job-level namespace
    pub id: String,
    /// Remaining segments: object keys or array indices
    pub path: Vec<String>,
}

impl Reference {
    fn parse(token: &str) -> Option<Self> {
        let inner = token.strip_prefix("$(")?.strip_suffix(')')?;
        let mut segments = inner.split('.').map(str::to_string);
        let id = segments.next()?;
        Some(Self {
            id,
            path: segments.collect(),
        })
    }
}

/// All references in `text`, in order of appearance
pub fn find_references(text: &str) -> Vec<Reference> {
    let plain = unhighlight(text);
    token_spans(&plain)
        .into_iter()
        .filter_map(|(start, end)| Reference::parse(&plain[start..end]))
        .collect()
}

/// Rewrite every reference whose id is `from` to point at `to`, keeping paths
pub fn rename_references(text: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, end) in token_spans(text) {
        out.push_str(&text[last..start]);
        match Reference::parse(&text[start..end]) {
            Some(reference) if reference.id == from => {
                out.push_str("$(");
                out.push_str(to);
                for segment in &reference.path {
                    out.push('.');
                    out.push_str(segment);
                }
                out.push(')');
            }
            _ => out.push_str(&text[start..end]),
        }
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

/// Flat variable snapshot a task's fields are resolved against
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarSnapshot {
    values: Map<String, Value>,
}

impl VarSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) every entry of `vars`
    pub fn extend(&mut self, vars: &Map<String, Value>) {
        for (key, value) in vars {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }

    /// Follow a reference's path through the snapshot
    pub fn lookup(&self, reference: &Reference) -> Option<&Value> {
        let mut current = self.values.get(&reference.id)?;
        for segment in &reference.path {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl From<Map<String, Value>> for VarSnapshot {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// Resolve a free-text field.
///
/// A field consisting of exactly one token resolves to the referenced value
/// itself (objects stay objects). Otherwise each token is interpolated as
/// text and the result is a string.
pub fn resolve_text(text: &str, snapshot: &VarSnapshot) -> Value {
    let plain = unhighlight(text);
    let spans = token_spans(&plain);
    let trimmed = plain.trim();

    if spans.len() == 1 {
        let (start, end) = spans[0];
        if &plain[start..end] == trimmed {
            return Reference::parse(trimmed)
                .and_then(|r| snapshot.lookup(&r).cloned())
                .unwrap_or(Value::Null);
        }
    }
    if spans.is_empty() {
        return Value::String(plain);
    }

    let mut out = String::with_capacity(plain.len());
    let mut last = 0;
    for (start, end) in spans {
        out.push_str(&plain[last..start]);
        let resolved = Reference::parse(&plain[start..end]).and_then(|r| snapshot.lookup(&r).cloned());
        match resolved {
            Some(Value::String(s)) => out.push_str(&s),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push_str("null"),
        }
        last = end;
    }
    out.push_str(&plain[last..]);
    Value::String(out)
}

/// Resolve a field according to its render style.
///
/// Array fields resolve item by item into a JSON array; bare fields read
/// numbers and booleans as literals.
pub fn resolve_field(raw: &str, style: FieldStyle, snapshot: &VarSnapshot) -> Value {
    match style {
        FieldStyle::Array | FieldStyle::IncomingArray => {
            let items = array_items(&unhighlight(raw));
            Value::Array(items.iter().map(|item| resolve_item(item, snapshot)).collect())
        }
        FieldStyle::Bare => literal(resolve_text(raw, snapshot)),
        _ => resolve_text(raw, snapshot),
    }
}

/// Unquoted text that reads as a JSON literal (number, bool) becomes that literal
fn literal(value: Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}

fn resolve_item(item: &str, snapshot: &VarSnapshot) -> Value {
    let trimmed = item.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(|s| Value::String(s.to_string()));
    if let Some(value) = unquoted {
        return value;
    }
    literal(resolve_text(trimmed, snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> VarSnapshot {
        let mut snapshot = VarSnapshot::new();
        snapshot.insert("fetch", json!({"page": 2, "items": [10, 20]}));
        snapshot.insert("name", json!("eth"));
        snapshot.insert("jobRun", json!({"logData": "0x01"}));
        snapshot
    }

    #[test]
    fn test_find_references() {
        let refs = find_references("<var>$(fetch.items.1)</var> and $(jobRun.logData)");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].id, "fetch");
        assert_eq!(refs[0].path, vec!["items", "1"]);
        assert_eq!(refs[1].id, "jobRun");
    }

    #[test]
    fn test_single_token_keeps_value_type() {
        let s = snapshot();
        assert_eq!(resolve_text("$(fetch)", &s), json!({"page": 2, "items": [10, 20]}));
        assert_eq!(resolve_text(" $(fetch.items.1) ", &s), json!(20));
        assert_eq!(resolve_text("<var>$(fetch.page)</var>", &s), json!(2));
    }

    #[test]
    fn test_interpolation_and_partial_resolution() {
        let s = snapshot();
        assert_eq!(
            resolve_text("https://x/$(name)/$(fetch.page)?q=$(missing)", &s),
            json!("https://x/eth/2?q=null")
        );
        assert_eq!(resolve_text("$(missing.deep)", &s), Value::Null);
        assert_eq!(resolve_text("plain", &s), json!("plain"));
    }

    #[test]
    fn test_array_field() {
        let s = snapshot();
        let resolved = resolve_field("[ $(fetch.page), 3, \"x\" ]", FieldStyle::Array, &s);
        assert_eq!(resolved, json!([2, 3, "x"]));
    }

    #[test]
    fn test_rename_references() {
        assert_eq!(
            rename_references("$(fetch) + $(fetch.page) + $(fetcher)", "fetch", "http_1"),
            "$(http_1) + $(http_1.page) + $(fetcher)"
        );
    }
}
