//! `{{name}}` placeholder substitution and dotted-path lookup.
//!
//! Placeholders name a result (`{{research}}`) or a path inside one
//! (`{{profile.name}}`, `{{items.0}}`). Strings render raw, null renders as
//! the empty string and any other value renders as compact JSON. Undefined
//! placeholders render as the empty string and log a warning.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::warn;

use crate::models::Variables;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder regex should be valid")
});

/// Something dotted paths can be resolved against.
pub trait Scope {
    /// Resolves `path`; the empty path names the scope itself.
    fn resolve(&self, path: &str) -> Option<&Value>;
}

impl Scope for Variables {
    fn resolve(&self, path: &str) -> Option<&Value> {
        lookup(self, path)
    }
}

impl Scope for Value {
    fn resolve(&self, path: &str) -> Option<&Value> {
        lookup_in(self, path)
    }
}

/// Resolves a dotted path against a results map.
///
/// A key containing dots is matched whole before the path is split.
pub fn lookup<'a>(results: &'a Variables, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if let Some(value) = results.get(path) {
        return Some(value);
    }
    let (head, rest) = path.split_once('.')?;
    lookup_in(results.get(head)?, rest)
}

/// Resolves a dotted path inside a value. Numeric segments index arrays.
pub fn lookup_in<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Returns the textual form of a value as substituted into templates.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders every `{{name}}` placeholder in `template` against `results`.
pub fn render(template: &str, results: &Variables) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match lookup(results, name) {
                Some(value) => to_text(value),
                None => {
                    warn!(placeholder = %name, "Undefined template variable rendered as empty string");
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Renders every string leaf of `value`; other leaves are kept as is.
pub fn render_value(value: &Value, results: &Variables) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, results)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, results)).collect()),
        Value::Object(map) => Value::Object(
            map.iter().map(|(k, v)| (k.clone(), render_value(v, results))).collect(),
        ),
        other => other.clone(),
    }
}

/// Lists the placeholder names used in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER.captures_iter(template).map(|caps| caps[1].to_string()).collect()
}
