//! Placeholder expansion between settings.
//!
//! Any string (or string nested inside an array/object) may reference another
//! setting as `{KEY}`. `{{` and `}}` stand for literal braces; any other brace
//! text is left alone. Keys are resolved by repeated sweeps: a key is expanded
//! once every key it references is already resolved. A sweep that resolves
//! nothing means the remaining keys depend on each other.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::error::SettingsError;

/// A flat key/value settings mapping, in file order.
pub type SettingsMap = Map<String, Value>;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Expand every placeholder in `template`.
///
/// `base_keys` are taken as literal values and never expanded. The returned
/// mapping keeps the key order of `template`.
pub fn resolve(template: &SettingsMap, base_keys: &[&str]) -> Result<SettingsMap, SettingsError> {
    for (key, value) in template {
        let mut references = BTreeSet::new();
        collect_references(value, &mut references);
        if let Some(missing) = references.into_iter().find(|r| !template.contains_key(r)) {
            return Err(SettingsError::UnknownReference {
                key: key.clone(),
                reference: missing,
            });
        }
    }

    let mut resolved = SettingsMap::new();
    for (key, value) in template {
        if base_keys.contains(&key.as_str()) {
            resolved.insert(key.clone(), value.clone());
        }
    }

    let mut remaining: Vec<&String> = template
        .keys()
        .filter(|k| !resolved.contains_key(k.as_str()))
        .collect();

    while !remaining.is_empty() {
        let before = remaining.len();
        let mut unresolved = Vec::with_capacity(before);

        for key in remaining {
            match expand(&template[key.as_str()], &resolved) {
                Some(value) => {
                    resolved.insert(key.clone(), value);
                }
                None => unresolved.push(key),
            }
        }

        if unresolved.len() == before {
            return Err(SettingsError::Cyclic {
                keys: unresolved.into_iter().cloned().collect(),
            });
        }
        remaining = unresolved;
    }

    Ok(template
        .keys()
        .filter_map(|k| resolved.get(k).map(|v| (k.clone(), v.clone())))
        .collect())
}

/// Expand one value against the already-resolved keys, or `None` if it still
/// references something unresolved.
fn expand(value: &Value, resolved: &SettingsMap) -> Option<Value> {
    match value {
        Value::String(s) => expand_str(s, resolved).map(Value::String),
        Value::Array(items) => items
            .iter()
            .map(|item| expand(item, resolved))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| expand(v, resolved).map(|v| (k.clone(), v)))
            .collect::<Option<Map<_, _>>>()
            .map(Value::Object),
        other => Some(other.clone()),
    }
}

fn expand_str(s: &str, resolved: &SettingsMap) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(s) {
        let whole = caps.get(0)?;
        out.push_str(&s[last..whole.start()]);
        out.push_str(&replacement(&caps, resolved)?);
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Some(out)
}

fn replacement(caps: &Captures<'_>, resolved: &SettingsMap) -> Option<String> {
    match caps.get(1) {
        Some(name) => resolved.get(name.as_str()).map(value_text),
        None if &caps[0] == "{{" => Some("{".to_string()),
        None => Some("}".to_string()),
    }
}

/// Text substituted for a referenced value. Strings go in verbatim, anything
/// else as its JSON text.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn collect_references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for caps in PLACEHOLDER.captures_iter(s) {
                if let Some(name) = caps.get(1) {
                    out.insert(name.as_str().to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Value::Object(fields) => fields.values().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}
