use crate::models::stringify_scalar;
use crate::utils::data_path::lookup_path;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::HashMap;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{(?:args\.(\d+)|named\.([^}|]+)(?:\|([^}]*))?|config\.([^}]+))\}\}")
        .expect("placeholder regex")
});

/// Values available to `{{...}}` placeholders for one call.
#[derive(Debug, Clone, Copy)]
pub struct TemplateScope<'a> {
    pub args: &'a [String],
    pub named: &'a HashMap<String, String>,
    pub config: &'a Map<String, Value>,
}

impl<'a> TemplateScope<'a> {
    pub fn new(
        args: &'a [String],
        named: &'a HashMap<String, String>,
        config: &'a Map<String, Value>,
    ) -> Self {
        Self {
            args,
            named,
            config,
        }
    }

    fn resolve_match(&self, caps: &Captures<'_>) -> String {
        if let Some(index) = caps.get(1) {
            return index
                .as_str()
                .parse::<usize>()
                .ok()
                .and_then(|i| self.args.get(i))
                .cloned()
                .unwrap_or_default();
        }
        if let Some(key) = caps.get(2) {
            let key = key.as_str().trim();
            if let Some(value) = self.named.get(key) {
                return value.clone();
            }
            return caps
                .get(3)
                .map(|default| default.as_str().trim().to_string())
                .unwrap_or_default();
        }
        if let Some(path) = caps.get(4) {
            let path = path.as_str().trim();
            let (head, rest) = path.split_once('.').unwrap_or((path, ""));
            return self
                .config
                .get(head.trim())
                .and_then(|value| {
                    if rest.trim().is_empty() {
                        Some(value)
                    } else {
                        lookup_path(value, rest)
                    }
                })
                .map(stringify_scalar)
                .unwrap_or_default();
        }
        caps.get(0)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }
}

pub fn resolve_template_string(template: &str, scope: &TemplateScope<'_>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| scope.resolve_match(caps))
        .into_owned()
}

/// Resolves placeholders in every string inside `value`, keeping the shape
/// and key order of objects and arrays. Non-string scalars pass through.
pub fn resolve_placeholders(value: &Value, scope: &TemplateScope<'_>) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_placeholders(item, scope))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, entry) in map.iter() {
                out.insert(key.clone(), resolve_placeholders(entry, scope));
            }
            Value::Object(out)
        }
        Value::String(text) => Value::String(resolve_template_string(text, scope)),
        _ => value.clone(),
    }
}
