use crate::models::{stringify_scalar, ApiDefinition};
use crate::services::config_store::{enabled_apis, find_api};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static ARGS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{args\.(\d+)\}\}").expect("args placeholder regex"));
static NAMED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{named\.([^}|]+)(?:\|([^}]*))?\}\}").expect("named placeholder regex")
});

#[derive(Debug, Default, PartialEq, Eq)]
struct ParamSummary {
    positional: Vec<String>,
    named_required: Vec<String>,
    named_optional: Vec<String>,
}

impl ParamSummary {
    fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named_required.is_empty() && self.named_optional.is_empty()
    }
}

/// Infers the parameters an API expects from the placeholders in its `params`.
fn infer_params(api: &ApiDefinition) -> ParamSummary {
    let mut positional: BTreeMap<usize, String> = BTreeMap::new();
    let mut summary = ParamSummary::default();
    for (key, value) in api.params.iter() {
        let text = stringify_scalar(value);
        if let Some(caps) = ARGS_RE.captures(&text) {
            if let Ok(index) = caps[1].parse::<usize>() {
                positional.insert(index, key.clone());
            }
        } else if let Some(caps) = NAMED_RE.captures(&text) {
            let name = caps[1].trim().to_string();
            if summary.named_required.contains(&name) || summary.named_optional.contains(&name) {
                continue;
            }
            if caps.get(2).is_some() {
                summary.named_optional.push(name);
            } else {
                summary.named_required.push(name);
            }
        }
    }
    summary.positional = positional.into_values().collect();
    summary
}

fn build_example(command: &str, params: &ParamSummary) -> String {
    let mut base = format!("/api {}", command);
    for name in &params.positional {
        base.push_str(&format!(" <{}>", name));
    }
    let named: Vec<String> = params
        .named_required
        .iter()
        .chain(params.named_optional.iter())
        .map(|name| format!("{}=<value>", name))
        .collect();
    if named.is_empty() {
        return base;
    }
    format!("{} or {} {}", base, base, named.join(" "))
}

fn build_list(apis: &[ApiDefinition]) -> String {
    let mut lines = vec![
        "Usage: /api <name> [args...]".to_string(),
        String::new(),
    ];
    for api in enabled_apis(apis) {
        let command = api.display_command();
        let name = api.name.as_deref().unwrap_or(command);
        match api.description.as_deref() {
            Some(desc) => lines.push(format!("· {} - {}: {}", command, name, desc)),
            None => lines.push(format!("· {} - {}", command, name)),
        }
    }
    lines.join("\n")
}

fn build_detail(api: &ApiDefinition) -> String {
    let command = api.display_command();
    let name = api
        .name
        .as_deref()
        .or(api.id.as_deref())
        .unwrap_or("?");
    let mut lines = vec![format!("[{}]", name), format!("Command: {}", command), String::new()];
    if let Some(help) = api.help_text.as_deref() {
        lines.push(help.to_string());
        lines.push(String::new());
    }

    let params = infer_params(api);
    if params.is_empty() {
        lines.push("Parameters: none".to_string());
    } else {
        let mut parts = Vec::new();
        if !params.positional.is_empty() {
            parts.push(params.positional.join(", "));
        }
        let named: Vec<String> = params
            .named_required
            .iter()
            .cloned()
            .chain(params.named_optional.iter().map(|n| format!("{} (optional)", n)))
            .collect();
        if !named.is_empty() {
            parts.push(named.join(", "));
        }
        lines.push(format!("Parameters: {}", parts.join("; ")));
    }
    lines.push(String::new());
    lines.push(format!("Example: {}", build_example(command, &params)));
    lines.join("\n")
}

/// `help` lists every enabled API; `help <name>` describes one.
pub fn build_help_message(apis: &[ApiDefinition], target: Option<&str>) -> String {
    match target.map(str::trim).filter(|t| !t.is_empty()) {
        None => build_list(apis),
        Some(target) => match find_api(apis, target) {
            Some(api) => build_detail(api),
            None => format!("API not found: {}.", target),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apis() -> Vec<ApiDefinition> {
        [
            json!({
                "id": "weather",
                "command": "wx",
                "name": "Weather",
                "description": "Current weather",
                "help_text": "Looks up the forecast.",
                "params": {
                    "city": "{{args.0}}",
                    "days": "{{args.1}}",
                    "unit": "{{named.unit|metric}}",
                    "lang": "{{named.lang}}",
                    "key": "{{config.weather_key}}"
                }
            }),
            json!({"id": "cat", "params": {}}),
            json!({"id": "hidden", "enabled": false}),
        ]
        .iter()
        .filter_map(ApiDefinition::from_value)
        .collect()
    }

    #[test]
    fn list_shows_enabled_apis_only() {
        let message = build_help_message(&apis(), None);
        assert!(message.contains("· wx - Weather: Current weather"));
        assert!(message.contains("· cat - cat"));
        assert!(!message.contains("hidden"));
    }

    #[test]
    fn detail_infers_parameters() {
        let message = build_help_message(&apis(), Some("weather"));
        assert!(message.starts_with("[Weather]\nCommand: wx"));
        assert!(message.contains("Looks up the forecast."));
        assert!(message.contains("Parameters: city, days; lang, unit (optional)"));
        assert!(message.contains(
            "Example: /api wx <city> <days> or /api wx <city> <days> lang=<value> unit=<value>"
        ));
    }

    #[test]
    fn detail_without_params() {
        let message = build_help_message(&apis(), Some("cat"));
        assert!(message.contains("Parameters: none"));
        assert!(message.ends_with("Example: /api cat"));
    }

    #[test]
    fn unknown_target() {
        assert_eq!(build_help_message(&apis(), Some("nope")), "API not found: nope.");
    }
}
