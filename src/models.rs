//! Typed records for the JSON files under a relay data directory.
//!
//! Every record is built leniently from a `serde_json::Value`: wrong-typed or
//! missing fields fall back to documented defaults once, at load time, so the
//! call pipeline never re-validates raw JSON.

use crate::constants::{network, retry as retry_constants};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

fn read_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn read_string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| items.iter().map(stringify_scalar).collect())
        .unwrap_or_default()
}

fn read_object(value: Option<&Value>) -> Map<String, Value> {
    value.and_then(|v| v.as_object()).cloned().unwrap_or_default()
}

fn read_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(num) => num.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn read_positive_number(value: Option<&Value>) -> Option<f64> {
    read_number(value).filter(|n| n.is_finite() && *n > 0.0)
}

/// Seconds that fit in a `Duration`. Values too large to represent are
/// treated as absent so the caller's default applies.
fn read_seconds(value: Option<&Value>) -> Option<f64> {
    read_number(value).filter(|n| *n >= 0.0 && Duration::try_from_secs_f64(*n).is_ok())
}

fn read_positive_seconds(value: Option<&Value>) -> Option<f64> {
    read_seconds(value).filter(|n| *n > 0.0)
}

/// Renders a JSON scalar the way it appears in a command line or a group
/// member list: strings verbatim, numbers and booleans in their JSON form.
pub fn stringify_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(num) => num.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Text,
    Image,
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseType {
    Text,
    Media(ResultType),
    Other(String),
}

impl ResponseType {
    fn parse(raw: Option<&Value>) -> Self {
        let normalized = raw
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "text".to_string());
        match normalized.as_str() {
            "text" => ResponseType::Text,
            "image" => ResponseType::Media(ResultType::Image),
            "video" => ResponseType::Media(ResultType::Video),
            "audio" => ResponseType::Media(ResultType::Audio),
            _ => ResponseType::Other(normalized),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    Url,
    Body,
}

impl MediaSource {
    fn parse(raw: Option<&Value>) -> Self {
        match raw.and_then(|v| v.as_str()).map(|s| s.trim().to_lowercase()) {
            Some(source) if source == "body" => MediaSource::Body,
            _ => MediaSource::Url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub max: u64,
    pub window: Duration,
}

impl RateLimit {
    /// Accepts `{"max": N, "window_seconds": S}`; anything else means "no limit".
    fn parse(raw: Option<&Value>) -> Option<Self> {
        let obj = raw?.as_object()?;
        let max = read_number(obj.get("max")).filter(|n| n.is_finite() && *n >= 0.0)?;
        let window =
            read_number(obj.get("window_seconds")).filter(|n| n.is_finite() && *n >= 0.0)?;
        // An unrepresentable window saturates: hits never expire.
        Some(Self {
            max: max as u64,
            window: Duration::try_from_secs_f64(window).unwrap_or(Duration::MAX),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_seconds: f64,
}

impl RetryPolicy {
    /// `None` unless `max_attempts` is a positive number.
    pub fn parse(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let max_attempts = read_positive_number(obj.get("max_attempts"))?;
        let backoff_seconds =
            read_seconds(obj.get("backoff_seconds")).unwrap_or(retry_constants::BACKOFF_SECONDS);
        Some(Self {
            max_attempts: max_attempts as u32,
            backoff_seconds,
        })
    }

    pub fn backoff(&self) -> Duration {
        Duration::try_from_secs_f64(self.backoff_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(retry_constants::BACKOFF_SECONDS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryOverride {
    Inherit,
    Disabled,
    Custom(RetryPolicy),
}

impl RetryOverride {
    fn parse(raw: Option<&Value>) -> Self {
        match raw {
            None | Some(Value::Null) => RetryOverride::Inherit,
            Some(Value::Bool(false)) => RetryOverride::Disabled,
            Some(Value::Number(num)) if num.as_f64() == Some(0.0) => RetryOverride::Disabled,
            Some(value @ Value::Object(_)) => match RetryPolicy::parse(value) {
                Some(policy) => RetryOverride::Custom(policy),
                None => RetryOverride::Disabled,
            },
            Some(_) => RetryOverride::Inherit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiDefinition {
    pub id: Option<String>,
    pub command: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub help_text: Option<String>,
    pub url: String,
    pub method: String,
    pub headers: Map<String, Value>,
    pub params: Map<String, Value>,
    pub body: Option<Value>,
    pub enabled: bool,
    pub response_type: ResponseType,
    pub response_path: Option<String>,
    pub response_media_from: MediaSource,
    pub require_admin: bool,
    pub allowed_user_groups: Vec<String>,
    pub allowed_group_groups: Vec<String>,
    pub rate_limit: Option<RateLimit>,
    pub rate_limit_global: Option<RateLimit>,
    pub timeout_seconds: Option<f64>,
    pub retry: RetryOverride,
    pub auth: Option<String>,
}

impl ApiDefinition {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            id: read_string(obj.get("id")),
            command: read_string(obj.get("command")),
            name: read_string(obj.get("name")),
            description: read_string(obj.get("description")),
            help_text: read_string(obj.get("help_text")).or_else(|| read_string(obj.get("help"))),
            url: read_string(obj.get("url")).unwrap_or_default(),
            method: read_string(obj.get("method"))
                .unwrap_or_else(|| "GET".to_string())
                .to_uppercase(),
            headers: read_object(obj.get("headers")),
            params: read_object(obj.get("params")),
            body: obj.get("body").filter(|v| !v.is_null()).cloned(),
            enabled: !matches!(obj.get("enabled"), Some(Value::Bool(false))),
            response_type: ResponseType::parse(obj.get("response_type")),
            response_path: read_string(obj.get("response_path")),
            response_media_from: MediaSource::parse(obj.get("response_media_from")),
            require_admin: matches!(obj.get("require_admin"), Some(Value::Bool(true))),
            allowed_user_groups: read_string_list(obj.get("allowed_user_groups")),
            allowed_group_groups: read_string_list(obj.get("allowed_group_groups")),
            rate_limit: RateLimit::parse(obj.get("rate_limit")),
            rate_limit_global: RateLimit::parse(obj.get("rate_limit_global")),
            timeout_seconds: read_positive_seconds(obj.get("timeout_seconds")),
            retry: RetryOverride::parse(obj.get("retry")),
            auth: read_string(obj.get("auth")).or_else(|| read_string(obj.get("auth_ref"))),
        })
    }

    pub fn matches_key(&self, key: &str) -> bool {
        self.command.as_deref() == Some(key) || self.id.as_deref() == Some(key)
    }

    /// Name shown to users: the command alias, else the id.
    pub fn display_command(&self) -> &str {
        self.command
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("?")
    }
}

/// One named credential record. Type-specific fields stay in `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEntry {
    pub kind: String,
    pub fields: Map<String, Value>,
}

impl AuthEntry {
    pub fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_object()?.clone();
        let kind = fields
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_lowercase();
        Some(Self { kind, fields })
    }

    /// First non-empty string among `names`.
    pub fn first_str(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| {
            self.fields
                .get(*name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
        })
    }

    /// Secret exposed to `{{config.<name>}}`: `value`, else `token`.
    pub fn secret(&self) -> Option<&Value> {
        self.fields.get("value").or_else(|| self.fields.get("token"))
    }
}

pub type AuthMap = Vec<(String, AuthEntry)>;

pub fn parse_auth_map(raw: &Value) -> AuthMap {
    raw.as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(name, entry)| {
                    AuthEntry::from_value(entry).map(|parsed| (name.clone(), parsed))
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn find_auth<'a>(auth: &'a AuthMap, name: &str) -> Option<&'a AuthEntry> {
    auth.iter()
        .find(|(entry_name, _)| entry_name == name)
        .map(|(_, entry)| entry)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupMembership {
    pub user_groups: HashMap<String, Vec<String>>,
    pub group_groups: HashMap<String, Vec<String>>,
}

impl GroupMembership {
    pub fn from_value(raw: &Value) -> Self {
        Self {
            user_groups: parse_member_map(raw.get("user_groups")),
            group_groups: parse_member_map(raw.get("group_groups")),
        }
    }
}

fn parse_member_map(raw: Option<&Value>) -> HashMap<String, Vec<String>> {
    raw.and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(name, members)| {
                    members.as_array().map(|items| {
                        (name.clone(), items.iter().map(stringify_scalar).collect())
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConfig {
    pub timeout_seconds: f64,
    pub retry: Option<RetryPolicy>,
    pub retry_statuses: BTreeSet<u16>,
    pub register_commands: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: network::DEFAULT_TIMEOUT_SECONDS,
            retry: None,
            retry_statuses: default_retry_statuses(),
            register_commands: false,
        }
    }
}

pub fn default_retry_statuses() -> BTreeSet<u16> {
    retry_constants::STATUS_CODES.iter().copied().collect()
}

impl GlobalConfig {
    pub fn from_value(raw: &Value) -> Self {
        let retry_statuses = raw
            .get("retry_statuses")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_f64())
                    .map(|n| n as u64)
                    .filter(|n| (retry_constants::MIN_STATUS..=retry_constants::MAX_STATUS).contains(n))
                    .map(|n| n as u16)
                    .collect::<BTreeSet<u16>>()
            })
            .filter(|set| !set.is_empty())
            .unwrap_or_else(default_retry_statuses);
        Self {
            timeout_seconds: read_positive_seconds(raw.get("timeout_seconds"))
                .unwrap_or(network::DEFAULT_TIMEOUT_SECONDS),
            retry: raw.get("retry").and_then(RetryPolicy::parse),
            retry_statuses,
            register_commands: raw
                .get("register_commands")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }
}

/// Effective HTTP client settings for one API after merging global defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub timeout_seconds: f64,
    pub retry: Option<RetryPolicy>,
    pub retry_statuses: BTreeSet<u16>,
}

impl ClientOptions {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(network::DEFAULT_TIMEOUT_SECONDS))
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.map(|r| r.max_attempts).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub api_key: String,
    pub cron: String,
    pub args: Vec<String>,
    pub named: Vec<(String, String)>,
    pub target_session: Option<String>,
}

impl ScheduleEntry {
    /// `None` when `api_key` or `cron` is missing.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            api_key: read_string(obj.get("api_key"))?,
            cron: read_string(obj.get("cron"))?,
            args: read_string_list(obj.get("args")),
            named: obj
                .get("named")
                .and_then(|v| v.as_object())
                .map(|named| {
                    named
                        .iter()
                        .map(|(k, v)| (k.clone(), stringify_scalar(v)))
                        .collect()
                })
                .unwrap_or_default(),
            target_session: read_string(obj.get("target_session")),
        })
    }
}

/// Identity of one invocation, built fresh by the calling surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub is_admin: bool,
}

impl CallContext {
    pub fn new(user_id: Option<String>, group_id: Option<String>, is_admin: bool) -> Self {
        Self {
            user_id,
            group_id,
            is_admin,
        }
    }

    pub fn scheduler() -> Self {
        Self {
            user_id: Some(crate::constants::scheduler::USER_ID.to_string()),
            group_id: None,
            is_admin: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallResult {
    pub success: bool,
    pub message: String,
    pub result_type: ResultType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip)]
    pub media_bytes: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_content_type: Option<String>,
}

impl CallResult {
    pub fn text(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
            result_type: ResultType::Text,
            media_url: None,
            media_bytes: None,
            media_content_type: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::text(false, message)
    }

    pub fn media_url(result_type: ResultType, url: impl Into<String>) -> Self {
        Self {
            success: true,
            message: String::new(),
            result_type,
            media_url: Some(url.into()),
            media_bytes: None,
            media_content_type: None,
        }
    }

    pub fn media_bytes(result_type: ResultType, bytes: Vec<u8>, content_type: String) -> Self {
        Self {
            success: true,
            message: String::new(),
            result_type,
            media_url: None,
            media_bytes: Some(bytes),
            media_content_type: Some(content_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_definition_defaults() {
        let api = ApiDefinition::from_value(&json!({"id": "weather", "url": "http://x"}))
            .expect("api");
        assert!(api.enabled);
        assert_eq!(api.method, "GET");
        assert_eq!(api.response_type, ResponseType::Text);
        assert_eq!(api.response_media_from, MediaSource::Url);
        assert_eq!(api.retry, RetryOverride::Inherit);
        assert!(api.rate_limit.is_none());
    }

    #[test]
    fn only_explicit_false_disables() {
        let off = ApiDefinition::from_value(&json!({"id": "a", "enabled": false})).unwrap();
        let on = ApiDefinition::from_value(&json!({"id": "a", "enabled": 0})).unwrap();
        assert!(!off.enabled);
        assert!(on.enabled);
    }

    #[test]
    fn retry_override_forms() {
        let parse = |v: Value| RetryOverride::parse(Some(&v));
        assert_eq!(parse(json!(false)), RetryOverride::Disabled);
        assert_eq!(parse(json!(0)), RetryOverride::Disabled);
        assert_eq!(parse(json!({"max_attempts": 0})), RetryOverride::Disabled);
        assert_eq!(
            parse(json!({"max_attempts": 2})),
            RetryOverride::Custom(RetryPolicy {
                max_attempts: 2,
                backoff_seconds: 1.0
            })
        );
        assert_eq!(parse(json!(true)), RetryOverride::Inherit);
    }

    #[test]
    fn global_config_filters_statuses() {
        let config = GlobalConfig::from_value(&json!({
            "timeout_seconds": -1,
            "retry_statuses": [504, 42, "x"],
            "retry": {"max_attempts": 3, "backoff_seconds": 0.5}
        }));
        assert_eq!(config.timeout_seconds, 30.0);
        assert_eq!(config.retry_statuses, BTreeSet::from([504]));
        assert_eq!(config.retry.unwrap().max_attempts, 3);

        let fallback = GlobalConfig::from_value(&json!({"retry_statuses": [1]}));
        assert_eq!(fallback.retry_statuses, default_retry_statuses());
    }

    #[test]
    fn oversized_durations_never_overflow() {
        let config = GlobalConfig::from_value(&json!({
            "timeout_seconds": 1e30,
            "retry": {"max_attempts": 1, "backoff_seconds": 1e25}
        }));
        assert_eq!(config.timeout_seconds, 30.0);
        assert_eq!(config.retry.unwrap().backoff(), Duration::from_secs(1));

        let api = ApiDefinition::from_value(&json!({
            "id": "a",
            "timeout_seconds": "1e300",
            "rate_limit": {"max": 1, "window_seconds": 1e20}
        }))
        .unwrap();
        assert_eq!(api.timeout_seconds, None);
        assert_eq!(api.rate_limit.unwrap().window, Duration::MAX);

        let options = ClientOptions {
            timeout_seconds: f64::MAX,
            retry: Some(RetryPolicy {
                max_attempts: 1,
                backoff_seconds: f64::INFINITY,
            }),
            retry_statuses: default_retry_statuses(),
        };
        assert_eq!(options.timeout(), Duration::from_secs(30));
        assert_eq!(options.retry.unwrap().backoff(), Duration::from_secs(1));
    }

    #[test]
    fn group_members_are_stringified() {
        let groups = GroupMembership::from_value(&json!({
            "user_groups": {"ops": [1001, "1002"], "broken": "nope"},
        }));
        assert_eq!(groups.user_groups["ops"], vec!["1001", "1002"]);
        assert!(!groups.user_groups.contains_key("broken"));
        assert!(groups.group_groups.is_empty());
    }

    #[test]
    fn schedule_entry_requires_key_and_cron() {
        assert!(ScheduleEntry::from_value(&json!({"api_key": "x"})).is_none());
        let entry = ScheduleEntry::from_value(&json!({
            "api_key": "weather",
            "cron": "0 8 * * *",
            "args": ["Paris", 3],
            "named": {"unit": "metric"},
            "target_session": "  "
        }))
        .unwrap();
        assert_eq!(entry.args, vec!["Paris", "3"]);
        assert_eq!(entry.named, vec![("unit".to_string(), "metric".to_string())]);
        assert_eq!(entry.target_session, None);
    }
}
