use crate::constants::files;
use crate::errors::RelayError;
use crate::models::{
    parse_auth_map, ApiDefinition, AuthMap, ClientOptions, GlobalConfig, GroupMembership,
    RetryOverride, ScheduleEntry,
};
use crate::services::logger::Logger;
use crate::utils::fs_atomic::atomic_write_text_file;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Apis,
    Auth,
    Groups,
    Config,
    Schedules,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Apis,
        Resource::Auth,
        Resource::Groups,
        Resource::Config,
        Resource::Schedules,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Resource::Apis => files::APIS,
            Resource::Auth => files::AUTH,
            Resource::Groups => files::GROUPS,
            Resource::Config => files::CONFIG,
            Resource::Schedules => files::SCHEDULES,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        Resource::ALL.into_iter().find(|resource| {
            let file = resource.file_name();
            normalized == file || Some(normalized.as_str()) == file.strip_suffix(".json")
        })
    }
}

type CacheKey = (PathBuf, Resource);
type CachedValue = Arc<dyn Any + Send + Sync>;

/// Cached values plus invalidation counters. A load only publishes its
/// parse when neither counter moved while it was reading the file.
#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CachedValue>,
    generations: HashMap<CacheKey, u64>,
    epoch: u64,
}

impl CacheState {
    fn stamp(&self, key: &CacheKey) -> (u64, u64) {
        (self.epoch, self.generations.get(key).copied().unwrap_or(0))
    }
}

/// Parsed, typed view of the data directory files, cached per
/// (resolved directory, resource) until explicitly invalidated.
pub struct ConfigStore {
    logger: Logger,
    cache: RwLock<CacheState>,
}

impl ConfigStore {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("config"),
            cache: RwLock::new(CacheState::default()),
        }
    }

    fn resolve_dir(dir: &Path) -> PathBuf {
        std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
    }

    /// Reads a JSON file, returning `None` when it is absent or unreadable.
    /// Malformed files are reported and treated like missing ones.
    fn read_json(&self, path: &Path) -> Option<Value> {
        if !path.is_file() {
            return None;
        }
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                self.logger.warn(
                    "Failed to read config file",
                    Some(&serde_json::json!({"path": path.display().to_string(), "error": err.to_string()})),
                );
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                self.logger.warn(
                    "Failed to parse config file",
                    Some(&serde_json::json!({"path": path.display().to_string(), "error": err.to_string()})),
                );
                None
            }
        }
    }

    fn cached<T, F>(&self, dir: &Path, resource: Resource, parse: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&ConfigStore, Option<Value>) -> T,
    {
        let key = (Self::resolve_dir(dir), resource);
        let stamp = {
            let guard = self.cache.read().unwrap_or_else(|err| err.into_inner());
            if let Some(hit) = guard
                .entries
                .get(&key)
                .and_then(|v| v.clone().downcast::<T>().ok())
            {
                return hit;
            }
            guard.stamp(&key)
        };
        // Parse outside the lock. An invalidate that lands meanwhile wins:
        // this result is returned to the caller but not cached.
        let raw = self.read_json(&key.0.join(resource.file_name()));
        let parsed = Arc::new(parse(self, raw));
        let mut guard = self.cache.write().unwrap_or_else(|err| err.into_inner());
        if guard.stamp(&key) == stamp {
            guard.entries.insert(key, parsed.clone());
        }
        parsed
    }

    /// Every API definition in file order, disabled ones included.
    pub fn apis(&self, dir: &Path) -> Arc<Vec<ApiDefinition>> {
        self.cached(dir, Resource::Apis, |store, raw| {
            let entries = raw
                .as_ref()
                .and_then(|v| v.get("apis"))
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            entries
                .iter()
                .enumerate()
                .filter_map(|(index, entry)| {
                    let parsed = ApiDefinition::from_value(entry);
                    if parsed.is_none() {
                        store.logger.warn(
                            "Skipping malformed API definition",
                            Some(&serde_json::json!({"index": index})),
                        );
                    }
                    parsed
                })
                .collect()
        })
    }

    pub fn auth(&self, dir: &Path) -> Arc<AuthMap> {
        self.cached(dir, Resource::Auth, |_, raw| {
            raw.as_ref().map(parse_auth_map).unwrap_or_default()
        })
    }

    pub fn groups(&self, dir: &Path) -> Arc<GroupMembership> {
        self.cached(dir, Resource::Groups, |_, raw| {
            raw.as_ref()
                .map(GroupMembership::from_value)
                .unwrap_or_default()
        })
    }

    pub fn global_config(&self, dir: &Path) -> Arc<GlobalConfig> {
        self.cached(dir, Resource::Config, |_, raw| {
            raw.as_ref().map(GlobalConfig::from_value).unwrap_or_default()
        })
    }

    pub fn schedules(&self, dir: &Path) -> Arc<Vec<ScheduleEntry>> {
        self.cached(dir, Resource::Schedules, |store, raw| {
            let entries = raw
                .as_ref()
                .and_then(|v| v.get("schedules"))
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            entries
                .iter()
                .enumerate()
                .filter_map(|(index, entry)| {
                    let parsed = ScheduleEntry::from_value(entry);
                    if parsed.is_none() {
                        store.logger.warn(
                            "Schedule item missing api_key or cron, skipped",
                            Some(&serde_json::json!({"index": index})),
                        );
                    }
                    parsed
                })
                .collect()
        })
    }

    pub fn invalidate(&self, dir: &Path, resource: Resource) {
        let key = (Self::resolve_dir(dir), resource);
        let mut guard = self.cache.write().unwrap_or_else(|err| err.into_inner());
        guard.entries.remove(&key);
        *guard.generations.entry(key).or_insert(0) += 1;
    }

    pub fn invalidate_all(&self) {
        let mut guard = self.cache.write().unwrap_or_else(|err| err.into_inner());
        guard.entries.clear();
        guard.epoch += 1;
    }

    /// Write path for operator tooling: atomically replaces the resource file
    /// and drops the cached copy. Failures are returned, not swallowed.
    pub fn save_resource(
        &self,
        dir: &Path,
        resource: Resource,
        value: &Value,
    ) -> Result<(), RelayError> {
        let payload = serde_json::to_string_pretty(value)?;
        let path = dir.join(resource.file_name());
        atomic_write_text_file(&path, &format!("{}\n", payload), 0o600).map_err(|err| {
            RelayError::internal(format!("Failed to save {}: {}", resource.file_name(), err))
                .with_details(serde_json::json!({"path": path.display().to_string()}))
        })?;
        self.invalidate(dir, resource);
        self.logger.info(
            "Config resource saved",
            Some(&serde_json::json!({"resource": resource.file_name()})),
        );
        Ok(())
    }
}

/// Enabled APIs only; `enabled` must be explicitly `false` to hide one.
pub fn enabled_apis(apis: &[ApiDefinition]) -> Vec<&ApiDefinition> {
    apis.iter().filter(|api| api.enabled).collect()
}

/// First enabled API whose `command` or `id` equals `key`, in file order.
pub fn find_api<'a>(apis: &'a [ApiDefinition], key: &str) -> Option<&'a ApiDefinition> {
    apis.iter().find(|api| api.enabled && api.matches_key(key))
}

pub fn merge_client_options(global: &GlobalConfig, api: &ApiDefinition) -> ClientOptions {
    let timeout_seconds = api
        .timeout_seconds
        .filter(|t| *t > 0.0)
        .unwrap_or(global.timeout_seconds);
    let retry = match api.retry {
        RetryOverride::Disabled => None,
        RetryOverride::Custom(policy) => Some(policy),
        RetryOverride::Inherit => global.retry,
    };
    ClientOptions {
        timeout_seconds,
        retry,
        retry_statuses: global.retry_statuses.clone(),
    }
}

/// Map behind `{{config.*}}`: caller-supplied config first, then secrets from
/// auth entries (`value`, else `token`) for names the caller did not set.
pub fn placeholder_config(auth: &AuthMap, extra: Option<&Map<String, Value>>) -> Map<String, Value> {
    let mut out = extra.cloned().unwrap_or_default();
    for (name, entry) in auth.iter() {
        if out.contains_key(name) {
            continue;
        }
        if let Some(secret) = entry.secret() {
            out.insert(name.clone(), secret.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetryPolicy;
    use serde_json::json;

    fn api(value: Value) -> ApiDefinition {
        ApiDefinition::from_value(&value).expect("api definition")
    }

    fn global_with_retry() -> GlobalConfig {
        GlobalConfig::from_value(&json!({
            "timeout_seconds": 12,
            "retry": {"max_attempts": 4, "backoff_seconds": 2}
        }))
    }

    #[test]
    fn retry_false_or_zero_disables_regardless_of_global() {
        let global = global_with_retry();
        for retry in [json!(false), json!(0), json!({"max_attempts": -1})] {
            let merged = merge_client_options(&global, &api(json!({"id": "a", "retry": retry})));
            assert_eq!(merged.retry, None);
        }
    }

    #[test]
    fn missing_retry_inherits_global_unchanged() {
        let global = global_with_retry();
        let merged = merge_client_options(&global, &api(json!({"id": "a"})));
        assert_eq!(merged.retry, global.retry);
        assert_eq!(merged.timeout_seconds, 12.0);

        let bare = merge_client_options(&GlobalConfig::default(), &api(json!({"id": "a"})));
        assert_eq!(bare.retry, None);
        assert_eq!(bare.timeout_seconds, 30.0);
    }

    #[test]
    fn per_api_overrides_win() {
        let global = global_with_retry();
        let merged = merge_client_options(
            &global,
            &api(json!({"id": "a", "timeout_seconds": 3.5, "retry": {"max_attempts": 1, "backoff_seconds": 0}})),
        );
        assert_eq!(merged.timeout_seconds, 3.5);
        assert_eq!(
            merged.retry,
            Some(RetryPolicy {
                max_attempts: 1,
                backoff_seconds: 0.0
            })
        );
        let ignored = merge_client_options(&global, &api(json!({"id": "a", "timeout_seconds": 0})));
        assert_eq!(ignored.timeout_seconds, 12.0);
    }

    #[test]
    fn find_api_prefers_first_enabled_match() {
        let apis = vec![
            api(json!({"id": "one", "command": "dup", "enabled": false})),
            api(json!({"id": "two", "command": "dup"})),
            api(json!({"id": "three", "command": "dup"})),
        ];
        assert_eq!(find_api(&apis, "dup").and_then(|a| a.id.clone()), Some("two".into()));
        assert_eq!(find_api(&apis, "three").and_then(|a| a.id.clone()), Some("three".into()));
        assert!(find_api(&apis, "one").is_none());
        assert_eq!(enabled_apis(&apis).len(), 2);
    }

    #[test]
    fn extra_config_takes_precedence_over_auth_secrets() {
        let auth = parse_auth_map(&json!({
            "weather_key": {"type": "api_key", "value": "from-auth"},
            "bot": {"type": "bearer", "token": "tkn"},
            "basic": {"type": "basic", "username": "u", "password": "p"}
        }));
        let extra = json!({"weather_key": "from-extra", "lang": "en"});
        let config = placeholder_config(&auth, extra.as_object());
        assert_eq!(config["weather_key"], "from-extra");
        assert_eq!(config["bot"], "tkn");
        assert_eq!(config["lang"], "en");
        assert!(!config.contains_key("basic"));
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("apirelay-cache-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn invalidate_during_load_discards_the_stale_parse() {
        let dir = temp_dir();
        let store = ConfigStore::new(Logger::new("test"));
        let loads = std::sync::atomic::AtomicUsize::new(0);
        let load = |store: &ConfigStore, _raw: Option<Value>, invalidate: bool| {
            loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if invalidate {
                store.invalidate(&dir, Resource::Apis);
            }
            "parsed"
        };

        let first = store.cached(&dir, Resource::Apis, |s, raw| load(s, raw, true));
        assert_eq!(*first, "parsed");
        store.cached(&dir, Resource::Apis, |s, raw| load(s, raw, false));
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 2);

        store.cached(&dir, Resource::Apis, |s, raw| load(s, raw, false));
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn invalidate_all_during_load_discards_the_stale_parse() {
        let dir = temp_dir();
        let store = ConfigStore::new(Logger::new("test"));
        let first = store.cached(&dir, Resource::Groups, |s, _| {
            s.invalidate_all();
            1u32
        });
        assert_eq!(*first, 1);
        let second = store.cached(&dir, Resource::Groups, |_, _| 2u32);
        assert_eq!(*second, 2);
    }

    #[test]
    fn resource_names_parse() {
        assert_eq!(Resource::parse("apis"), Some(Resource::Apis));
        assert_eq!(Resource::parse("Groups.json"), Some(Resource::Groups));
        assert_eq!(Resource::parse("other"), None);
    }
}
