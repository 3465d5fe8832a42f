use crate::constants::commands;
use crate::errors::{RelayError, RelayErrorKind};
use crate::models::{ApiDefinition, AuthMap, CallContext, CallResult, ScheduleEntry};
use crate::services::auth::{apply_auth, Pairs};
use crate::services::config_store::{
    find_api, merge_client_options, placeholder_config, ConfigStore,
};
use crate::services::executor::{value_to_pairs, HttpMethod, PreparedRequest, RequestExecutor};
use crate::services::help::build_help_message;
use crate::services::logger::Logger;
use crate::services::permission::check_permission;
use crate::services::rate_limiter::RateLimiter;
use crate::services::response::normalize_response;
use crate::services::schedule::{schedule_command, ScheduleDelivery};
use crate::utils::args::parse_args;
use crate::utils::redact::redact_text;
use crate::utils::template::{resolve_placeholders, resolve_template_string, TemplateScope};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Outcome fields recorded on the per-call log line.
#[derive(Debug, Default)]
struct CallOutcome {
    status_code: Option<u16>,
    error: Option<RelayErrorKind>,
}

/// Entry point of the call pipeline. Holds the process-wide shared state
/// (config cache, rate-limit windows, HTTP client); everything else is
/// per-invocation.
#[derive(Clone)]
pub struct RelayManager {
    logger: Logger,
    config_store: Arc<ConfigStore>,
    rate_limiter: Arc<RateLimiter>,
    executor: Arc<RequestExecutor>,
}

impl RelayManager {
    pub fn new(logger: Logger) -> Self {
        let config_store = Arc::new(ConfigStore::new(logger.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(logger.clone()));
        let executor = Arc::new(RequestExecutor::new(logger.clone()));
        Self::with_parts(logger, config_store, rate_limiter, executor)
    }

    pub fn with_parts(
        logger: Logger,
        config_store: Arc<ConfigStore>,
        rate_limiter: Arc<RateLimiter>,
        executor: Arc<RequestExecutor>,
    ) -> Self {
        Self {
            logger: logger.child("relay"),
            config_store,
            rate_limiter,
            executor,
        }
    }

    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config_store
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    fn log_call(&self, api_key: &str, ctx: &CallContext, success: bool, outcome: &CallOutcome) {
        let mut meta = serde_json::json!({
            "api_key": api_key,
            "user_id": ctx.user_id.as_deref().unwrap_or(""),
            "group_id": ctx.group_id.as_deref().unwrap_or(""),
            "success": success,
        });
        if let Some(status) = outcome.status_code {
            meta["status_code"] = Value::from(status);
        }
        if let Some(kind) = outcome.error {
            meta["error"] = Value::from(kind.as_tag());
        }
        self.logger.info("ApiRelay call", Some(&meta));
    }

    fn reject(&self, api_key: &str, ctx: &CallContext, err: RelayError) -> CallResult {
        self.log_call(
            api_key,
            ctx,
            false,
            &CallOutcome {
                status_code: None,
                error: Some(err.kind),
            },
        );
        CallResult::failure(err.message)
    }

    /// Runs one command end to end. Never fails: every problem becomes an
    /// unsuccessful `CallResult` with a user-facing message.
    pub async fn run(
        &self,
        data_dir: &Path,
        raw_args: &str,
        ctx: &CallContext,
        extra_config: Option<&Map<String, Value>>,
    ) -> CallResult {
        let apis = self.config_store.apis(data_dir);
        let parsed = parse_args(raw_args);
        let Some((api_key, rest_args)) = parsed.positional.split_first() else {
            return self.reject(
                "",
                ctx,
                RelayError::invalid_params("Please provide an API name as the first argument."),
            );
        };

        if api_key == commands::HELP {
            let message = build_help_message(&apis, rest_args.first().map(String::as_str));
            self.log_call(api_key, ctx, true, &CallOutcome::default());
            return CallResult::text(true, message);
        }

        let Some(api) = find_api(&apis, api_key) else {
            return self.reject(
                api_key,
                ctx,
                RelayError::not_found(format!(
                    "API not found: {}. Use `help` to list available APIs.",
                    api_key
                )),
            );
        };

        let groups = self.config_store.groups(data_dir);
        if let Err(err) = check_permission(api, ctx, &groups) {
            return self.reject(api_key, ctx, err);
        }
        if let Err(err) = self.rate_limiter.check_and_record_global(api, api_key) {
            return self.reject(api_key, ctx, err);
        }
        if let Err(err) = self
            .rate_limiter
            .check_and_record(api, ctx.user_id.as_deref(), api_key)
        {
            return self.reject(api_key, ctx, err);
        }

        if api.url.is_empty() {
            return self.reject(
                api_key,
                ctx,
                RelayError::invalid_params("This API has no URL configured."),
            );
        }

        let auth = self.config_store.auth(data_dir);
        let config = placeholder_config(&auth, extra_config);
        let scope = TemplateScope::new(rest_args, &parsed.named, &config);
        let request = match build_request(api, &auth, &scope) {
            Ok(request) => request,
            Err(err) => return self.fail_unexpected(api_key, ctx, err),
        };

        let global = self.config_store.global_config(data_dir);
        let options = merge_client_options(&global, api);
        match self.executor.execute_with_retry(&request, &options).await {
            Ok(exchange) => {
                let result = normalize_response(api, &exchange.response);
                self.logger.debug(
                    "HTTP exchange finished",
                    Some(&serde_json::json!({
                        "api_key": api_key,
                        "attempts": exchange.attempts,
                        "retries": exchange.retries,
                        "duration_ms": exchange.duration_ms as u64,
                    })),
                );
                self.log_call(
                    api_key,
                    ctx,
                    result.success,
                    &CallOutcome {
                        status_code: Some(exchange.response.status),
                        error: None,
                    },
                );
                result
            }
            Err(err) if err.is_timeout() => {
                self.log_call(
                    api_key,
                    ctx,
                    false,
                    &CallOutcome {
                        status_code: None,
                        error: Some(RelayErrorKind::Timeout),
                    },
                );
                CallResult::failure("The request timed out.")
            }
            Err(err) => self.fail_unexpected(api_key, ctx, err),
        }
    }

    fn fail_unexpected(&self, api_key: &str, ctx: &CallContext, err: RelayError) -> CallResult {
        self.logger.error(
            "ApiRelay request error",
            Some(&serde_json::json!({
                "api_key": api_key,
                "code": err.code,
                "error": redact_text(&err.message),
            })),
        );
        self.log_call(
            api_key,
            ctx,
            false,
            &CallOutcome {
                status_code: None,
                error: Some(RelayErrorKind::Internal),
            },
        );
        CallResult::failure("The request failed, please try again later.")
    }

    /// Fires one schedule entry with the scheduler identity and hands the
    /// result to `delivery` when the entry names a target session.
    pub async fn run_scheduled(
        &self,
        data_dir: &Path,
        entry: &ScheduleEntry,
        delivery: Option<&dyn ScheduleDelivery>,
    ) -> CallResult {
        let raw = schedule_command(entry);
        let result = self.run(data_dir, &raw, &CallContext::scheduler(), None).await;
        if !result.success {
            self.logger.warn(
                "Scheduled call failed",
                Some(&serde_json::json!({"api_key": entry.api_key, "message": result.message})),
            );
        }
        if let (Some(target), Some(delivery)) = (entry.target_session.as_deref(), delivery) {
            if let Err(err) = delivery.deliver(target, &result).await {
                self.logger.error(
                    "Scheduled delivery failed",
                    Some(&serde_json::json!({"target_session": target, "error": err})),
                );
            }
        }
        result
    }
}

fn resolve_pairs(template: &Map<String, Value>, scope: &TemplateScope<'_>) -> Pairs {
    match resolve_placeholders(&Value::Object(template.clone()), scope) {
        Value::Object(resolved) => value_to_pairs(&resolved),
        _ => Vec::new(),
    }
}

/// Expands the API's templates with the call's arguments and applies auth.
fn build_request(
    api: &ApiDefinition,
    auth: &AuthMap,
    scope: &TemplateScope<'_>,
) -> Result<PreparedRequest, RelayError> {
    let method = HttpMethod::parse(&api.method)?;
    let mut headers = resolve_pairs(&api.headers, scope);
    let mut params = resolve_pairs(&api.params, scope);
    let url = resolve_template_string(&api.url, scope);
    let body = api.body.as_ref().map(|body| resolve_placeholders(body, scope));
    apply_auth(api, auth, &mut headers, &mut params);
    Ok(PreparedRequest {
        method,
        url,
        headers,
        params,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_auth_map;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn build_request_resolves_every_template() {
        let api = ApiDefinition::from_value(&json!({
            "id": "search",
            "url": "https://api.example.com/{{args.0}}/search",
            "method": "post",
            "headers": {"X-Lang": "{{named.lang|en}}"},
            "params": {"q": "{{args.1}}", "limit": 5},
            "body": {"query": "{{args.1}}", "tags": ["{{named.tag}}"]},
            "auth": "svc"
        }))
        .unwrap();
        let auth = parse_auth_map(&json!({"svc": {"type": "bearer", "token": "t0k"}}));
        let args = vec!["v2".to_string(), "rust".to_string()];
        let mut named = HashMap::new();
        named.insert("tag".to_string(), "lang".to_string());
        let config = Map::new();
        let scope = TemplateScope::new(&args, &named, &config);

        let request = build_request(&api, &auth, &scope).unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://api.example.com/v2/search");
        assert_eq!(
            request.headers,
            vec![
                ("X-Lang".to_string(), "en".to_string()),
                ("Authorization".to_string(), "Bearer t0k".to_string()),
            ]
        );
        assert_eq!(
            request.params,
            vec![
                ("q".to_string(), "rust".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
        assert_eq!(request.body, Some(json!({"query": "rust", "tags": ["lang"]})));
    }

    #[test]
    fn build_request_rejects_unknown_method() {
        let api = ApiDefinition::from_value(&json!({"id": "a", "url": "http://x", "method": "TRACE"}))
            .unwrap();
        let args: Vec<String> = Vec::new();
        let named = HashMap::new();
        let config = Map::new();
        let err = build_request(&api, &Vec::new(), &TemplateScope::new(&args, &named, &config))
            .unwrap_err();
        assert_eq!(err.kind, RelayErrorKind::Internal);
    }
}
