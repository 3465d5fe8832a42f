use crate::constants::{media, network, protocols::ALLOWED_HTTP};
use crate::errors::RelayError;
use crate::models::ClientOptions;
use crate::services::auth::Pairs;
use crate::services::logger::Logger;
use crate::utils::redact::redact_text;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        match raw.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(RelayError::internal(format!("Unsupported HTTP method: {}", other))
                .with_hint("method must be one of GET, POST, PUT, PATCH, DELETE")),
        }
    }

    fn as_reqwest(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    fn sends_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

/// A fully resolved outbound call: placeholders expanded, auth applied.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Pairs,
    pub params: Pairs,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaBody {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub data: Option<Value>,
    pub text: String,
    pub media: Option<MediaBody>,
}

/// Final response plus how many attempts it took.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub response: RawResponse,
    pub attempts: u32,
    pub retries: u32,
    pub duration_ms: u128,
}

/// Flattens a JSON object of query parameters into pairs. Arrays repeat the
/// key, nulls are dropped.
pub fn value_to_pairs(value: &serde_json::Map<String, Value>) -> Pairs {
    let mut pairs = Vec::new();
    for (key, entry) in value {
        match entry {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|v| !v.is_null()) {
                    pairs.push((key.clone(), crate::models::stringify_scalar(item)));
                }
            }
            other => pairs.push((key.clone(), crate::models::stringify_scalar(other))),
        }
    }
    pairs
}

fn media_content_type(raw: &str) -> Option<String> {
    let base = raw.split(';').next().unwrap_or("").trim();
    let lowered = base.to_lowercase();
    media::CONTENT_TYPE_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
        .then(|| base.to_string())
}

fn parse_url(raw: &str) -> Result<Url, RelayError> {
    let parsed = Url::parse(raw.trim())
        .map_err(|err| RelayError::invalid_params(format!("Invalid URL: {}", err)))?;
    let scheme = format!("{}:", parsed.scheme());
    if !ALLOWED_HTTP.contains(&scheme.as_str()) {
        return Err(RelayError::invalid_params(
            "Only http/https URLs are supported",
        ));
    }
    Ok(parsed)
}

fn headers_to_headermap(headers: &Pairs) -> Result<HeaderMap, RelayError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.trim().as_bytes()).map_err(|_| {
            RelayError::invalid_params(format!("Invalid header name: {}", key))
        })?;
        let val = HeaderValue::from_str(value).map_err(|_| {
            RelayError::invalid_params(format!("Invalid value for header {}", key))
        })?;
        map.insert(name, val);
    }
    Ok(map)
}

/// The request URL is dropped from the message; it may carry credentials
/// applied as query parameters.
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> RelayError {
    if err.is_timeout() {
        return RelayError::timeout("HTTP request timed out");
    }
    RelayError::internal(redact_text(&err.without_url().to_string()))
}

pub struct RequestExecutor {
    logger: Logger,
    client: Mutex<Option<Client>>,
}

impl RequestExecutor {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("http"),
            client: Mutex::new(None),
        }
    }

    fn get_client(&self) -> Result<Client, RelayError> {
        let mut guard = self
            .client
            .lock()
            .map_err(|_| RelayError::internal("Failed to access HTTP client cache"))?;
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(network::MAX_REDIRECTS))
            .user_agent(network::USER_AGENT)
            .build()
            .map_err(|err| RelayError::internal(format!("Failed to build HTTP client: {}", err)))?;
        *guard = Some(client.clone());
        Ok(client)
    }

    /// One HTTP call. Timeouts come back as `RelayErrorKind::Timeout`; any
    /// other failure is logged here and returned.
    pub async fn execute(
        &self,
        request: &PreparedRequest,
        timeout: Duration,
    ) -> Result<RawResponse, RelayError> {
        match self.execute_inner(request, timeout).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_timeout() => Err(err),
            Err(err) => {
                self.logger.error(
                    "HTTP request error",
                    Some(&serde_json::json!({
                        "method": request.method.as_reqwest().as_str(),
                        "url": redact_text(&request.url),
                        "error": redact_text(&err.message),
                    })),
                );
                Err(err)
            }
        }
    }

    async fn execute_inner(
        &self,
        request: &PreparedRequest,
        timeout: Duration,
    ) -> Result<RawResponse, RelayError> {
        let url = parse_url(&request.url)?;
        let client = self.get_client()?;
        let mut req = client
            .request(request.method.as_reqwest(), url)
            .headers(headers_to_headermap(&request.headers)?)
            .timeout(timeout);
        if !request.params.is_empty() {
            req = req.query(&request.params);
        }
        if request.method.sends_body() {
            match &request.body {
                Some(body @ (Value::Object(_) | Value::Array(_))) => {
                    req = req.json(body);
                }
                Some(Value::String(text)) => {
                    req = req.body(text.clone());
                }
                _ => {}
            }
        }

        let response = req.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        let data = serde_json::from_slice::<Value>(&bytes).ok();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let media = if status == 200 {
            media_content_type(&content_type).map(|content_type| MediaBody {
                bytes: bytes.to_vec(),
                content_type,
            })
        } else {
            None
        };
        Ok(RawResponse {
            status,
            data,
            text,
            media,
        })
    }

    /// Runs up to `1 + max_attempts` attempts. A retryable status or a
    /// timeout before the last attempt sleeps a fixed backoff and tries
    /// again; any other error stops immediately.
    pub async fn execute_with_retry(
        &self,
        request: &PreparedRequest,
        options: &ClientOptions,
    ) -> Result<Exchange, RelayError> {
        let max_attempts = options.max_attempts();
        let backoff = options.retry.map(|r| r.backoff()).unwrap_or_default();
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match self.execute(request, options.timeout()).await {
                Ok(response) => {
                    let retryable = options.retry_statuses.contains(&response.status);
                    if !retryable || attempt >= max_attempts {
                        return Ok(Exchange {
                            response,
                            attempts: attempt + 1,
                            retries: attempt,
                            duration_ms: started.elapsed().as_millis(),
                        });
                    }
                    self.logger.warn(
                        "HTTP retry",
                        Some(&serde_json::json!({"attempt": attempt + 1, "status": response.status})),
                    );
                }
                Err(err) if err.is_timeout() && attempt < max_attempts => {
                    self.logger.warn(
                        "HTTP retry",
                        Some(&serde_json::json!({"attempt": attempt + 1, "error": "timeout"})),
                    );
                }
                Err(err) => return Err(err),
            }
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_five_methods_are_supported() {
        assert_eq!(HttpMethod::parse("get").unwrap(), HttpMethod::Get);
        assert_eq!(HttpMethod::parse("PATCH").unwrap(), HttpMethod::Patch);
        assert!(HttpMethod::parse("HEAD").is_err());
        assert!(HttpMethod::parse("OPTIONS").is_err());
    }

    #[test]
    fn media_content_type_detection() {
        assert_eq!(media_content_type("image/png; charset=binary"), Some("image/png".into()));
        assert_eq!(media_content_type(" Audio/MPEG "), Some("Audio/MPEG".into()));
        assert_eq!(media_content_type("application/json"), None);
        assert_eq!(media_content_type(""), None);
    }

    #[test]
    fn query_pairs_flatten_values() {
        let params = json!({"q": "x", "n": 3, "skip": null, "tag": ["a", "b"], "on": true});
        let pairs = value_to_pairs(params.as_object().unwrap());
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), "x".to_string()),
                ("n".to_string(), "3".to_string()),
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
                ("on".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(parse_url("ftp://example.com/file").is_err());
        assert!(parse_url("not a url").is_err());
        assert!(parse_url("https://example.com/a?b=c").is_ok());
    }
}
