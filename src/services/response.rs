use crate::constants::limits::{ERROR_MESSAGE_CHARS, TEXT_MESSAGE_CHARS};
use crate::models::{stringify_scalar, ApiDefinition, CallResult, MediaSource, ResponseType, ResultType};
use crate::services::executor::RawResponse;
use crate::utils::data_path::lookup_path;
use crate::utils::text::truncate_chars;
use serde_json::Value;

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn failure_message(raw: &RawResponse) -> String {
    let detail = raw
        .data
        .as_ref()
        .filter(|d| d.is_object())
        .and_then(|d| d.get("message"))
        .map(stringify_scalar)
        .unwrap_or_else(|| raw.text.clone());
    truncate_chars(
        &format!("Request failed (HTTP {}). {}", raw.status, detail),
        ERROR_MESSAGE_CHARS,
    )
}

fn text_content(api: &ApiDefinition, raw: &RawResponse) -> String {
    match (&api.response_path, &raw.data) {
        (Some(path), Some(data @ Value::Object(_))) => match lookup_path(data, path) {
            Some(value) => stringify_scalar(value),
            None => pretty(data),
        },
        (_, Some(data)) => pretty(data),
        (_, None) => raw.text.clone(),
    }
}

fn media_url(api: &ApiDefinition, raw: &RawResponse) -> Option<String> {
    let data = raw.data.as_ref().filter(|d| d.is_object())?;
    let found = match &api.response_path {
        Some(path) => lookup_path(data, path),
        None => data
            .get("url")
            .filter(|v| !v.is_null())
            .or_else(|| data.get("data").and_then(|inner| inner.get("url"))),
    };
    found
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn media_result(api: &ApiDefinition, raw: &RawResponse, result_type: ResultType) -> CallResult {
    match api.response_media_from {
        MediaSource::Body => match raw.media.as_ref().filter(|m| !m.bytes.is_empty()) {
            Some(media) => {
                CallResult::media_bytes(result_type, media.bytes.clone(), media.content_type.clone())
            }
            None => CallResult::failure(
                "The API returned no media content (response_media_from=body but the body was empty).",
            ),
        },
        MediaSource::Url => match media_url(api, raw) {
            Some(url) => CallResult::media_url(result_type, url),
            None => CallResult::failure(
                "The API returned no media URL, or response_path is not configured.",
            ),
        },
    }
}

/// Maps one HTTP outcome to the result handed back to the calling surface.
pub fn normalize_response(api: &ApiDefinition, raw: &RawResponse) -> CallResult {
    if raw.status >= 400 {
        return CallResult::failure(failure_message(raw));
    }
    match &api.response_type {
        ResponseType::Text => {
            CallResult::text(true, truncate_chars(&text_content(api, raw), TEXT_MESSAGE_CHARS))
        }
        ResponseType::Media(result_type) => media_result(api, raw, *result_type),
        ResponseType::Other(_) => {
            let content = match &raw.data {
                Some(data) => pretty(data),
                None => raw.text.clone(),
            };
            CallResult::text(true, truncate_chars(&content, TEXT_MESSAGE_CHARS))
        }
    }
}
