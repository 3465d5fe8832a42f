use crate::models::{find_auth, ApiDefinition, AuthMap};
use base64::Engine;

/// Ordered header or query pairs. Setting an existing name replaces it.
pub type Pairs = Vec<(String, String)>;

pub fn set_pair(pairs: &mut Pairs, name: &str, value: String, case_insensitive: bool) {
    let same = |existing: &str| {
        if case_insensitive {
            existing.eq_ignore_ascii_case(name)
        } else {
            existing == name
        }
    };
    pairs.retain(|(existing, _)| !same(existing));
    pairs.push((name.to_string(), value));
}

/// Injects the credentials named by the API's `auth` reference into the
/// outgoing headers or query. A missing reference or entry is a no-op.
pub fn apply_auth(api: &ApiDefinition, auth: &AuthMap, headers: &mut Pairs, params: &mut Pairs) {
    let Some(entry) = api.auth.as_deref().and_then(|name| find_auth(auth, name)) else {
        return;
    };
    match entry.kind.as_str() {
        "bearer" => {
            if let Some(token) = entry.first_str(&["token", "value"]) {
                set_pair(headers, "Authorization", format!("Bearer {}", token), true);
            }
        }
        "api_key" => {
            let name = entry.first_str(&["header", "key"]).unwrap_or("X-API-Key");
            let value = entry.first_str(&["value", "token"]).unwrap_or("").to_string();
            if entry.first_str(&["in"]) == Some("query") {
                set_pair(params, name, value, false);
            } else {
                set_pair(headers, name, value, true);
            }
        }
        "basic" => {
            let user = entry.first_str(&["username", "user"]).unwrap_or("");
            let password = entry.first_str(&["password", "pass"]).unwrap_or("");
            if !user.is_empty() || !password.is_empty() {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", user, password));
                set_pair(headers, "Authorization", format!("Basic {}", encoded), true);
            }
        }
        _ => {
            for (name, value) in entry.fields.iter() {
                if name == "type" || name == "in" {
                    continue;
                }
                if let Some(text) = value.as_str().filter(|s| !s.is_empty()) {
                    set_pair(headers, name, text.to_string(), true);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_auth_map;
    use serde_json::json;

    fn run(auth_ref: &str) -> (Pairs, Pairs) {
        let auth = parse_auth_map(&json!({
            "bearer": {"type": "Bearer", "value": "abc"},
            "empty_bearer": {"type": "bearer", "token": ""},
            "header_key": {"type": "api_key", "header": "X-Token", "value": "k1"},
            "default_key": {"type": "api_key", "token": "k2"},
            "query_key": {"type": "api_key", "key": "appid", "value": "k3", "in": "query"},
            "basic": {"type": "basic", "user": "alice", "pass": "pw"},
            "custom": {"type": "hmac", "X-Sig": "sig", "X-Num": 5, "in": "header", "X-Empty": ""}
        }));
        let api = crate::models::ApiDefinition::from_value(&json!({"id": "a", "auth_ref": auth_ref}))
            .unwrap();
        let mut headers = vec![("authorization".to_string(), "old".to_string())];
        let mut params = Vec::new();
        apply_auth(&api, &auth, &mut headers, &mut params);
        (headers, params)
    }

    fn header<'a>(pairs: &'a Pairs, name: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn bearer_replaces_existing_authorization() {
        let (headers, _) = run("bearer");
        assert_eq!(headers.len(), 1);
        assert_eq!(header(&headers, "Authorization"), Some("Bearer abc"));
        let (headers, _) = run("empty_bearer");
        assert_eq!(header(&headers, "Authorization"), Some("old"));
    }

    #[test]
    fn api_key_targets_header_or_query() {
        let (headers, _) = run("header_key");
        assert_eq!(header(&headers, "X-Token"), Some("k1"));
        let (headers, _) = run("default_key");
        assert_eq!(header(&headers, "X-API-Key"), Some("k2"));
        let (headers, params) = run("query_key");
        assert_eq!(params, vec![("appid".to_string(), "k3".to_string())]);
        assert!(header(&headers, "appid").is_none());
    }

    #[test]
    fn basic_encodes_credentials() {
        let (headers, _) = run("basic");
        assert_eq!(header(&headers, "Authorization"), Some("Basic YWxpY2U6cHc="));
    }

    #[test]
    fn unknown_type_copies_string_fields() {
        let (headers, _) = run("custom");
        assert_eq!(header(&headers, "X-Sig"), Some("sig"));
        assert!(header(&headers, "X-Num").is_none());
        assert!(header(&headers, "X-Empty").is_none());
        assert!(header(&headers, "in").is_none());
    }

    #[test]
    fn missing_entry_is_noop() {
        let (headers, params) = run("nope");
        assert_eq!(headers, vec![("authorization".to_string(), "old".to_string())]);
        assert!(params.is_empty());
    }
}
