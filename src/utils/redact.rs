use once_cell::sync::Lazy;
use regex::Regex;

const REDACTION: &str = "[REDACTED]";

static QUERY_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([?&][^=&#\s]+)=[^&#\s)]*").expect("query redaction regex")
});

static BEARER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(Bearer|Basic)\s+[A-Za-z0-9._~+/=-]+").expect("auth redaction regex")
});

/// Masks query-string values and inline credentials in text bound for a log
/// line. Query keys stay readable.
pub fn redact_text(input: &str) -> String {
    let masked = QUERY_VALUE_RE.replace_all(input, format!("$1={}", REDACTION).as_str());
    BEARER_RE
        .replace_all(&masked, format!("$1 {}", REDACTION).as_str())
        .into_owned()
}
