use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayErrorKind {
    InvalidParams,
    Denied,
    RateLimited,
    NotFound,
    Timeout,
    Internal,
}

impl RelayErrorKind {
    /// Tag used in call logs to tell failure classes apart.
    pub fn as_tag(self) -> &'static str {
        match self {
            RelayErrorKind::InvalidParams => "invalid_params",
            RelayErrorKind::Denied => "denied",
            RelayErrorKind::RateLimited => "rate_limited",
            RelayErrorKind::NotFound => "not_found",
            RelayErrorKind::Timeout => "timeout",
            RelayErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayError {
    pub kind: RelayErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

impl RelayError {
    pub fn new(kind: RelayErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
            retryable: matches!(kind, RelayErrorKind::Timeout),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RelayErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(RelayErrorKind::Denied, "DENIED", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(RelayErrorKind::RateLimited, "RATE_LIMITED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RelayErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RelayErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RelayErrorKind::Internal, "INTERNAL", message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == RelayErrorKind::Timeout
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for RelayError {}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::internal(format!("JSON error: {}", err))
    }
}
