//! Backend errors and rate-limit hints.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Longest provider-requested wait honored before retrying.
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(300);

/// A provider refused a request because of rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub message: String,
    /// Provider-requested wait before the next attempt, when one was given.
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    /// A numeric `Retry-After` header takes precedence over a hint in the
    /// message body such as Groq's "Please try again in 6.5s".
    pub fn parse(message: &str, retry_after_header: Option<&str>) -> Self {
        let from_header = retry_after_header
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        Self {
            message: message.to_string(),
            retry_after: from_header
                .or_else(|| wait_hint(message))
                .map(|wait| wait.min(MAX_RETRY_WAIT)),
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.retry_after {
            Some(wait) => write!(f, "{} (retry after {:.2}s)", self.message, wait.as_secs_f64()),
            None => f.write_str(&self.message),
        }
    }
}

fn wait_hint(message: &str) -> Option<Duration> {
    let lower = message.to_ascii_lowercase();
    ["try again in ", "retry in "].iter().find_map(|marker| {
        let rest = &lower[lower.find(marker)? + marker.len()..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let secs = rest[..end].parse::<f64>().ok()?;
        Duration::try_from_secs_f64(secs.min(MAX_RETRY_WAIT.as_secs_f64())).ok()
    })
}

/// Failure talking to a reasoning backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider rejected the request for a non-transient reason.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Connection, timeout or 5xx failure. Retried.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend cannot be used as configured (no model, bad URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider's reply could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Too many requests. Retried, honoring the provider's wait hint.
    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(RateLimitInfo::new(message))
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(info) => info.retry_after,
            _ => None,
        }
    }

    /// Whether [`with_retry`](crate::with_retry) should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "request timed out"
        } else if err.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };
        LlmError::Network(format!("{}: {}", kind, err))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}
