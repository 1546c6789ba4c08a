//! LLM error types with retry and failover classification.
//!
//! Transient errors are retried against the same route; quota and
//! incompatibility errors move on to the next route of a `FallbackClient`.

use std::time::Duration;

/// Error from LLM API calls.
#[derive(Debug, thiserror::Error)]
#[error("{kind}{}: {message}", .status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
    /// Delay from a Retry-After header, if any
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn of(kind: LlmErrorKind, status_code: Option<u16>, message: String) -> Self {
        Self {
            kind,
            status_code,
            message,
            retry_after: None,
        }
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(status_code: u16, body: String, retry_after: Option<Duration>) -> Self {
        let mut err = Self::of(classify_http_status(status_code), Some(status_code), body);
        if err.kind == LlmErrorKind::RateLimited {
            err.retry_after = retry_after;
        }
        err
    }

    pub fn network_error(message: String) -> Self {
        Self::of(LlmErrorKind::NetworkError, None, message)
    }

    pub fn parse_error(message: String) -> Self {
        Self::of(LlmErrorKind::ParseError, None, message)
    }

    pub fn empty_response(model: &str) -> Self {
        Self::of(
            LlmErrorKind::ParseError,
            None,
            format!("Model {} returned no content", model),
        )
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Credits or quota are gone; retrying the same route is pointless.
    pub fn is_quota_exhausted(&self) -> bool {
        if self.status_code == Some(402) {
            return true;
        }
        let message = self.message.to_lowercase();
        ["quota", "insufficient", "credits", "billing", "exceeded"]
            .iter()
            .any(|kw| message.contains(kw))
    }

    /// Delay before the next attempt: Retry-After if given, else capped exponential backoff.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(retry_after) = self.retry_after {
            return retry_after;
        }

        let base_ms: u64 = match self.kind {
            LlmErrorKind::RateLimited => 2_000,
            LlmErrorKind::ServerError => 1_000,
            _ => 500,
        };
        let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(30_000))
    }
}

/// Classification of LLM errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// 429
    RateLimited,
    /// 5xx
    ServerError,
    /// 4xx other than 429
    ClientError,
    /// Connection failed or timed out
    NetworkError,
    /// Response body could not be used
    ParseError,
}

impl LlmErrorKind {
    /// Check if this error kind should be retried with the same route.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::NetworkError
        )
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            LlmErrorKind::RateLimited => "Rate limited",
            LlmErrorKind::ServerError => "Server error",
            LlmErrorKind::ClientError => "Client error",
            LlmErrorKind::NetworkError => "Network error",
            LlmErrorKind::ParseError => "Parse error",
        };
        f.write_str(text)
    }
}

/// Configuration for retry behavior of a single route.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Upper bound on time spent retrying one request
    pub max_retry_duration: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_retry_duration: Duration::from_secs(15),
        }
    }
}

impl RetryConfig {
    /// Check if the given error should be retried on attempt `attempt` (0-based).
    pub fn should_retry(&self, error: &LlmError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_transient() && !error.is_quota_exhausted()
    }
}

/// Map an HTTP status code to an error kind.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}
