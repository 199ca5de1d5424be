//! # Error Handling
//!
//! Tagged fetch errors shared by the paginated fetcher and record processors,
//! plus the status-code classification that decides whether a provider
//! failure is waited out, retried, or fatal.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::fetch::rate_limit::RateLimitInfo;

/// Maximum number of characters of an upstream body kept in error details.
const BODY_SNIPPET_CHARS: usize = 200;

/// Error raised while talking to a remote provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchError {
    #[serde(flatten)]
    pub kind: FetchErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Quota exhausted; wait until the reset time (or retry-after hint) and resend
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reset_at: Option<DateTime<Utc>>,
    },
    /// Overload, server error or network hiccup; retry a bounded number of times
    Transient,
    /// Bad credentials or a request the provider will never accept
    Fatal,
    /// Response body could not be interpreted
    Malformed,
}

impl FetchError {
    pub fn rate_limited(retry_after_secs: Option<u64>, reset_at: Option<DateTime<Utc>>) -> Self {
        Self {
            kind: FetchErrorKind::RateLimited {
                retry_after_secs,
                reset_at,
            },
            message: None,
            details: None,
        }
    }

    pub fn rate_limited_with_message<S: Into<String>>(
        retry_after_secs: Option<u64>,
        reset_at: Option<DateTime<Utc>>,
        message: S,
    ) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::rate_limited(retry_after_secs, reset_at)
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self {
            kind: FetchErrorKind::Fatal,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self {
            kind: FetchErrorKind::Malformed,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind, FetchErrorKind::RateLimited { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Transient)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Fatal)
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Malformed)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FetchErrorKind::RateLimited {
                retry_after_secs,
                reset_at,
            } => {
                write!(f, "Rate limited")?;
                if let Some(after) = retry_after_secs {
                    write!(f, " (retry after: {}s)", after)?;
                }
                if let Some(reset) = reset_at {
                    write!(f, " (reset at: {})", reset.to_rfc3339())?;
                }
            }
            FetchErrorKind::Transient => write!(f, "Transient error")?,
            FetchErrorKind::Fatal => write!(f, "Fatal error")?,
            FetchErrorKind::Malformed => write!(f, "Malformed response")?,
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            FetchError::fatal(format!("Invalid request: {}", error))
        } else if error.is_decode() {
            FetchError::malformed(format!("Failed to decode response: {}", error))
        } else if error.is_timeout() {
            FetchError::transient(format!("Request timed out: {}", error))
        } else {
            FetchError::transient(format!("Network error: {}", error))
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        FetchError::malformed(format!("Invalid JSON: {}", error))
    }
}

/// Upstream provider error information attached as error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    /// Provider identifier (e.g., "github", "readwise")
    pub provider: String,
    /// HTTP status code from upstream
    pub status: u16,
    /// Response body snippet from upstream (truncated)
    pub body_snippet: Option<String>,
}

/// Truncate a response body on a character boundary for logging.
pub fn body_snippet(body: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if body.chars().count() > BODY_SNIPPET_CHARS {
        let truncated: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
        Some(format!("{}...", truncated))
    } else {
        Some(body.to_string())
    }
}

/// Classify a non-success provider response by status code and rate-limit headers.
pub fn classify_response(
    provider: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> FetchError {
    let details = json!(ProviderError {
        provider: provider.to_string(),
        status: status.as_u16(),
        body_snippet: body_snippet(body),
    });
    let rate = RateLimitInfo::from_headers(headers);

    let error = match status.as_u16() {
        429 => FetchError::rate_limited_with_message(
            rate.retry_after_secs,
            rate.reset,
            format!("{} returned 429 Too Many Requests", provider),
        ),
        // GitHub signals primary rate limits as 403 with zero remaining quota
        403 if rate.is_exhausted() => FetchError::rate_limited_with_message(
            rate.retry_after_secs,
            rate.reset,
            format!("{} quota exhausted", provider),
        ),
        // Secondary limits leave quota, so the quota reset does not apply
        403 if rate.retry_after_secs.is_some() => FetchError::rate_limited_with_message(
            rate.retry_after_secs,
            None,
            format!("{} secondary rate limit hit", provider),
        ),
        401 => FetchError::fatal(format!(
            "{} rejected the credentials (401 Unauthorized)",
            provider
        )),
        403 => FetchError::fatal(format!("{} denied access (403 Forbidden)", provider)),
        408 | 425 => FetchError::transient(format!("{} returned status {}", provider, status)),
        500..=599 => FetchError::transient(format!("{} server error: {}", provider, status)),
        400..=499 => FetchError::fatal(format!("{} rejected the request: {}", provider, status)),
        _ => FetchError::fatal(format!(
            "{} returned unexpected status {}",
            provider, status
        )),
    };

    error.with_details(details)
}
