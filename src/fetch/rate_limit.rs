//! Rate-limit bookkeeping driven by provider response headers.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;

use crate::config::RateLimitConfig;

/// Quota information advertised by a provider on its most recent response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitInfo {
    pub remaining: Option<u64>,
    pub reset: Option<DateTime<Utc>>,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitInfo {
    /// Read GitHub style (`X-RateLimit-*`), Twitter style (`x-rate-limit-*`) and
    /// `Retry-After` headers. Header names are case-insensitive.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let remaining = header_u64(headers, "x-ratelimit-remaining")
            .or_else(|| header_u64(headers, "x-rate-limit-remaining"));
        let reset = header_u64(headers, "x-ratelimit-reset")
            .or_else(|| header_u64(headers, "x-rate-limit-reset"))
            .and_then(|epoch| Utc.timestamp_opt(epoch as i64, 0).single());
        let retry_after_secs = header_u64(headers, "retry-after");

        Self {
            remaining,
            reset,
            retry_after_secs,
        }
    }

    /// Whether the provider reported zero remaining quota.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_none() && self.reset.is_none() && self.retry_after_secs.is_none()
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// How long to wait out an exhausted quota.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitPolicy {
    /// Added on top of the reset time
    pub buffer: Duration,
    /// Upper bound for any single wait
    pub max_wait: Duration,
    /// Maximum rate-limit waits spent on one request before giving up
    pub max_waits: u32,
    /// Wait used when the provider gives neither a reset time nor a retry hint
    pub fallback_wait: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            buffer: Duration::from_secs(1),
            max_wait: Duration::from_secs(3600),
            max_waits: 10,
            fallback_wait: Duration::from_secs(10),
        }
    }
}

impl RateLimitPolicy {
    pub fn from_config(config: &RateLimitConfig, fallback_wait: Duration) -> Self {
        Self {
            buffer: Duration::from_secs(config.buffer_seconds),
            max_wait: Duration::from_secs(config.max_wait_seconds),
            max_waits: config.max_waits,
            fallback_wait,
        }
    }

    /// Compute the wait for a rate-limited request.
    ///
    /// A known reset time wins; `Retry-After` is used when no reset is known;
    /// otherwise the fallback applies. The result never exceeds `max_wait`.
    pub fn wait_for(
        &self,
        reset: Option<DateTime<Utc>>,
        retry_after_secs: Option<u64>,
        now: DateTime<Utc>,
    ) -> Duration {
        let wait = match (reset, retry_after_secs) {
            (Some(reset), _) => {
                let until_reset = (reset - now).num_seconds().max(0) as u64;
                Duration::from_secs(until_reset) + self.buffer
            }
            (None, Some(after)) => Duration::from_secs(after),
            (None, None) => self.fallback_wait,
        };
        wait.min(self.max_wait)
    }
}

/// Remembers the quota reported by the latest response so the next request
/// can be held back before it is sent.
#[derive(Debug, Default)]
pub struct RateLimitGate {
    last_seen: Option<RateLimitInfo>,
}

impl RateLimitGate {
    pub fn observe(&mut self, headers: &HeaderMap) {
        let info = RateLimitInfo::from_headers(headers);
        if !info.is_empty() {
            self.last_seen = Some(info);
        }
    }

    pub fn last_seen(&self) -> Option<&RateLimitInfo> {
        self.last_seen.as_ref()
    }

    /// The pause required before the next request, if the quota is exhausted.
    pub fn pending_wait(&self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> Option<Duration> {
        let info = self.last_seen.as_ref().filter(|info| info.is_exhausted())?;
        Some(policy.wait_for(info.reset, info.retry_after_secs, now))
    }

    /// Forget the observed quota once it has been waited out.
    pub fn clear(&mut self) {
        self.last_seen = None;
    }
}
