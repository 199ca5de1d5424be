//! Bounded retries and rate-limit waits around a single remote call.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{FetchError, FetchErrorKind};
use crate::fetch::rate_limit::{RateLimitGate, RateLimitPolicy};
use crate::fetch::sleep::{Pause, Sleeper, TokioSleeper};

/// Linear retry schedule for transient failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): `base_delay * attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.max(1)
    }
}

/// Wraps remote calls with the retry policy and the rate-limit gate.
///
/// Shared by the paginated fetcher and the record processor loop so both
/// honour the same quota observations.
#[derive(Clone)]
pub struct Throttle {
    retry: RetryPolicy,
    rate_limit: RateLimitPolicy,
    gate: Arc<Mutex<RateLimitGate>>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("retry", &self.retry)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl Throttle {
    pub fn new(retry: RetryPolicy, rate_limit: RateLimitPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            retry,
            rate_limit,
            gate: Arc::new(Mutex::new(RateLimitGate::default())),
            sleeper,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::from_config_with_sleeper(config, Arc::new(TokioSleeper))
    }

    pub fn from_config_with_sleeper(config: &AppConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        let retry = RetryPolicy {
            max_retries: config.retry.max_retries,
            base_delay: Duration::from_secs(config.retry.base_delay_seconds),
        };
        let rate_limit = RateLimitPolicy::from_config(&config.rate_limit, retry.base_delay);
        Self::new(retry, rate_limit, sleeper)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Suspend through the configured sleeper.
    pub async fn sleep(&self, duration: Duration, reason: Pause) {
        self.sleeper.sleep(duration, reason).await;
    }

    /// Record the quota headers of a response.
    pub fn observe(&self, headers: &HeaderMap) {
        if let Ok(mut gate) = self.gate.lock() {
            gate.observe(headers);
        }
    }

    /// Hold back until the last observed quota resets, if it is exhausted.
    pub async fn pause_if_exhausted(&self, label: &str) {
        let wait = match self.gate.lock() {
            Ok(gate) => gate.pending_wait(&self.rate_limit, Utc::now()),
            Err(_) => None,
        };
        let Some(wait) = wait else {
            return;
        };

        counter!("harvest_rate_limited_total", "endpoint" => label.to_string()).increment(1);
        warn!(
            "{}: rate limit exhausted, pausing {}s before next request",
            label,
            wait.as_secs()
        );
        self.sleeper.sleep(wait, Pause::RateLimit).await;
        self.clear_gate();
    }

    fn clear_gate(&self) {
        if let Ok(mut gate) = self.gate.lock() {
            gate.clear();
        }
    }

    /// Run `op` until it succeeds, waiting out rate limits and retrying
    /// transient failures. Fatal and malformed errors are returned at once.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0u32;
        let mut waits = 0u32;

        loop {
            self.pause_if_exhausted(label).await;

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match &error.kind {
                FetchErrorKind::RateLimited {
                    retry_after_secs,
                    reset_at,
                } => {
                    waits += 1;
                    if waits > self.rate_limit.max_waits {
                        warn!(
                            "{}: still rate limited after {} waits, giving up",
                            label, self.rate_limit.max_waits
                        );
                        return Err(error);
                    }
                    let wait = self
                        .rate_limit
                        .wait_for(*reset_at, *retry_after_secs, Utc::now());
                    counter!("harvest_rate_limited_total", "endpoint" => label.to_string())
                        .increment(1);
                    warn!(
                        "{}: {} (wait {}/{}), sleeping {}s",
                        label,
                        error,
                        waits,
                        self.rate_limit.max_waits,
                        wait.as_secs()
                    );
                    self.sleeper.sleep(wait, Pause::RateLimit).await;
                    self.clear_gate();
                }
                FetchErrorKind::Transient => {
                    attempt += 1;
                    if attempt > self.retry.max_retries {
                        warn!(
                            "{}: giving up after {} retries: {}",
                            label, self.retry.max_retries, error
                        );
                        return Err(error);
                    }
                    let delay = self.retry.delay_for(attempt);
                    counter!("harvest_retries_total", "endpoint" => label.to_string())
                        .increment(1);
                    warn!(
                        "{}: {} (retry {}/{} in {}s)",
                        label,
                        error,
                        attempt,
                        self.retry.max_retries,
                        delay.as_secs()
                    );
                    self.sleeper.sleep(delay, Pause::Retry).await;
                }
                FetchErrorKind::Fatal | FetchErrorKind::Malformed => {
                    debug!("{}: not retrying: {}", label, error);
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::sleep::RecordingSleeper;
    use reqwest::header::HeaderValue;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn throttle(sleeper: Arc<RecordingSleeper>) -> Throttle {
        Throttle::new(
            RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_secs(10),
            },
            RateLimitPolicy::default(),
            sleeper,
        )
    }

    #[test]
    fn test_delay_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(5), Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_linearly() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let throttle = throttle(sleeper.clone());
        let calls = AtomicU32::new(0);

        let result = throttle
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::transient("overloaded"))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(10), Duration::from_secs(20)]
        );
        assert_eq!(sleeper.reasons(), vec![Pause::Retry, Pause::Retry]);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let throttle = throttle(sleeper.clone());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = throttle
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::transient("still down"))
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        // one initial attempt plus three retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(sleeper.recorded().len(), 3);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let throttle = throttle(sleeper.clone());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = throttle
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::fatal("bad token"))
            })
            .await;

        assert!(result.unwrap_err().is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_waits_retry_after_then_resends() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let throttle = throttle(sleeper.clone());
        let calls = AtomicU32::new(0);

        let result = throttle
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(FetchError::rate_limited(Some(60), None))
                } else {
                    Ok("page")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "page");
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(60)]);
        assert_eq!(sleeper.reasons(), vec![Pause::RateLimit]);
    }

    #[tokio::test]
    async fn test_rate_limit_waits_are_bounded() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let throttle = Throttle::new(
            RetryPolicy::default(),
            RateLimitPolicy {
                max_waits: 2,
                ..RateLimitPolicy::default()
            },
            sleeper.clone(),
        );

        let result: Result<(), _> = throttle
            .run("test", || async { Err(FetchError::rate_limited(Some(1), None)) })
            .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(sleeper.recorded().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_quota_pauses_before_next_call() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let throttle = throttle(sleeper.clone());

        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        let reset = (Utc::now() + chrono::Duration::seconds(90)).timestamp();
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&reset.to_string()).unwrap(),
        );
        throttle.observe(&headers);

        throttle.run("test", || async { Ok(()) }).await.unwrap();
        let slept = sleeper.recorded();
        assert_eq!(slept.len(), 1);
        assert!(slept[0] >= Duration::from_secs(85) && slept[0] <= Duration::from_secs(91));

        // The quota was waited out, so the following call goes straight through
        throttle.run("test", || async { Ok(()) }).await.unwrap();
        assert_eq!(sleeper.recorded().len(), 1);
    }
}
