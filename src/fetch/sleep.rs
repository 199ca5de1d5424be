//! Suspension points for rate-limit waits and retry delays.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

/// Interval between "still waiting" log lines during long pauses.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Why a pause was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    RateLimit,
    Retry,
    PageDelay,
}

impl std::fmt::Display for Pause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pause::RateLimit => write!(f, "rate limit reset"),
            Pause::Retry => write!(f, "retry delay"),
            Pause::PageDelay => write!(f, "page delay"),
        }
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration, reason: Pause);
}

/// Sleeps on the Tokio timer, reporting remaining time on long waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration, reason: Pause) {
        let mut remaining = duration;
        while remaining > PROGRESS_INTERVAL {
            info!(remaining_secs = remaining.as_secs(), "Waiting out {}", reason);
            tokio::time::sleep(PROGRESS_INTERVAL).await;
            remaining -= PROGRESS_INTERVAL;
        }
        tokio::time::sleep(remaining).await;
    }
}

/// Records requested pauses without waiting. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<(Duration, Pause)>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.pauses().into_iter().map(|(duration, _)| duration).collect()
    }

    pub fn reasons(&self) -> Vec<Pause> {
        self.pauses().into_iter().map(|(_, reason)| reason).collect()
    }

    fn pauses(&self) -> Vec<(Duration, Pause)> {
        self.slept
            .lock()
            .map(|slept| slept.clone())
            .unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.recorded().into_iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration, reason: Pause) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push((duration, reason));
        }
    }
}
