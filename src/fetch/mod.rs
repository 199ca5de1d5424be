//! # Resumable Paginated Fetcher
//!
//! Walks a paginated REST endpoint to its last page while respecting the
//! provider's rate limits and retrying transient failures.
//!
//! - [`EndpointSpec`] describes one query (URL, auth, pagination style).
//! - [`PaginatedFetcher::fetch_all`] runs the request loop.
//! - [`Throttle`] combines the [`RetryPolicy`] with the rate-limit gate and is
//!   shared with the record processor.

pub mod client;
pub mod cursor;
pub mod endpoint;
pub mod page;
pub mod rate_limit;
pub mod retry;
pub mod sleep;

use std::time::Duration;

use reqwest::Client;

use crate::config::AppConfig;
use crate::error::FetchError;

pub use client::{FetchOutcome, PaginatedFetcher};
pub use cursor::Cursor;
pub use endpoint::{Auth, EndpointSpec, Flatten, Pagination};
pub use page::{Page, Record, parse_page};
pub use rate_limit::{RateLimitGate, RateLimitInfo, RateLimitPolicy};
pub use retry::{RetryPolicy, Throttle};
pub use sleep::{Pause, RecordingSleeper, Sleeper, TokioSleeper};

/// Build the shared HTTP client with the configured timeout and user agent.
pub fn build_http_client(config: &AppConfig) -> Result<Client, FetchError> {
    let mut builder = Client::builder().user_agent(config.user_agent.clone());
    if config.http_timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.http_timeout_secs));
    }
    builder
        .build()
        .map_err(|e| FetchError::fatal(format!("failed to build HTTP client: {}", e)))
}
