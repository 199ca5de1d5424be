//! Endpoint presets for the providers harvest knows about.
//!
//! Each preset turns [`AppConfig`] (API base and credentials) plus its own
//! arguments into an [`EndpointSpec`] ready for the paginated fetcher.

pub mod github;
pub mod hackernews;
pub mod paypal;
pub mod raindrop;
pub mod readwise;
pub mod twitter;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use url::Url;

use crate::config::ConfigError;
use crate::error::FetchError;

#[derive(Debug, Error)]
pub enum PresetError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid {provider} endpoint URL '{url}': {source}")]
    Url {
        provider: &'static str,
        url: String,
        source: url::ParseError,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Join an API base and a path, tolerating slashes on either side.
pub(crate) fn endpoint_url(
    provider: &'static str,
    base: &str,
    path: &str,
) -> Result<Url, PresetError> {
    let url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&url).map_err(|source| PresetError::Url {
        provider,
        url,
        source,
    })
}

/// ISO 8601 timestamp with a `Z` suffix, as the providers expect in filters.
pub(crate) fn iso_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
