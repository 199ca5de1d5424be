//! Hacker News comments by author, via the Algolia search API.

use std::time::Duration;

use crate::config::AppConfig;
use crate::fetch::{EndpointSpec, Pagination};
use crate::providers::{PresetError, endpoint_url};

/// Timestamp field on every hit
pub const CREATED_AT: &str = "/created_at";

/// The search API is public; keep a small gap between pages anyway.
const PAGE_DELAY: Duration = Duration::from_millis(500);

/// `GET /api/v1/search?tags=comment,author_{user}`.
pub fn comments(config: &AppConfig, user: &str) -> Result<EndpointSpec, PresetError> {
    let url = endpoint_url("hackernews", &config.api_bases.hn, "api/v1/search")?;
    Ok(EndpointSpec::new(
        "hackernews",
        url,
        Pagination::page_number("page", 0, Some("/nbPages")),
    )
    .with_items_pointer("/hits")
    .with_id_pointer("/objectID")
    .with_max_pages(config.max_pages)
    .with_page_delay(PAGE_DELAY)
    .with_query("tags", format!("comment,author_{}", user)))
}
