//! Twitter (X) bookmarks of the authenticated user.
//!
//! The bookmarks endpoint only accepts a user-context OAuth 2.0 token; an
//! app-only bearer token is rejected with 403, which surfaces as fatal.

use crate::config::AppConfig;
use crate::fetch::{Auth, EndpointSpec, Pagination};
use crate::providers::{PresetError, endpoint_url};

pub const CREATED_AT: &str = "/created_at";

/// `GET /2/users/{user_id}/bookmarks`.
pub fn bookmarks(config: &AppConfig, user_id: &str) -> Result<EndpointSpec, PresetError> {
    let token = config.credentials.twitter_bearer_token()?;
    let url = endpoint_url(
        "twitter",
        &config.api_bases.twitter,
        &format!("2/users/{}/bookmarks", user_id),
    )?;
    Ok(EndpointSpec::new(
        "twitter",
        url,
        Pagination::body_cursor("/meta/next_token", "pagination_token"),
    )
    .with_auth(Auth::Bearer(token.to_string()))
    .with_items_pointer("/data")
    // The last page carries only `meta`
    .with_optional_items()
    .with_max_pages(config.max_pages)
    .with_query("max_results", "100")
    .with_query("tweet.fields", "created_at,author_id,public_metrics"))
}
