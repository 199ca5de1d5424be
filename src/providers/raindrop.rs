//! Raindrop.io bookmarks of one collection.

use crate::config::AppConfig;
use crate::fetch::{Auth, EndpointSpec, Pagination};
use crate::providers::{PresetError, endpoint_url};

/// Page size accepted by the raindrops endpoint
const PER_PAGE: u32 = 50;

/// `GET /rest/v1/raindrops/{collection_id}`. Use `0` for all bookmarks and
/// `-1` for unsorted ones.
pub fn collection(config: &AppConfig, collection_id: i64) -> Result<EndpointSpec, PresetError> {
    let token = config.credentials.raindrop_token()?;
    let url = endpoint_url(
        "raindrop",
        &config.api_bases.raindrop,
        &format!("rest/v1/raindrops/{}", collection_id),
    )?;
    Ok(
        EndpointSpec::new("raindrop", url, Pagination::page_number("page", 0, None))
            .with_auth(Auth::Bearer(token.to_string()))
            .with_items_pointer("/items")
            .with_id_pointer("/_id")
            .with_max_pages(config.max_pages)
            .with_query("perpage", PER_PAGE.to_string()),
    )
}
