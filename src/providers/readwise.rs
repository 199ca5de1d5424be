//! Readwise Reader documents and Readwise highlights.

use crate::config::AppConfig;
use crate::fetch::{Auth, EndpointSpec, Flatten, Pagination};
use crate::providers::{PresetError, endpoint_url, iso_timestamp};
use crate::window::DateWindow;

/// Field holding the time a highlight was made, used for client-side filtering
pub const HIGHLIGHTED_AT: &str = "/highlighted_at";

fn auth(config: &AppConfig) -> Result<Auth, PresetError> {
    Ok(Auth::Token(config.credentials.readwise_token()?.to_string()))
}

fn reader_cursor() -> Pagination {
    Pagination::body_cursor("/nextPageCursor", "pageCursor")
}

/// Reader documents: `GET /api/v3/list/`.
pub fn documents(
    config: &AppConfig,
    category: Option<&str>,
    location: Option<&str>,
    window: Option<&DateWindow>,
) -> Result<EndpointSpec, PresetError> {
    let url = endpoint_url("readwise", &config.api_bases.readwise, "api/v3/list/")?;
    let mut spec = EndpointSpec::new("readwise", url, reader_cursor())
        .with_auth(auth(config)?)
        .with_max_pages(config.max_pages);
    if let Some(category) = category {
        spec = spec.with_query("category", category);
    }
    if let Some(location) = location {
        spec = spec.with_query("location", location);
    }
    if let Some(window) = window {
        spec = spec.with_query("updatedAfter", iso_timestamp(window.since()));
    }
    Ok(spec)
}

/// Highlights via the export endpoint, which nests them inside their books.
///
/// Each highlight is lifted out and tagged with `book_title`, `book_author`,
/// `book_category` and `book_source`. The server filters on update time
/// only; narrow further with [`HIGHLIGHTED_AT`].
pub fn export(config: &AppConfig, window: Option<&DateWindow>) -> Result<EndpointSpec, PresetError> {
    let url = endpoint_url("readwise", &config.api_bases.readwise, "api/v2/export/")?;
    let mut spec = EndpointSpec::new("readwise-export", url, reader_cursor())
        .with_auth(auth(config)?)
        .with_max_pages(config.max_pages)
        .with_flatten(Flatten {
            children_pointer: "/highlights".to_string(),
            inherit: [
                ("book_title", "/title"),
                ("book_author", "/author"),
                ("book_category", "/category"),
                ("book_source", "/source"),
            ]
            .into_iter()
            .map(|(field, pointer)| (field.to_string(), pointer.to_string()))
            .collect(),
        });
    if let Some(window) = window {
        spec = spec.with_query("updatedAfter", iso_timestamp(window.since()));
    }
    Ok(spec)
}

/// Highlights list: `GET /api/v2/highlights/`, following the `next` URL.
pub fn highlights(
    config: &AppConfig,
    window: Option<&DateWindow>,
) -> Result<EndpointSpec, PresetError> {
    let url = endpoint_url("readwise", &config.api_bases.readwise, "api/v2/highlights/")?;
    let mut spec = EndpointSpec::new("readwise-highlights", url, Pagination::next_url("/next"))
        .with_auth(auth(config)?)
        .with_max_pages(config.max_pages)
        .with_query("page_size", "100");
    if let Some(window) = window {
        spec = spec.with_query("updated__gt", iso_timestamp(window.since()));
    }
    Ok(spec)
}
