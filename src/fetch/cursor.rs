//! # Page Cursors
//!
//! Continuation tokens handed back by paginated providers, and parsing of the
//! RFC 8288 `Link` header GitHub uses instead of a body cursor.

use serde::{Deserialize, Serialize};
use url::Url;

/// Where the next page starts.
///
/// A cursor is consumed exactly once; a provider that hands back a cursor we
/// already followed ends the fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cursor {
    /// Opaque token sent back as a query parameter
    Token(String),
    /// Absolute URL of the next page
    Url(Url),
    /// Page number (or offset) sent as a query parameter
    Page(u32),
}

impl Cursor {
    /// Convenience helper to build a token cursor.
    pub fn token<S: Into<String>>(value: S) -> Self {
        Self::Token(value.into())
    }

    pub fn as_page(&self) -> Option<u32> {
        match self {
            Cursor::Page(page) => Some(*page),
            _ => None,
        }
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cursor::Token(token) => write!(f, "token:{}", token),
            Cursor::Url(url) => write!(f, "url:{}", url),
            Cursor::Page(page) => write!(f, "page:{}", page),
        }
    }
}

/// Extract the `rel="next"` target from a `Link` header.
///
/// Format: `<https://api.github.com/resource?page=2>; rel="next", <...>; rel="last"`
pub fn parse_link_next(link_header: &str) -> Option<String> {
    for link in link_header.split(',') {
        let mut parts = link.split(';');
        let Some(url_part) = parts.next().map(str::trim) else {
            continue;
        };

        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            continue;
        }

        if let Some(start) = url_part.find('<')
            && let Some(end) = url_part.find('>')
            && start < end
        {
            return Some(url_part[start + 1..end].to_string());
        }
    }
    None
}
