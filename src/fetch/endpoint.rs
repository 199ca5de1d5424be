//! Endpoint description for the paginated fetcher.
//!
//! One [`EndpointSpec`] captures everything that differs between providers:
//! where to send requests, how to authenticate, where records live in the
//! response body, how their identifiers are read, and how the next page is
//! located.

use std::time::Duration;

use reqwest::RequestBuilder;
use url::Url;

use crate::fetch::cursor::Cursor;

/// Authentication scheme applied to every request
#[derive(Clone, Default)]
pub enum Auth {
    #[default]
    None,
    /// `Authorization: Bearer <token>` (GitHub, Raindrop, Twitter, PayPal)
    Bearer(String),
    /// `Authorization: Token <token>` (Readwise)
    Token(String),
    /// HTTP basic authentication
    Basic {
        username: String,
        password: Option<String>,
    },
    /// Arbitrary header, e.g. `x-api-key`
    Header { name: String, value: String },
}

impl Auth {
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Token(token) => request.header("Authorization", format!("Token {}", token)),
            Auth::Basic { username, password } => request.basic_auth(username, password.as_ref()),
            Auth::Header { name, value } => request.header(name.as_str(), value.as_str()),
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Bearer(_) => write!(f, "Bearer([REDACTED])"),
            Auth::Token(_) => write!(f, "Token([REDACTED])"),
            Auth::Basic { username, .. } => write!(f, "Basic({}, [REDACTED])", username),
            Auth::Header { name, .. } => write!(f, "Header({}, [REDACTED])", name),
        }
    }
}

/// How a provider exposes the next page
#[derive(Debug, Clone, PartialEq)]
pub enum Pagination {
    /// Opaque token in the body at `pointer`, sent back as query parameter `param`
    BodyCursor { pointer: String, param: String },
    /// Absolute URL of the next page in the body at `pointer`
    NextUrl { pointer: String },
    /// `Link: <...>; rel="next"` response header
    LinkHeader,
    /// Incrementing page number starting at `start`. Stops on an empty page or
    /// once the page count at `total_pages_pointer` is reached.
    PageNumber {
        param: String,
        start: u32,
        total_pages_pointer: Option<String>,
    },
}

impl Pagination {
    pub fn body_cursor(pointer: &str, param: &str) -> Self {
        Self::BodyCursor {
            pointer: pointer.to_string(),
            param: param.to_string(),
        }
    }

    pub fn next_url(pointer: &str) -> Self {
        Self::NextUrl {
            pointer: pointer.to_string(),
        }
    }

    pub fn page_number(param: &str, start: u32, total_pages_pointer: Option<&str>) -> Self {
        Self::PageNumber {
            param: param.to_string(),
            start,
            total_pages_pointer: total_pages_pointer.map(str::to_string),
        }
    }
}

/// Records nested one level down (e.g. highlights inside books) are lifted out,
/// carrying selected parent fields along.
#[derive(Debug, Clone, PartialEq)]
pub struct Flatten {
    /// Pointer to the child array inside each top-level item
    pub children_pointer: String,
    /// `(child field, parent pointer)` pairs copied onto every child
    pub inherit: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct EndpointSpec {
    /// Short name used in logs and error details
    pub name: String,
    pub url: Url,
    /// Static query parameters sent with every non-URL cursor request
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub auth: Auth,
    pub pagination: Pagination,
    /// JSON pointer to the record array; `""` when the body itself is the array
    pub items_pointer: String,
    /// JSON pointer to the identifier inside each record
    pub id_pointer: String,
    /// Treat a missing record field as an empty page instead of malformed
    pub optional_items: bool,
    pub flatten: Option<Flatten>,
    pub max_pages: Option<usize>,
    /// Pause between consecutive pages for APIs that ask for politeness
    pub page_delay: Option<Duration>,
}

impl EndpointSpec {
    pub fn new<S: Into<String>>(name: S, url: Url, pagination: Pagination) -> Self {
        Self {
            name: name.into(),
            url,
            query: Vec::new(),
            headers: Vec::new(),
            auth: Auth::None,
            pagination,
            items_pointer: "/results".to_string(),
            id_pointer: "/id".to_string(),
            optional_items: false,
            flatten: None,
            max_pages: None,
            page_delay: None,
        }
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_items_pointer(mut self, pointer: &str) -> Self {
        self.items_pointer = pointer.to_string();
        self
    }

    pub fn with_id_pointer(mut self, pointer: &str) -> Self {
        self.id_pointer = pointer.to_string();
        self
    }

    pub fn with_optional_items(mut self) -> Self {
        self.optional_items = true;
        self
    }

    pub fn with_flatten(mut self, flatten: Flatten) -> Self {
        self.flatten = Some(flatten);
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    /// Build the URL for the request that consumes `cursor`.
    ///
    /// A URL cursor already encodes every parameter and is used verbatim.
    pub fn request_url(&self, cursor: Option<&Cursor>) -> Url {
        if let Some(Cursor::Url(next)) = cursor {
            return next.clone();
        }

        let mut pairs: Vec<(String, String)> = self.query.clone();
        match (&self.pagination, cursor) {
            (Pagination::BodyCursor { param, .. }, Some(Cursor::Token(token))) => {
                pairs.push((param.clone(), token.clone()));
            }
            (Pagination::PageNumber { param, start, .. }, current) => {
                let page = current.and_then(Cursor::as_page).unwrap_or(*start);
                pairs.push((param.clone(), page.to_string()));
            }
            _ => {}
        }

        let mut url = self.url.clone();
        if !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &pairs {
                query.append_pair(key, value);
            }
        }
        url
    }
}
