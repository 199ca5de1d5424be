//! Page parsing: records at a JSON pointer, identifiers, and the next cursor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::error::FetchError;
use crate::fetch::cursor::{Cursor, parse_link_next};
use crate::fetch::endpoint::{EndpointSpec, Flatten, Pagination};

/// A single item returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub body: Value,
}

impl Record {
    pub fn new<S: Into<String>>(id: S, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    /// Look up a field of the body by JSON pointer.
    pub fn field(&self, pointer: &str) -> Option<&Value> {
        self.body.pointer(pointer)
    }

    pub fn str_field(&self, pointer: &str) -> Option<&str> {
        self.field(pointer).and_then(Value::as_str)
    }
}

/// One parsed response.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    /// Number of items in the response before id extraction
    pub raw_items: usize,
    pub next: Option<Cursor>,
}

/// Render an identifier value as a string; numbers keep their decimal form.
pub fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

static NO_ITEMS: Vec<Value> = Vec::new();

fn items_at<'a>(
    body: &'a Value,
    pointer: &str,
    optional: bool,
) -> Result<&'a Vec<Value>, FetchError> {
    let items = if pointer.is_empty() {
        Some(body)
    } else {
        body.pointer(pointer)
    };
    match items {
        Some(Value::Array(items)) => Ok(items),
        None | Some(Value::Null) if optional => Ok(&NO_ITEMS),
        Some(other) => Err(FetchError::malformed(format!(
            "expected an array at '{}', found {}",
            pointer,
            json_type(other)
        ))),
        None => Err(FetchError::malformed(format!(
            "response has no '{}' field",
            pointer
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Lift children out of their parents, copying inherited parent fields.
fn flatten_items(items: &[Value], flatten: &Flatten) -> Vec<Value> {
    let mut flattened = Vec::new();
    for parent in items {
        let Some(Value::Array(children)) = parent.pointer(&flatten.children_pointer) else {
            continue;
        };
        for child in children {
            let mut child = child.clone();
            if let Value::Object(fields) = &mut child {
                for (field, parent_pointer) in &flatten.inherit {
                    let inherited = parent.pointer(parent_pointer).cloned().unwrap_or(Value::Null);
                    fields.entry(field.clone()).or_insert(inherited);
                }
            }
            flattened.push(child);
        }
    }
    flattened
}

fn next_cursor(
    spec: &EndpointSpec,
    body: &Value,
    link_header: Option<&str>,
    current: Option<&Cursor>,
    raw_items: usize,
) -> Result<Option<Cursor>, FetchError> {
    match &spec.pagination {
        Pagination::BodyCursor { pointer, .. } => Ok(match body.pointer(pointer) {
            Some(Value::String(token)) if !token.is_empty() => Some(Cursor::Token(token.clone())),
            Some(Value::Number(n)) => Some(Cursor::Token(n.to_string())),
            _ => None,
        }),
        Pagination::NextUrl { pointer } => match body.pointer(pointer) {
            Some(Value::String(next)) if !next.is_empty() => Url::parse(next)
                .map(|url| Some(Cursor::Url(url)))
                .map_err(|e| FetchError::malformed(format!("invalid next URL '{}': {}", next, e))),
            _ => Ok(None),
        },
        Pagination::LinkHeader => match link_header.and_then(parse_link_next) {
            Some(next) => Url::parse(&next)
                .map(|url| Some(Cursor::Url(url)))
                .map_err(|e| {
                    FetchError::malformed(format!("invalid Link header URL '{}': {}", next, e))
                }),
            None => Ok(None),
        },
        Pagination::PageNumber {
            start,
            total_pages_pointer,
            ..
        } => {
            if raw_items == 0 {
                return Ok(None);
            }
            let current = current.and_then(Cursor::as_page).unwrap_or(*start);
            let next = current.saturating_add(1);
            let total = total_pages_pointer
                .as_deref()
                .and_then(|pointer| body.pointer(pointer))
                .and_then(Value::as_u64);
            match total {
                Some(total) if u64::from(next.saturating_sub(*start)) >= total => Ok(None),
                _ => Ok(Some(Cursor::Page(next))),
            }
        }
    }
}

/// Parse one response body into records and the cursor for the next page.
///
/// A missing or non-array record field is `Malformed`. Records without an
/// identifier are logged and dropped.
pub fn parse_page(
    spec: &EndpointSpec,
    body: &Value,
    link_header: Option<&str>,
    current: Option<&Cursor>,
) -> Result<Page, FetchError> {
    let items = items_at(body, &spec.items_pointer, spec.optional_items)?;
    let items: Vec<Value> = match &spec.flatten {
        Some(flatten) => flatten_items(items, flatten),
        None => items.clone(),
    };
    let raw_items = items.len();

    let mut records = Vec::with_capacity(raw_items);
    for item in items {
        match item.pointer(&spec.id_pointer).and_then(id_to_string) {
            Some(id) => records.push(Record { id, body: item }),
            None => warn!(
                "{}: dropping record without identifier at '{}'",
                spec.name, spec.id_pointer
            ),
        }
    }

    let next = next_cursor(spec, body, link_header, current, raw_items)?;
    Ok(Page {
        records,
        raw_items,
        next,
    })
}
