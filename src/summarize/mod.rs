//! # Summarisation
//!
//! Per-record summaries through the Anthropic Messages API and a digest of
//! a period's summaries.

pub mod anthropic;
pub mod digest;

pub use anthropic::{AnthropicClient, AnthropicSummarizer, COMMIT_INSTRUCTIONS};
pub use digest::{digest, digest_path, summaries_path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pointer to the date of a stored [`SummaryEntry`]
pub const DATE: &str = "/date";

/// Value stored in the progress file for each summarised record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    /// Stores written by earlier versions keyed this as `sha`
    #[serde(alias = "sha")]
    pub id: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Value>,
}

impl SummaryEntry {
    /// Author display name; `author` is either a plain string or `{name, email}`.
    pub fn author_name(&self) -> Option<&str> {
        match self.author.as_ref()? {
            Value::String(name) => Some(name),
            other => other.get("name").and_then(Value::as_str),
        }
    }
}
