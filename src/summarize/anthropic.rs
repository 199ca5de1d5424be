//! Anthropic Messages API client and the record processor built on it.

use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{ACCEPT, HeaderMap};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::config::AppConfig;
use crate::error::{FetchError, ProviderError, body_snippet, classify_response};
use crate::fetch::Record;
use crate::processor::RecordProcessor;
use crate::providers::{PresetError, endpoint_url};
use crate::summarize::{DATE, SummaryEntry};

const API_VERSION: &str = "2023-06-01";

/// Status Anthropic uses when the API is overloaded
const OVERLOADED: u16 = 529;

pub const COMMIT_INSTRUCTIONS: &str = "Analyze this GitHub commit and provide a concise summary of the changes.\n\
Focus on what was changed and why. Be specific but brief.";

#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    url: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("url", &self.url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnthropicClient {
    pub fn from_config(config: &AppConfig, http: Client) -> Result<Self, PresetError> {
        let api_key = config.credentials.anthropic_api_key()?.to_string();
        let url = endpoint_url("anthropic", &config.api_bases.anthropic, "v1/messages")?;
        Ok(Self {
            http,
            url,
            api_key,
            model: config.anthropic.model.clone(),
            max_tokens: config.anthropic.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `prompt` as a single user message and return the first text block.
    ///
    /// One attempt only; callers wrap this in a
    /// [`Throttle`](crate::fetch::Throttle).
    pub async fn complete(&self, prompt: &str) -> Result<String, FetchError> {
        counter!("harvest_requests_total", "endpoint" => "anthropic").increment(1);
        let request = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .http
            .post(self.url.clone())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_anthropic(status, &headers, &body));
        }
        let body: Value = serde_json::from_str(&body)?;
        if let Some(usage) = body.get("usage") {
            debug!("anthropic usage: {}", usage);
        }
        response_text(&body)
    }
}

/// Overload is retryable whatever status carries it.
fn classify_anthropic(status: StatusCode, headers: &HeaderMap, body: &str) -> FetchError {
    let error_type = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        value
            .pointer("/error/type")
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    if status.as_u16() == OVERLOADED || error_type.as_deref() == Some("overloaded_error") {
        return FetchError::transient("anthropic is overloaded").with_details(json!(
            ProviderError {
                provider: "anthropic".to_string(),
                status: status.as_u16(),
                body_snippet: body_snippet(body),
            }
        ));
    }
    classify_response("anthropic", status, headers, body)
}

fn response_text(body: &Value) -> Result<String, FetchError> {
    body.get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        })
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| FetchError::malformed("anthropic response has no text content"))
}

/// Summarises each record with a fixed instruction followed by the record JSON.
pub struct AnthropicSummarizer {
    client: AnthropicClient,
    instructions: String,
    date_pointer: String,
}

impl AnthropicSummarizer {
    pub fn new<S: Into<String>>(client: AnthropicClient, instructions: S) -> Self {
        Self {
            client,
            instructions: instructions.into(),
            date_pointer: DATE.to_string(),
        }
    }

    pub fn for_commits(client: AnthropicClient) -> Self {
        Self::new(client, COMMIT_INSTRUCTIONS)
    }

    /// Where the record keeps the date copied into its [`SummaryEntry`].
    pub fn with_date_pointer<S: Into<String>>(mut self, pointer: S) -> Self {
        self.date_pointer = pointer.into();
        self
    }

    fn prompt(&self, record: &Record) -> Result<String, FetchError> {
        Ok(format!(
            "{}\n\nData:\n{}",
            self.instructions,
            serde_json::to_string_pretty(&record.body)?
        ))
    }
}

#[async_trait]
impl RecordProcessor for AnthropicSummarizer {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn process(&self, record: &Record) -> Result<Value, FetchError> {
        let summary = self.client.complete(&self.prompt(record)?).await?;
        let entry = SummaryEntry {
            id: record.id.clone(),
            summary,
            date: record.str_field(&self.date_pointer).map(str::to_string),
            url: record.str_field("/url").map(str::to_string),
            author: record.field("/author").cloned(),
        };
        Ok(serde_json::to_value(entry)?)
    }
}
