//! Period digest over stored summaries.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::FetchError;
use crate::fetch::Throttle;
use crate::summarize::{AnthropicClient, SummaryEntry};
use crate::window::DateWindow;

/// Progress store of per-commit summaries for repository `name`.
pub fn summaries_path(progress_dir: &Path, name: &str) -> PathBuf {
    progress_dir.join(format!("{}_commit_summaries.json", name))
}

/// Text file holding the digest of `name` over `window`.
pub fn digest_path(progress_dir: &Path, name: &str, window: &DateWindow) -> PathBuf {
    progress_dir.join(format!("{}_{}_summary.txt", name, window.label()))
}

fn prompt(entries: &[SummaryEntry], window: &DateWindow, subject: &str) -> Result<String, FetchError> {
    let listed: Vec<Value> = entries
        .iter()
        .map(|entry| {
            json!({
                "summary": entry.summary,
                "url": entry.url,
                "date": entry.date,
                "author": entry.author_name(),
                "id": entry.id,
            })
        })
        .collect();

    Ok(format!(
        "Review these {count} change summaries for {subject} from {start} to {end} and provide a comprehensive overview of all changes.
Focus on the main themes, features, bug fixes, and overall development progress.

Subject: {subject}
Time period: {start} to {end}
Number of changes: {count}

Summaries:
{listed}

Please provide the summary in a structured format with sections for:
1. Overview
2. Key Changes and Features (include the URL and author name in parentheses for each point)
3. Development Patterns and Contributors
4. Recommendations (if any)

Example format for changes:
- Implemented user authentication system (by Jane Doe - https://github.com/owner/repo/commit/abc123)",
        count = entries.len(),
        subject = subject,
        start = window.start(),
        end = window.end(),
        listed = serde_json::to_string_pretty(&listed)?,
    ))
}

/// Ask for an overview of the stored summaries in `window`.
///
/// Returns `None` without calling the API when there is nothing to digest.
/// Entries that do not decode as [`SummaryEntry`] are skipped.
pub async fn digest(
    client: &AnthropicClient,
    throttle: &Throttle,
    entries: &[(&str, &Value)],
    window: &DateWindow,
    subject: &str,
) -> Result<Option<String>, FetchError> {
    let summaries: Vec<SummaryEntry> = entries
        .iter()
        .filter_map(|(id, value)| match serde_json::from_value((*value).clone()) {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!("stored entry {} is not a summary: {}", id, error);
                None
            }
        })
        .collect();

    if summaries.is_empty() {
        info!("no summaries for {} in {}, skipping digest", subject, window);
        return Ok(None);
    }

    let prompt = prompt(&summaries, window, subject)?;
    info!("digesting {} summaries for {}", summaries.len(), subject);
    let text = throttle
        .run("anthropic", || client.complete(&prompt))
        .await?;
    Ok(Some(text))
}
