//! GitHub commits, listed with Link-header pagination.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::config::AppConfig;
use crate::error::FetchError;
use crate::fetch::{Auth, EndpointSpec, PaginatedFetcher, Pagination, Record};
use crate::processor::RecordProcessor;
use crate::providers::{PresetError, endpoint_url, iso_timestamp};
use crate::window::DateWindow;

const API_VERSION: &str = "2022-11-28";

/// `owner/name` of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Accepts `owner/name` or a `https://github.com/owner/name` URL.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim().trim_end_matches('/').trim_end_matches(".git");
        let path = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("http://github.com/"))
            .unwrap_or(trimmed);
        let (owner, name) = path.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// `owner_name`, unique per repository for on-disk file names.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.owner, self.name)
    }

    pub fn commit_url(&self, sha: &str) -> String {
        format!("https://github.com/{}/{}/commit/{}", self.owner, self.name, sha)
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// `GET /repos/{owner}/{repo}/commits`, optionally bounded by `window`.
pub fn commits(
    config: &AppConfig,
    repo: &RepoSlug,
    window: Option<&DateWindow>,
) -> Result<EndpointSpec, PresetError> {
    let token = config.credentials.github_token()?;
    let url = endpoint_url(
        "github",
        &config.api_bases.github,
        &format!("repos/{}/{}/commits", repo.owner, repo.name),
    )?;

    let mut spec = EndpointSpec::new("github", url, Pagination::LinkHeader)
        .with_auth(Auth::Bearer(token.to_string()))
        .with_header("X-GitHub-Api-Version", API_VERSION)
        .with_items_pointer("")
        .with_id_pointer("/sha")
        .with_max_pages(config.max_pages)
        .with_query("per_page", "100");
    if let Some(window) = window {
        spec = spec
            .with_query("since", iso_timestamp(window.since()))
            .with_query("until", iso_timestamp(window.until()));
    }
    Ok(spec)
}

/// `GET /repos/{owner}/{repo}/commits/{sha}`, which adds the changed files.
pub async fn commit_detail(
    fetcher: &PaginatedFetcher,
    config: &AppConfig,
    repo: &RepoSlug,
    sha: &str,
) -> Result<Value, PresetError> {
    let auth = Auth::Bearer(config.credentials.github_token()?.to_string());
    let url = endpoint_url(
        "github",
        &config.api_bases.github,
        &format!("repos/{}/{}/commits/{}", repo.owner, repo.name, sha),
    )?;
    // Runs inside the caller's throttle, so a single attempt here
    let detail = fetcher
        .send_json("github", |client| {
            auth.apply(client.get(url.clone()))
                .header("X-GitHub-Api-Version", API_VERSION)
        })
        .await?;
    Ok(detail)
}

/// Reduce a listed commit (and optionally its detail) to the fields that get
/// summarised and stored.
pub fn commit_info(repo: &RepoSlug, commit: &Value, detail: Option<&Value>) -> Value {
    let sha = commit.pointer("/sha").and_then(Value::as_str).unwrap_or_default();
    let text = |pointer: &str| {
        commit
            .pointer(pointer)
            .cloned()
            .unwrap_or(Value::Null)
    };

    let mut info = json!({
        "sha": sha,
        "message": text("/commit/message"),
        "author": {
            "name": text("/commit/author/name"),
            "email": text("/commit/author/email"),
        },
        "date": text("/commit/author/date"),
        "url": repo.commit_url(sha),
    });

    if let Some(files) = detail.and_then(|d| d.pointer("/files")).and_then(Value::as_array) {
        info["files"] = files
            .iter()
            .map(|file| {
                json!({
                    "filename": file.get("filename").cloned().unwrap_or(Value::Null),
                    "additions": file.get("additions").cloned().unwrap_or(Value::Null),
                    "deletions": file.get("deletions").cloned().unwrap_or(Value::Null),
                    "changes": file.get("changes").cloned().unwrap_or(Value::Null),
                })
            })
            .collect();
    }
    info
}

/// Fetches each commit's changed files before handing it to `inner`.
pub struct CommitDetailProcessor<'a, P> {
    fetcher: &'a PaginatedFetcher,
    config: &'a AppConfig,
    repo: RepoSlug,
    inner: P,
}

impl<'a, P> CommitDetailProcessor<'a, P> {
    pub fn new(
        fetcher: &'a PaginatedFetcher,
        config: &'a AppConfig,
        repo: RepoSlug,
        inner: P,
    ) -> Self {
        Self {
            fetcher,
            config,
            repo,
            inner,
        }
    }
}

#[async_trait]
impl<P: RecordProcessor> RecordProcessor for CommitDetailProcessor<'_, P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn process(&self, record: &Record) -> Result<Value, FetchError> {
        let detail = match commit_detail(self.fetcher, self.config, &self.repo, &record.id).await {
            Ok(detail) => detail,
            Err(PresetError::Fetch(error)) => return Err(error),
            Err(other) => return Err(FetchError::fatal(other.to_string())),
        };
        let enriched = Record::new(
            record.id.clone(),
            commit_info(&self.repo, &detail, Some(&detail)),
        );
        self.inner.process(&enriched).await
    }
}
