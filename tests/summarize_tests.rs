//! Summaries and digests through a mocked Anthropic API.

use std::time::Duration;

use chrono::NaiveDate;
use harvest::fetch::{Record, build_http_client};
use harvest::processor::{RecordProcessor, ResumableRun};
use harvest::progress::ProgressStore;
use harvest::providers::github::{CommitDetailProcessor, RepoSlug, commit_info};
use harvest::summarize::{self, AnthropicClient, AnthropicSummarizer, SummaryEntry, digest};
use harvest::window::DateWindow;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

mod test_utils;
use test_utils::{recording_fetcher, recording_throttle, test_config};

fn message(text: &str) -> Value {
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 5}
    })
}

fn listed_commit(sha: &str, date: &str) -> Value {
    json!({
        "sha": sha,
        "commit": {
            "message": format!("Commit {}", sha),
            "author": {"name": "Ada", "email": "ada@example.com", "date": date}
        }
    })
}

#[tokio::test]
async fn test_summarizer_sends_messages_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-3-5-sonnet-latest",
            "max_tokens": 1000,
            "temperature": 0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(message("Adds a cache layer.")))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let client = AnthropicClient::from_config(&config, build_http_client(&config).unwrap()).unwrap();
    let summarizer = AnthropicSummarizer::for_commits(client);

    let repo = RepoSlug::parse("o/r").unwrap();
    let record = Record::new(
        "abc",
        commit_info(&repo, &listed_commit("abc", "2024-03-02T09:00:00Z"), None),
    );
    let value = summarizer.process(&record).await.unwrap();
    let entry: SummaryEntry = serde_json::from_value(value).unwrap();

    assert_eq!(entry.id, "abc");
    assert_eq!(entry.summary, "Adds a cache layer.");
    assert_eq!(entry.date.as_deref(), Some("2024-03-02T09:00:00Z"));
    assert_eq!(entry.url.as_deref(), Some("https://github.com/o/r/commit/abc"));
    assert_eq!(entry.author_name(), Some("Ada"));
}

#[tokio::test]
async fn test_overloaded_api_is_retried_within_run() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message("Fine now.")))
        .mount(&server)
        .await;

    let config = test_config(&server);
    let (throttle, sleeper) = recording_throttle(&config);
    let client = AnthropicClient::from_config(&config, build_http_client(&config).unwrap()).unwrap();
    let summarizer = AnthropicSummarizer::for_commits(client);

    let dir = TempDir::new().unwrap();
    let mut store = ProgressStore::open(dir.path().join("r_commit_summaries.json")).unwrap();
    let records = vec![Record::new("s1", json!({"sha": "s1", "date": "2024-03-01"}))];
    let report = ResumableRun::new(throttle)
        .run(&records, &mut store, &summarizer)
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(
        sleeper.recorded(),
        vec![Duration::from_secs(10), Duration::from_secs(20)]
    );
    assert_eq!(store.get("s1").unwrap()["summary"], "Fine now.");
}

#[tokio::test]
async fn test_detail_processor_adds_changed_files() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits/abc"))
        .and(header("authorization", "Bearer gh-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json({
            let mut detail = listed_commit("abc", "2024-03-02T09:00:00Z");
            detail["files"] = json!([
                {"filename": "src/lib.rs", "additions": 3, "deletions": 1, "changes": 4, "patch": "@@"}
            ]);
            detail
        }))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message("Touches lib.rs.")))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let (fetcher, _) = recording_fetcher(&config);
    let client = AnthropicClient::from_config(&config, build_http_client(&config).unwrap()).unwrap();
    let repo = RepoSlug::parse("o/r").unwrap();
    let processor = CommitDetailProcessor::new(
        &fetcher,
        &config,
        repo.clone(),
        AnthropicSummarizer::for_commits(client),
    );

    let record = Record::new(
        "abc",
        commit_info(&repo, &listed_commit("abc", "2024-03-02T09:00:00Z"), None),
    );
    let value = processor.process(&record).await.unwrap();
    assert_eq!(value["summary"], "Touches lib.rs.");

    // The prompt carried the file list
    let requests = server.received_requests().await.unwrap();
    let prompt_request = requests
        .iter()
        .find(|request| request.url.path() == "/v1/messages")
        .unwrap();
    let body: Value = serde_json::from_slice(&prompt_request.body).unwrap();
    let prompt = body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("src/lib.rs"));
    assert!(!prompt.contains("\"patch\""));
}

#[tokio::test]
async fn test_digest_of_period_entries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message("## Overview\nBusy month.")))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let (throttle, _) = recording_throttle(&config);
    let client = AnthropicClient::from_config(&config, build_http_client(&config).unwrap()).unwrap();

    let dir = TempDir::new().unwrap();
    let mut store = ProgressStore::open(dir.path().join("r_commit_summaries.json")).unwrap();
    store
        .insert(
            "in-march",
            json!({"sha": "in-march", "summary": "A", "date": "2024-03-10T00:00:00Z", "author": {"name": "Ada"}}),
        )
        .unwrap();
    store
        .insert(
            "in-april",
            json!({"id": "in-april", "summary": "B", "date": "2024-04-02T00:00:00Z"}),
        )
        .unwrap();

    let window = DateWindow::parse_month("2024-03").unwrap();
    let entries = store.entries_in(&window, summarize::DATE);
    assert_eq!(entries.len(), 1);

    let text = digest(&client, &throttle, &entries, &window, "o/r")
        .await
        .unwrap();
    assert_eq!(text.as_deref(), Some("## Overview\nBusy month."));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let prompt = body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("2024-03-01 to 2024-03-31"));
    assert!(!prompt.contains("\"B\""));
}

#[tokio::test]
async fn test_empty_period_skips_digest_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let (throttle, _) = recording_throttle(&config);
    let client = AnthropicClient::from_config(&config, build_http_client(&config).unwrap()).unwrap();
    let window = DateWindow::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
    )
    .unwrap();

    let text = digest(&client, &throttle, &[], &window, "o/r").await.unwrap();
    assert!(text.is_none());
}
