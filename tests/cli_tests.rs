//! The `harvest` binary end to end.

use std::fs;

use assert_cmd::Command;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param, query_param_is_missing},
};

/// The binary run from an empty directory with no inherited credentials.
fn harvest(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("harvest").unwrap();
    cmd.current_dir(dir.path())
        .env("HARVEST_LOG_LEVEL", "warn")
        .env_remove("RUST_LOG");
    for var in [
        "GITHUB_TOKEN",
        "HARVEST_GITHUB_TOKEN",
        "ANTHROPIC_API_KEY",
        "HARVEST_ANTHROPIC_API_KEY",
        "HARVEST_PROGRESS_DIR",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn status_reports_entries_in_window() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("django_commit_summaries.json");
    fs::write(
        &store,
        serde_json::to_string_pretty(&json!({
            "a1": {"sha": "a1", "summary": "x", "date": "2024-03-03T10:00:00+00:00"},
            "b2": {"sha": "b2", "summary": "y", "date": "2024-05-01T10:00:00+00:00"}
        }))
        .unwrap(),
    )
    .unwrap();

    let output = harvest(&dir)
        .args(["status", "--store"])
        .arg(&store)
        .args(["--month", "2024-03"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("2 entries"));
    assert!(stdout.contains("1 entries between 2024-03-01 and 2024-03-31"));
    assert!(stdout.contains("a1"));
    assert!(!stdout.contains("b2"));
}

#[test]
fn corrupt_store_fails_without_touching_file() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("broken.json");
    fs::write(&store, "{not json").unwrap();

    let output = harvest(&dir)
        .args(["status", "--store"])
        .arg(&store)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert_eq!(fs::read_to_string(&store).unwrap(), "{not json");
}

#[test]
fn missing_token_names_the_variable() {
    let dir = TempDir::new().unwrap();

    let output = harvest(&dir)
        .args(["fetch", "github-commits", "django/django"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("GITHUB_TOKEN"));
}

#[test]
fn days_and_month_conflict() {
    let dir = TempDir::new().unwrap();

    harvest(&dir)
        .args(["fetch", "readwise-export", "--days", "3", "--month", "2024-03"])
        .assert()
        .failure();
}

#[test]
fn oversized_day_count_is_an_error() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    fs::write(&store, "{}").unwrap();

    let output = harvest(&dir)
        .args(["status", "--store"])
        .arg(&store)
        .args(["--days", "100000000"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("out of the supported date range"));
}

#[tokio::test]
async fn fetch_to_stdout_warns_on_partial_result() {
    let server = MockServer::start().await;
    let next = format!(
        "<{}/repos/o/r/commits?page=2>; rel=\"next\"",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .and(query_param_is_missing("page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!([{"sha": "aaa"}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "not a list"})))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut cmd = harvest(&dir);
    cmd.env("HARVEST_GITHUB_API_BASE", server.uri())
        .env("HARVEST_GITHUB_TOKEN", "gh-test")
        .args(["fetch", "github-commits", "o/r"]);

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success());
    let written: Vec<Value> = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(written.len(), 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("the result is partial"));
}

#[tokio::test]
async fn fetch_writes_records_to_output_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/django/django/commits"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"sha": "aaa"}, {"sha": "bbb"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("commits.json");
    let mut cmd = harvest(&dir);
    cmd.env("HARVEST_GITHUB_API_BASE", server.uri())
        .env("HARVEST_GITHUB_TOKEN", "gh-test")
        .args(["fetch", "github-commits", "django/django", "--output"])
        .arg(&out);

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success());
    assert!(stdout_of(&output).contains("Saved 2 records from 1 pages"));
    let written: Vec<Value> = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(written[1]["sha"], "bbb");
}

#[tokio::test]
async fn summarize_without_fetch_and_empty_store_skips_digest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut cmd = harvest(&dir);
    cmd.env("HARVEST_ANTHROPIC_API_BASE", server.uri())
        .env("HARVEST_ANTHROPIC_API_KEY", "sk-ant-test")
        .env("HARVEST_PROGRESS_DIR", dir.path())
        .args([
            "summarize-commits",
            "--repo",
            "https://github.com/django/django",
            "--month",
            "2024-03",
            "--no-fetch",
        ]);

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Analyzing django/django from 2024-03-01 to 2024-03-31"));
    assert!(stdout.contains("No commits found for the specified period"));
    assert!(
        !dir.path()
            .join("django_django_2024-03-01_to_2024-03-31_summary.txt")
            .exists()
    );
}
