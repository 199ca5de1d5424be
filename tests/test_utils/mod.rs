//! Shared fixtures for integration tests.
//!
//! Every remote API is pointed at a wiremock server and every sleep goes to a
//! [`RecordingSleeper`], so no test waits on a real clock.

#![allow(dead_code)]

use std::sync::Arc;

use harvest::config::AppConfig;
use harvest::fetch::{
    EndpointSpec, PaginatedFetcher, Pagination, RecordingSleeper, Throttle, build_http_client,
};
use serde_json::{Value, json};
use url::Url;
use wiremock::MockServer;

/// Configuration with all API bases on `server` and every credential set.
pub fn test_config(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    let uri = server.uri();
    config.api_bases.github = uri.clone();
    config.api_bases.readwise = uri.clone();
    config.api_bases.raindrop = uri.clone();
    config.api_bases.hn = uri.clone();
    config.api_bases.twitter = uri.clone();
    config.api_bases.paypal = uri.clone();
    config.api_bases.anthropic = uri;

    config.credentials.github_token = Some("gh-test".to_string());
    config.credentials.readwise_token = Some("rw-test".to_string());
    config.credentials.raindrop_token = Some("rd-test".to_string());
    config.credentials.twitter_bearer_token = Some("tw-test".to_string());
    config.credentials.paypal_client_id = Some("pp-id".to_string());
    config.credentials.paypal_client_secret = Some("pp-secret".to_string());
    config.credentials.anthropic_api_key = Some("sk-ant-test".to_string());
    config.http_timeout_secs = 5;
    config
}

pub fn recording_throttle(config: &AppConfig) -> (Throttle, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::new());
    let throttle = Throttle::from_config_with_sleeper(config, sleeper.clone());
    (throttle, sleeper)
}

pub fn recording_fetcher(config: &AppConfig) -> (PaginatedFetcher, Arc<RecordingSleeper>) {
    let (throttle, sleeper) = recording_throttle(config);
    let client = build_http_client(config).unwrap();
    (PaginatedFetcher::new(client, throttle), sleeper)
}

/// Endpoint at `{server}/items` following `/next` into the `cursor` parameter.
pub fn cursor_endpoint(server: &MockServer) -> EndpointSpec {
    let url = Url::parse(&format!("{}/items", server.uri())).unwrap();
    EndpointSpec::new("synthetic", url, Pagination::body_cursor("/next", "cursor"))
}

/// `count` records with ids `{prefix}{n}`, starting at `first`.
pub fn items(prefix: &str, first: usize, count: usize) -> Vec<Value> {
    (first..first + count)
        .map(|n| json!({"id": format!("{}{}", prefix, n), "n": n}))
        .collect()
}

pub fn cursor_page(results: Vec<Value>, next: Option<&str>) -> Value {
    json!({"results": results, "next": next})
}
