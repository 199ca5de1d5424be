//! The paginated fetch loop.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::counter;
use reqwest::header::{ACCEPT, HeaderMap, LINK};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{FetchError, classify_response};
use crate::fetch::build_http_client;
use crate::fetch::cursor::Cursor;
use crate::fetch::endpoint::EndpointSpec;
use crate::fetch::page::{Record, parse_page};
use crate::fetch::retry::Throttle;
use crate::fetch::sleep::Pause;

/// Everything retrieved by one [`PaginatedFetcher::fetch_all`] call.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Deduplicated records in page order
    pub records: Vec<Record>,
    /// Pages successfully parsed
    pub pages: usize,
    /// HTTP requests sent, including retries
    pub requests: usize,
    /// Set when a malformed page ended the fetch early
    pub truncated: bool,
}

/// Raw successful response before JSON parsing
struct RawPage {
    body: String,
    link: Option<String>,
}

#[derive(Default)]
struct FetchState {
    cursor: Option<Cursor>,
    consumed: HashSet<Cursor>,
    seen_ids: HashSet<String>,
    records: Vec<Record>,
    pages: usize,
    truncated: bool,
}

impl FetchState {
    /// Append records not seen before; returns how many were new.
    fn append(&mut self, records: Vec<Record>) -> usize {
        let before = self.records.len();
        for record in records {
            if self.seen_ids.insert(record.id.clone()) {
                self.records.push(record);
            } else {
                debug!("skipping duplicate record {}", record.id);
            }
        }
        self.records.len() - before
    }

    /// Move to `next`, refusing cursors that were already followed.
    fn advance(&mut self, endpoint: &str, next: Option<Cursor>) -> bool {
        let Some(next) = next else {
            return false;
        };
        if !self.consumed.insert(next.clone()) {
            warn!(
                "{}: provider returned already consumed cursor {}, stopping",
                endpoint, next
            );
            return false;
        }
        self.cursor = Some(next);
        true
    }
}

/// Walks an endpoint from the first page to the last.
#[derive(Debug, Clone)]
pub struct PaginatedFetcher {
    client: Client,
    throttle: Throttle,
}

impl PaginatedFetcher {
    pub fn new(client: Client, throttle: Throttle) -> Self {
        Self { client, throttle }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, FetchError> {
        Ok(Self::new(
            build_http_client(config)?,
            Throttle::from_config(config),
        ))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Fetch every page of `spec`, returning all records in page order.
    ///
    /// Rate limits are waited out and transient failures retried without
    /// advancing the cursor. A malformed page ends the fetch and keeps what
    /// was already collected; fatal errors abort.
    #[instrument(skip(self, spec), fields(endpoint = %spec.name, run_id = %Uuid::new_v4()))]
    pub async fn fetch_all(&self, spec: &EndpointSpec) -> Result<FetchOutcome, FetchError> {
        let requests = AtomicUsize::new(0);
        let mut state = FetchState::default();
        info!("{}: fetching from {}", spec.name, spec.url);

        loop {
            if let Some(max_pages) = spec.max_pages
                && state.pages >= max_pages
            {
                info!("{}: reached page limit of {}", spec.name, max_pages);
                break;
            }

            let url = spec.request_url(state.cursor.as_ref());
            let raw = match self
                .throttle
                .run(&spec.name, || self.send_page(spec, &url, &requests))
                .await
            {
                Ok(raw) => raw,
                Err(error) if error.is_malformed() => {
                    error!("{}: malformed response from {}: {}", spec.name, url, error);
                    state.truncated = true;
                    break;
                }
                Err(error) => {
                    error!("{}: fetch aborted: {}", spec.name, error);
                    return Err(error);
                }
            };

            let page = serde_json::from_str::<Value>(&raw.body)
                .map_err(FetchError::from)
                .and_then(|body| {
                    parse_page(spec, &body, raw.link.as_deref(), state.cursor.as_ref())
                });
            let page = match page {
                Ok(page) => page,
                Err(error) => {
                    error!(
                        "{}: malformed page {} ({}), keeping {} records from earlier pages",
                        spec.name,
                        state.pages + 1,
                        error,
                        state.records.len()
                    );
                    state.truncated = true;
                    break;
                }
            };

            state.pages += 1;
            let fetched = page.records.len();
            let added = state.append(page.records);
            debug!(
                "{}: page {} returned {} records ({} new)",
                spec.name, state.pages, fetched, added
            );

            if !state.advance(&spec.name, page.next) {
                break;
            }
            if let Some(delay) = spec.page_delay {
                self.throttle.sleep(delay, Pause::PageDelay).await;
            }
        }

        let outcome = FetchOutcome {
            records: state.records,
            pages: state.pages,
            requests: requests.load(Ordering::SeqCst),
            truncated: state.truncated,
        };
        info!(
            "{}: fetched {} records over {} pages ({} requests)",
            spec.name,
            outcome.records.len(),
            outcome.pages,
            outcome.requests
        );
        Ok(outcome)
    }

    /// Send one non-paginated request under the throttle and decode its JSON body.
    ///
    /// `build` is called again for every retry.
    pub async fn request_json<F>(&self, name: &str, build: F) -> Result<Value, FetchError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.throttle
            .run(name, || self.send_json(name, &build))
            .await
    }

    /// Single attempt of [`request_json`](Self::request_json), for callers
    /// that already run under a throttle.
    pub async fn send_json<F>(&self, name: &str, build: F) -> Result<Value, FetchError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        counter!("harvest_requests_total", "endpoint" => name.to_string()).increment(1);
        let (_, body) = self.send_checked(name, build(&self.client)).await?;
        serde_json::from_str(&body).map_err(FetchError::from)
    }

    async fn send_page(
        &self,
        spec: &EndpointSpec,
        url: &Url,
        requests: &AtomicUsize,
    ) -> Result<RawPage, FetchError> {
        requests.fetch_add(1, Ordering::SeqCst);
        counter!("harvest_requests_total", "endpoint" => spec.name.clone()).increment(1);

        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json");
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let (headers, body) = self
            .send_checked(&spec.name, spec.auth.apply(request))
            .await?;

        let link = headers
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(RawPage { body, link })
    }

    /// Send `request`, record its quota headers and classify failures.
    async fn send_checked(
        &self,
        name: &str,
        request: RequestBuilder,
    ) -> Result<(HeaderMap, String), FetchError> {
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        self.throttle.observe(&headers);
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_response(name, status, &headers, &body));
        }
        Ok((headers, body))
    }
}
