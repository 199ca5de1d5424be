//! Resumable processing over a progress file.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use harvest::config::AppConfig;
use harvest::error::FetchError;
use harvest::fetch::Record;
use harvest::processor::{RecordProcessor, ResumableRun, RunError};
use harvest::progress::ProgressStore;
use serde_json::{Value, json};
use tempfile::TempDir;

mod test_utils;
use test_utils::recording_throttle;

/// Counts calls and fails in a configurable way.
#[derive(Default)]
struct ScriptedProcessor {
    calls: AtomicUsize,
    /// Abort with a fatal error on this call number (1-based)
    fatal_on_call: Option<usize>,
    /// Id that always fails with the given error
    failing: Option<(String, FetchError)>,
}

impl ScriptedProcessor {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordProcessor for ScriptedProcessor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn process(&self, record: &Record) -> Result<Value, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fatal_on_call == Some(call) {
            return Err(FetchError::fatal("interrupted"));
        }
        if let Some((id, error)) = &self.failing
            && *id == record.id
        {
            return Err(error.clone());
        }
        Ok(json!({"id": record.id, "summary": format!("summary of {}", record.id)}))
    }
}

fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| Record::new(format!("rec-{:02}", i), json!({"n": i})))
        .collect()
}

fn quick_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retry.max_retries = 2;
    config.retry.base_delay_seconds = 1;
    config
}

#[tokio::test]
async fn test_complete_store_makes_no_calls() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("done.json");
    let records = records(5);
    {
        let mut store = ProgressStore::open(&path).unwrap();
        for record in &records {
            store.insert(record.id.clone(), json!({"summary": "old"})).unwrap();
        }
    }
    let before = std::fs::read_to_string(&path).unwrap();

    let (throttle, _) = recording_throttle(&quick_config());
    let processor = ScriptedProcessor::default();
    let mut store = ProgressStore::open(&path).unwrap();
    let report = ResumableRun::new(throttle)
        .run(&records, &mut store, &processor)
        .await
        .unwrap();

    assert_eq!(processor.calls(), 0);
    assert_eq!(report.skipped, 5);
    assert_eq!(report.processed, 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[tokio::test]
async fn test_interrupted_run_resumes_to_exactly_n_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let records = records(10);
    let (throttle, _) = recording_throttle(&quick_config());
    let run = ResumableRun::new(throttle);

    // Interrupted while processing the 5th record
    let interrupted = ScriptedProcessor {
        fatal_on_call: Some(5),
        ..Default::default()
    };
    let mut store = ProgressStore::open(&path).unwrap();
    let error = run
        .run(&records, &mut store, &interrupted)
        .await
        .unwrap_err();
    match error {
        RunError::Fatal { id, .. } => assert_eq!(id, "rec-04"),
        other => panic!("expected fatal, got {:?}", other),
    }
    drop(store);
    assert_eq!(ProgressStore::open(&path).unwrap().len(), 4);

    // Restart from what is on disk
    let resumed = ScriptedProcessor::default();
    let mut store = ProgressStore::open(&path).unwrap();
    let report = run.run(&records, &mut store, &resumed).await.unwrap();

    assert_eq!(resumed.calls(), 6);
    assert_eq!(report.skipped, 4);
    assert_eq!(report.processed, 6);

    let reloaded = ProgressStore::open(&path).unwrap();
    assert_eq!(reloaded.len(), 10);
    let ids: Vec<&str> = reloaded.ids().collect();
    let expected: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_exhausted_retries_are_reported_and_not_stored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let records = records(3);
    let (throttle, sleeper) = recording_throttle(&quick_config());

    let processor = ScriptedProcessor {
        failing: Some(("rec-01".to_string(), FetchError::transient("overloaded"))),
        ..Default::default()
    };
    let mut store = ProgressStore::open(&path).unwrap();
    let report = ResumableRun::new(throttle)
        .run(&records, &mut store, &processor)
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, vec!["rec-01".to_string()]);
    assert!(!store.contains("rec-01"));
    // One first attempt and two retries for the failing record
    assert_eq!(processor.calls(), 2 + 3);
    assert_eq!(
        sleeper.recorded(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn test_malformed_result_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let records = records(2);
    let (throttle, sleeper) = recording_throttle(&quick_config());

    let processor = ScriptedProcessor {
        failing: Some(("rec-00".to_string(), FetchError::malformed("no text"))),
        ..Default::default()
    };
    let mut store = ProgressStore::open(&path).unwrap();
    let report = ResumableRun::new(throttle)
        .run(&records, &mut store, &processor)
        .await
        .unwrap();

    assert_eq!(report.failed, vec!["rec-00".to_string()]);
    assert_eq!(report.total(), 2);
    assert_eq!(processor.calls(), 2);
    assert!(sleeper.recorded().is_empty());
}

#[tokio::test]
async fn test_rate_limited_processor_waits_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let records = records(1);
    let (throttle, sleeper) = recording_throttle(&quick_config());

    struct LimitedOnce(AtomicUsize);

    #[async_trait]
    impl RecordProcessor for LimitedOnce {
        fn name(&self) -> &str {
            "limited"
        }

        async fn process(&self, record: &Record) -> Result<Value, FetchError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(FetchError::rate_limited(Some(15), None));
            }
            Ok(json!({"id": record.id}))
        }
    }

    let processor = LimitedOnce(AtomicUsize::new(0));
    let mut store = ProgressStore::open(&path).unwrap();
    let report = ResumableRun::new(throttle)
        .run(&records, &mut store, &processor)
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(sleeper.recorded(), vec![Duration::from_secs(15)]);
}
