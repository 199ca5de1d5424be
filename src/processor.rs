//! Resumable per-record processing backed by a [`ProgressStore`].
//!
//! Records already present in the store are skipped without a remote call.
//! New results are persisted one at a time, so rerunning after an interrupt
//! only processes what is still missing.

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::FetchError;
use crate::fetch::{Record, Throttle};
use crate::progress::{ProgressError, ProgressStore};

/// Remote computation applied to each record (summaries, enrichment, ...).
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &str;

    /// Compute the value stored for `record`.
    async fn process(&self, record: &Record) -> Result<Value, FetchError>;
}

/// Outcome counts of one [`ResumableRun::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub processed: usize,
    pub skipped: usize,
    /// Ids that could not be processed this time; retried on the next run
    pub failed: Vec<String>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed.len()
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("aborting run at record {id}: {source}")]
    Fatal { id: String, source: FetchError },
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

pub struct ResumableRun {
    throttle: Throttle,
}

impl ResumableRun {
    pub fn new(throttle: Throttle) -> Self {
        Self { throttle }
    }

    /// Process every record not yet in `store`, in order.
    ///
    /// Fatal errors stop the run; everything stored before that point stays
    /// on disk. Records that exhaust their retries or come back malformed
    /// are reported as failed and the run moves on.
    #[instrument(skip_all, fields(processor = processor.name(), run_id = %Uuid::new_v4()))]
    pub async fn run<P>(
        &self,
        records: &[Record],
        store: &mut ProgressStore,
        processor: &P,
    ) -> Result<RunReport, RunError>
    where
        P: RecordProcessor + ?Sized,
    {
        let mut report = RunReport::default();
        let total = records.len();
        let name = processor.name().to_string();

        for (index, record) in records.iter().enumerate() {
            if store.contains(&record.id) {
                report.skipped += 1;
                continue;
            }

            info!("[{}/{}] processing {}", index + 1, total, record.id);
            let result = self
                .throttle
                .run(&name, || processor.process(record))
                .await;

            match result {
                Ok(value) => {
                    store.insert(record.id.clone(), value)?;
                    report.processed += 1;
                    counter!("harvest_records_processed_total", "processor" => name.clone(), "outcome" => "processed")
                        .increment(1);
                }
                Err(error) if error.is_fatal() => {
                    error!("{}: fatal error on {}: {}", name, record.id, error);
                    return Err(RunError::Fatal {
                        id: record.id.clone(),
                        source: error,
                    });
                }
                Err(error) => {
                    warn!("{}: skipping {}: {}", name, record.id, error);
                    report.failed.push(record.id.clone());
                    counter!("harvest_records_processed_total", "processor" => name.clone(), "outcome" => "failed")
                        .increment(1);
                }
            }
        }

        info!(
            "{}: {} processed, {} already done, {} failed",
            name,
            report.processed,
            report.skipped,
            report.failed.len()
        );
        Ok(report)
    }
}
