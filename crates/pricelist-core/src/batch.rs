//! Bounded worker pool over documents, persisting after every completion.
//!
//! Documents run on a dedicated rayon pool and finished
//! [`DocumentResult`]s come back over a channel. The calling thread appends
//! each result in completion order and hands the whole collection to a
//! [`ResultSink`].

use std::collections::HashSet;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ExtractionError, PricelistError};
use crate::models::batch::{BatchStatus, DocumentResult, DocumentStatus};
use crate::models::config::BatchConfig;
use crate::models::line_item::LineItem;
use crate::vendor::profile;

/// One document queued for extraction.
#[derive(Debug, Clone)]
pub struct DocumentJob {
    pub filename: String,
    pub vendor_code: String,
    pub bytes: Vec<u8>,
}

impl DocumentJob {
    pub fn new(filename: impl Into<String>, vendor_code: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            vendor_code: vendor_code.into(),
            bytes,
        }
    }
}

/// Turns one document into line items.
pub trait DocumentProcessor {
    fn process(&self, job: &DocumentJob) -> Result<Vec<LineItem>, ExtractionError>;
}

/// Receives the full result collection after every completion.
pub trait ResultSink {
    fn record(&mut self, results: &[DocumentResult], status: &BatchStatus) -> crate::Result<()>;
}

/// Sink that keeps nothing.
impl ResultSink for () {
    fn record(&mut self, _results: &[DocumentResult], _status: &BatchStatus) -> crate::Result<()> {
        Ok(())
    }
}

/// Runs jobs on at most `max_workers` threads.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    max_workers: usize,
}

impl BatchRunner {
    pub fn new(config: &BatchConfig) -> Self {
        Self::with_max_workers(config.max_workers)
    }

    pub fn with_max_workers(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    /// Process `jobs`, appending to `carried` results from an earlier run.
    ///
    /// Each pool thread builds its own processor with `factory`, so
    /// processors need not be shareable between threads. Per-document
    /// failures and panics become error results; the batch always runs to
    /// the end. A sink failure is logged, retried on the next completion,
    /// and returned at the end.
    pub fn run<F, P, S>(
        &self,
        jobs: Vec<DocumentJob>,
        carried: Vec<DocumentResult>,
        factory: F,
        sink: &mut S,
    ) -> crate::Result<Vec<DocumentResult>>
    where
        F: Fn() -> P + Sync,
        P: DocumentProcessor,
        S: ResultSink + ?Sized,
    {
        let total = carried.len() + jobs.len();
        let workers = self.max_workers.min(jobs.len()).max(1);
        info!(jobs = jobs.len(), carried = carried.len(), workers, "starting batch");

        let mut results = carried;
        let mut sink_error: Option<PricelistError> = None;
        sink.record(&results, &BatchStatus::new(results.len(), total))?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("pricelist-worker-{i}"))
            .build()?;
        let (tx, rx) = channel::<DocumentResult>();
        let factory = &factory;

        pool.in_place_scope(|scope| {
            scope.spawn(move |_| {
                jobs.into_par_iter()
                    .map_init(factory, |processor, job| {
                        debug!(document = %job.filename, "worker picked up document");
                        run_job(processor, &job)
                    })
                    .for_each_with(tx, |tx, result| {
                        // The receiver only goes away once every result is in.
                        let _ = tx.send(result);
                    });
            });

            for result in rx {
                results.push(result);
                let status = BatchStatus::new(results.len(), total);
                match sink.record(&results, &status) {
                    Ok(()) => sink_error = None,
                    Err(e) => {
                        warn!(error = %e, "failed to persist batch results");
                        sink_error = Some(e);
                    }
                }
            }
        });

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(total = results.len(), failed, "batch finished");

        match sink_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

fn run_job<P: DocumentProcessor>(processor: &P, job: &DocumentJob) -> DocumentResult {
    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| processor.process(job)));
    let processing_time = start.elapsed().as_secs_f64();

    let (status, data, error) = match outcome {
        Ok(Ok(items)) => {
            info!(document = %job.filename, items = items.len(), seconds = processing_time, "document extracted");
            (DocumentStatus::Success, items, None)
        }
        Ok(Err(e)) => {
            warn!(document = %job.filename, error = %e, "document failed");
            (DocumentStatus::Error, Vec::new(), Some(e.to_string()))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(document = %job.filename, panic = %message, "document processing panicked");
            (DocumentStatus::Error, Vec::new(), Some(format!("processing panicked: {message}")))
        }
    };

    DocumentResult {
        vendor_name: profile(&job.vendor_code).name.to_string(),
        vendor_code: job.vendor_code.clone(),
        filename: job.filename.clone(),
        status,
        data,
        error,
        processing_time,
        completed_at: Utc::now(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Split jobs against earlier results: successful documents are not redone.
///
/// Returns the jobs still to run and the earlier successes to carry forward.
pub fn resume(jobs: Vec<DocumentJob>, previous: Vec<DocumentResult>) -> (Vec<DocumentJob>, Vec<DocumentResult>) {
    let carried: Vec<DocumentResult> = previous.into_iter().filter(DocumentResult::is_success).collect();
    let done: HashSet<&str> = carried.iter().map(|r| r.filename.as_str()).collect();
    let pending = jobs
        .into_iter()
        .filter(|j| !done.contains(j.filename.as_str()))
        .collect();
    (pending, carried)
}

/// Results and status files in one output directory, rewritten atomically.
#[derive(Debug, Clone)]
pub struct JsonResultStore {
    results_path: PathBuf,
    status_path: PathBuf,
}

impl JsonResultStore {
    pub fn new(dir: &Path, config: &BatchConfig) -> Self {
        Self {
            results_path: dir.join(&config.results_file),
            status_path: dir.join(&config.status_file),
        }
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    /// Results of an earlier run. A missing or unreadable file yields none.
    pub fn load(&self) -> Vec<DocumentResult> {
        let content = match fs::read_to_string(&self.results_path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(results) => results,
            Err(e) => {
                warn!(path = %self.results_path.display(), error = %e, "ignoring unreadable results file");
                Vec::new()
            }
        }
    }
}

impl ResultSink for JsonResultStore {
    fn record(&mut self, results: &[DocumentResult], status: &BatchStatus) -> crate::Result<()> {
        write_json_atomic(&self.results_path, results)?;
        write_json_atomic(&self.status_path, status)?;
        debug!(completed = status.completed, total = status.total, "batch state persisted");
        Ok(())
    }
}

/// Write JSON to a temporary sibling, then rename over the target.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> crate::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
