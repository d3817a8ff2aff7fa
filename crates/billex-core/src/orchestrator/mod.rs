//! Batch orchestration.
//!
//! [`Orchestrator::submit`] records a job and hands the batch to a
//! dispatcher task. The dispatcher drives each job on its own task, running
//! one unit per document under a shared semaphore. Every unit stages its
//! document, extracts it, stores a result and bumps the job counters; a
//! failing or panicking unit only affects its own document.

mod staging;

pub use staging::{staged_name, StagedFile};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{BillexError, ExtractionError, Result};
use crate::extractor::DocumentExtractor;
use crate::models::config::BatchConfig;
use crate::models::job::{ExtractionResult, Job, JobId, ResultStatus};
use crate::store::TaskStore;

/// An uploaded document: original file name and raw bytes.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub data: Vec<u8>,
}

impl Document {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

struct BatchRequest {
    job_id: JobId,
    documents: Vec<Document>,
}

/// Everything a job driver needs; shared by all jobs.
struct Worker {
    store: Arc<dyn TaskStore>,
    extractor: Arc<dyn DocumentExtractor>,
    semaphore: Arc<Semaphore>,
    staging_dir: PathBuf,
}

/// Accepts batches and runs them in the background.
pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    sender: mpsc::UnboundedSender<BatchRequest>,
    poll_interval: Duration,
}

impl Orchestrator {
    /// Create an orchestrator and start its dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        store: Arc<dyn TaskStore>,
        extractor: Arc<dyn DocumentExtractor>,
        config: BatchConfig,
    ) -> Self {
        let worker = Arc::new(Worker {
            store: Arc::clone(&store),
            extractor,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            staging_dir: config.staging_dir,
        });

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(worker, receiver));

        Self {
            store,
            sender,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    /// Record a job for `documents` and queue it; does not wait for extraction.
    pub async fn submit(&self, documents: Vec<Document>) -> Result<JobId> {
        if documents.is_empty() {
            return Err(BillexError::InvalidInput("no documents provided".to_string()));
        }
        let total = u32::try_from(documents.len())
            .map_err(|_| BillexError::InvalidInput("too many documents in one batch".to_string()))?;

        let job = self.store.create_job(total).await?;
        info!("Created job {} with {} documents", job.id, total);

        let request = BatchRequest {
            job_id: job.id.clone(),
            documents,
        };
        if self.sender.send(request).is_err() {
            error!("Dispatcher is not running, failing job {}", job.id);
            self.store
                .fail_job(&job.id, "batch dispatcher is not running")
                .await?;
        }

        Ok(job.id)
    }

    /// Current snapshot of a job.
    pub async fn status(&self, job_id: &str) -> Result<Job> {
        Ok(self.store.get_job(job_id).await?)
    }

    /// Results recorded so far, in completion order.
    pub async fn results(&self, job_id: &str) -> Result<Vec<ExtractionResult>> {
        Ok(self.store.list_results(job_id).await?)
    }

    /// Poll until the job reaches a terminal status.
    pub async fn wait(&self, job_id: &str, poll_interval: Duration) -> Result<Job> {
        loop {
            let job = self.status(job_id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Configured polling interval for [`Orchestrator::wait`].
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

async fn dispatch(worker: Arc<Worker>, mut receiver: mpsc::UnboundedReceiver<BatchRequest>) {
    while let Some(request) = receiver.recv().await {
        let worker = Arc::clone(&worker);
        let span = info_span!("job", job_id = %request.job_id);
        tokio::spawn(async move { worker.run_job(request).await }.instrument(span));
    }
    debug!("Dispatcher stopped");
}

impl Worker {
    async fn run_job(self: Arc<Self>, request: BatchRequest) {
        let job_id = request.job_id.clone();
        if let Err(e) = Arc::clone(&self).drive(request).await {
            error!("Job {} failed: {}", job_id, e);
            if let Err(e) = self.store.fail_job(&job_id, &e.to_string()).await {
                error!("Could not mark job {} as failed: {}", job_id, e);
            }
        }
    }

    async fn drive(self: Arc<Self>, request: BatchRequest) -> Result<()> {
        let job_id = request.job_id;
        self.store.mark_processing(&job_id).await?;

        if let Err(e) = tokio::fs::create_dir_all(&self.staging_dir).await {
            warn!("Could not create staging directory {}: {}", self.staging_dir.display(), e);
        }

        let mut handles = Vec::with_capacity(request.documents.len());
        for (index, document) in request.documents.into_iter().enumerate() {
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|e| ExtractionError::Engine(format!("worker pool closed: {}", e)))?;

            let worker = Arc::clone(&self);
            let id = job_id.clone();
            let filename = document.filename.clone();
            let span = info_span!("unit", filename = %filename, index);
            let handle = tokio::spawn(
                async move {
                    let _permit = permit;
                    worker.run_unit(&id, index, document).await;
                }
                .instrument(span),
            );
            handles.push((filename, handle));
        }

        for (filename, handle) in handles {
            if let Err(e) = handle.await {
                error!("Unit for {} panicked: {}", filename, e);
                let result = ExtractionResult::failed(
                    &job_id,
                    &filename,
                    format!("processing task failed: {}", e),
                );
                self.record(result).await;
            }
        }

        let job = self.store.finalize(&job_id).await?;
        info!(
            "Job {} finished as {}: {} processed, {} failed",
            job.id,
            job.status.as_str(),
            job.processed_count,
            job.failed_count
        );
        Ok(())
    }

    async fn run_unit(&self, job_id: &str, index: usize, document: Document) {
        let filename = document.filename.clone();
        let result = match self.extract_document(job_id, index, document).await {
            Ok(data) => {
                info!("Extracted {}", filename);
                ExtractionResult::completed(job_id, &filename, data)
            }
            Err(e) => {
                error!("Failed to process {}: {}", filename, e);
                ExtractionResult::failed(job_id, &filename, e.to_string())
            }
        };
        self.record(result).await;
    }

    async fn extract_document(
        &self,
        job_id: &str,
        index: usize,
        document: Document,
    ) -> Result<serde_json::Value> {
        let staged = StagedFile::create(
            &self.staging_dir,
            job_id,
            index,
            &document.filename,
            &document.data,
        )
        .await?;

        let mut record = self.extractor.extract(staged.path()).await?;
        record.source_file = Some(document.filename);

        serde_json::to_value(&record)
            .map_err(|e| ExtractionError::Serialization(e.to_string()).into())
    }

    /// Store a result and count it; a result that cannot be stored counts as a failure.
    async fn record(&self, result: ExtractionResult) {
        let job_id = result.job_id.clone();
        let filename = result.filename.clone();
        let mut success = result.status == ResultStatus::Completed;

        if let Err(e) = self.store.add_result(result).await {
            error!("Failed to store result for {}: {}", filename, e);
            if success {
                let fallback = ExtractionResult::failed(&job_id, &filename, e.to_string());
                if let Err(e) = self.store.add_result(fallback).await {
                    error!("Failed to store failure for {}: {}", filename, e);
                }
            }
            success = false;
        }

        if let Err(e) = self.store.record_outcome(&job_id, success).await {
            error!("Failed to update counters of job {}: {}", job_id, e);
        }
    }
}
