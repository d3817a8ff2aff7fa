//! In-process task store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::{finalize_job, Result, TaskStore};
use crate::error::StoreError;
use crate::models::job::{ExtractionResult, Job, JobStatus};

#[derive(Debug)]
struct JobEntry {
    job: Job,
    results: Vec<ExtractionResult>,
}

/// Task store kept in a mutex-guarded map; contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on a job entry while holding the lock.
    fn with_entry<F, T>(&self, job_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut JobEntry) -> T,
    {
        let mut jobs = self.jobs.lock().map_err(|_| StoreError::LockPoisoned)?;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        Ok(f(entry))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_job(&self, total_documents: u32) -> Result<Job> {
        let job = Job::new(Uuid::new_v4().to_string(), total_documents);
        let mut jobs = self.jobs.lock().map_err(|_| StoreError::LockPoisoned)?;
        jobs.insert(
            job.id.clone(),
            JobEntry {
                job: job.clone(),
                results: Vec::new(),
            },
        );
        debug!("Created job {} for {} documents", job.id, total_documents);
        Ok(job)
    }

    async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.with_entry(job_id, |entry| entry.job.clone())
    }

    async fn mark_processing(&self, job_id: &str) -> Result<Job> {
        self.with_entry(job_id, |entry| {
            if entry.job.status == JobStatus::Pending {
                entry.job.status = JobStatus::Processing;
                entry.job.updated_at = Utc::now();
            }
            entry.job.clone()
        })
    }

    async fn record_outcome(&self, job_id: &str, success: bool) -> Result<Job> {
        self.with_entry(job_id, |entry| {
            if !entry.job.record_outcome(success) {
                debug!("Ignoring extra outcome for finished job {}", job_id);
            }
            entry.job.clone()
        })
    }

    async fn finalize(&self, job_id: &str) -> Result<Job> {
        self.with_entry(job_id, |entry| {
            finalize_job(&mut entry.job);
            entry.job.clone()
        })
    }

    async fn fail_job(&self, job_id: &str, message: &str) -> Result<Job> {
        self.with_entry(job_id, |entry| {
            entry.job.status = JobStatus::Failed;
            entry.job.error_message = Some(message.to_string());
            entry.job.updated_at = Utc::now();
            entry.job.clone()
        })
    }

    async fn add_result(&self, result: ExtractionResult) -> Result<()> {
        let job_id = result.job_id.clone();
        self.with_entry(&job_id, move |entry| entry.results.push(result))
    }

    async fn list_results(&self, job_id: &str) -> Result<Vec<ExtractionResult>> {
        self.with_entry(job_id, |entry| entry.results.clone())
    }
}
