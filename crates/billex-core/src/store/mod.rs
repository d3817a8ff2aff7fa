//! Persistence of batch jobs and their per-document results.
//!
//! Every counter change goes through [`TaskStore::record_outcome`], which
//! increments and recomputes the job status in one atomic step, so units
//! finishing concurrently never lose an update.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemoryTaskStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTaskStore;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::StoreError;
use crate::models::config::{StoreBackend, StoreConfig};
use crate::models::job::{ExtractionResult, Job};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Trait for job and result persistence.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a pending job expecting `total_documents` results.
    async fn create_job(&self, total_documents: u32) -> Result<Job>;

    /// Fetch a job snapshot.
    async fn get_job(&self, job_id: &str) -> Result<Job>;

    /// Move a pending job to processing.
    async fn mark_processing(&self, job_id: &str) -> Result<Job>;

    /// Count one finished document and recompute the status atomically.
    ///
    /// Once every document is accounted for further calls change nothing.
    async fn record_outcome(&self, job_id: &str, success: bool) -> Result<Job>;

    /// Settle the final status after every unit has resolved.
    async fn finalize(&self, job_id: &str) -> Result<Job>;

    /// Fail the whole job with a message.
    async fn fail_job(&self, job_id: &str, message: &str) -> Result<Job>;

    /// Append a per-document result.
    async fn add_result(&self, result: ExtractionResult) -> Result<()>;

    /// Results of a job in insertion order.
    async fn list_results(&self, job_id: &str) -> Result<Vec<ExtractionResult>>;
}

/// Status a job settles on when it is finalized.
///
/// Documents that never reported are counted as failures.
pub(crate) fn finalize_job(job: &mut Job) {
    if job.status.is_terminal() {
        return;
    }

    let missing = job.total_documents.saturating_sub(job.finished());
    if missing > 0 {
        job.failed_count += missing;
        job.error_message = Some(format!("{} documents never reported a result", missing));
    }

    job.status = crate::models::job::JobStatus::terminal_for(job.total_documents, job.failed_count);
    job.updated_at = chrono::Utc::now();
}

/// Open the store selected in the configuration.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn TaskStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory task store");
            Ok(Arc::new(InMemoryTaskStore::new()))
        }
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => Ok(Arc::new(SqliteTaskStore::open(&config.database_path)?)),
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => Err(StoreError::Corrupt(
            "SQLite store requires the `sqlite` feature".to_string(),
        )),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::job::{JobStatus, ResultStatus};
    use pretty_assertions::assert_eq;

    /// Behaviour every store must share.
    pub async fn exercise_store(store: Arc<dyn TaskStore>) {
        let job = store.create_job(3).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_documents, 3);

        let job = store.mark_processing(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);

        store
            .add_result(ExtractionResult::completed(&job.id, "a.pdf", serde_json::json!({"late_fee": "5"})))
            .await
            .unwrap();
        store
            .add_result(ExtractionResult::failed(&job.id, "b.pdf", "No text"))
            .await
            .unwrap();

        let snap = store.record_outcome(&job.id, true).await.unwrap();
        assert_eq!((snap.processed_count, snap.failed_count), (1, 0));
        assert_eq!(snap.status, JobStatus::Processing);
        let snap = store.record_outcome(&job.id, false).await.unwrap();
        assert_eq!(snap.status, JobStatus::Processing);
        let snap = store.record_outcome(&job.id, true).await.unwrap();
        assert_eq!((snap.processed_count, snap.failed_count), (2, 1));
        assert_eq!(snap.status, JobStatus::Completed);

        // Counters never exceed the total.
        let snap = store.record_outcome(&job.id, false).await.unwrap();
        assert_eq!((snap.processed_count, snap.failed_count), (2, 1));

        let snap = store.finalize(&job.id).await.unwrap();
        assert_eq!(snap.status, JobStatus::Completed);

        let results = store.list_results(&job.id).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].filename, "a.pdf");
        assert_eq!(results[0].status, ResultStatus::Completed);
        assert_eq!(results[0].extracted_data, Some(serde_json::json!({"late_fee": "5"})));
        assert_eq!(results[1].status, ResultStatus::Failed);
        assert_eq!(results[1].error_message.as_deref(), Some("No text"));
    }

    pub async fn exercise_all_failed(store: Arc<dyn TaskStore>) {
        let job = store.create_job(2).await.unwrap();
        store.record_outcome(&job.id, false).await.unwrap();
        let snap = store.record_outcome(&job.id, false).await.unwrap();
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.failed_count, 2);
    }

    pub async fn exercise_not_found(store: Arc<dyn TaskStore>) {
        assert!(matches!(store.get_job("missing").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.list_results("missing").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.record_outcome("missing", true).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.add_result(ExtractionResult::failed("missing", "x.pdf", "boom")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    pub async fn exercise_concurrent_outcomes(store: Arc<dyn TaskStore>) {
        let job = store.create_job(50).await.unwrap();
        let mut handles = Vec::new();
        for i in 0..60 {
            let store = Arc::clone(&store);
            let id = job.id.clone();
            handles.push(tokio::spawn(async move {
                store.record_outcome(&id, i % 5 != 0).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = store.get_job(&job.id).await.unwrap();
        assert_eq!(snap.finished(), 50);
        assert!(snap.status.is_terminal());
    }

    pub async fn exercise_fail_and_finalize(store: Arc<dyn TaskStore>) {
        let job = store.create_job(2).await.unwrap();
        let snap = store.fail_job(&job.id, "staging directory unavailable").await.unwrap();
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.error_message.as_deref(), Some("staging directory unavailable"));

        let job = store.create_job(3).await.unwrap();
        store.mark_processing(&job.id).await.unwrap();
        store.record_outcome(&job.id, true).await.unwrap();
        let snap = store.finalize(&job.id).await.unwrap();
        assert_eq!((snap.processed_count, snap.failed_count), (1, 2));
        assert_eq!(snap.status, JobStatus::Completed);
        assert!(snap.error_message.is_some());
    }

    #[test]
    fn test_finalize_job_missing_documents() {
        let mut job = Job::new("j", 2);
        finalize_job(&mut job);
        assert_eq!(job.failed_count, 2);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_open_memory_store() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        assert!(open_store(&config).is_ok());
    }
}
