//! Batch job and per-document result models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque job identifier.
pub type JobId = String;

/// Lifecycle state of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, no document has started yet.
    Pending,
    /// At least one document is still outstanding.
    Processing,
    /// Every document finished and at least one succeeded.
    Completed,
    /// Every document failed, or the job itself could not run.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Whether the job can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Terminal status for a finished job with the given failure count.
    pub fn terminal_for(total: u32, failed: u32) -> Self {
        if failed >= total {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        }
    }
}

/// Snapshot of a batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub total_documents: u32,
    /// Documents extracted successfully.
    pub processed_count: u32,
    pub failed_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(id: impl Into<JobId>, total_documents: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            total_documents,
            processed_count: 0,
            failed_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of documents that have finished, successfully or not.
    pub fn finished(&self) -> u32 {
        self.processed_count + self.failed_count
    }

    /// Whether every document has been accounted for.
    pub fn is_done(&self) -> bool {
        self.finished() >= self.total_documents
    }

    /// Count one finished document and recompute the status.
    ///
    /// Returns `false` without changing anything once all documents are
    /// already accounted for.
    pub fn record_outcome(&mut self, success: bool) -> bool {
        if self.is_done() {
            return false;
        }

        if success {
            self.processed_count += 1;
        } else {
            self.failed_count += 1;
        }

        self.status = if self.is_done() {
            JobStatus::terminal_for(self.total_documents, self.failed_count)
        } else {
            JobStatus::Processing
        };
        self.updated_at = Utc::now();
        true
    }
}

/// Outcome of a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Completed => "completed",
            ResultStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(ResultStatus::Completed),
            "failed" => Some(ResultStatus::Failed),
            _ => None,
        }
    }
}

/// Stored result of extracting one document of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub job_id: JobId,
    pub filename: String,
    pub status: ResultStatus,
    /// JSON form of the extracted bill, present iff completed.
    pub extracted_data: Option<serde_json::Value>,
    /// Failure description, present iff failed.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn completed(job_id: impl Into<JobId>, filename: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            status: ResultStatus::Completed,
            extracted_data: Some(data),
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(job_id: impl Into<JobId>, filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            status: ResultStatus::Failed,
            extracted_data: None,
            error_message: Some(error.into()),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcome_transitions() {
        let mut job = Job::new("job-1", 3);
        assert_eq!(job.status, JobStatus::Pending);

        assert!(job.record_outcome(true));
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.record_outcome(false));
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.record_outcome(true));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!((job.processed_count, job.failed_count), (2, 1));

        // Never exceeds the total.
        assert!(!job.record_outcome(true));
        assert_eq!(job.finished(), 3);
    }

    #[test]
    fn test_all_failed_is_failed() {
        let mut job = Job::new("job-2", 2);
        job.record_outcome(false);
        job.record_outcome(false);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_terminal_for() {
        assert_eq!(JobStatus::terminal_for(3, 0), JobStatus::Completed);
        assert_eq!(JobStatus::terminal_for(3, 2), JobStatus::Completed);
        assert_eq!(JobStatus::terminal_for(3, 3), JobStatus::Failed);
        assert_eq!(JobStatus::terminal_for(0, 0), JobStatus::Failed);
    }

    #[test]
    fn test_status_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::String(status.as_str().to_string())
            );
        }
    }
}
