//! SQLite task store.
//!
//! A single rusqlite connection behind a `Mutex`; calls run on the blocking
//! pool. Counter updates are single `UPDATE` statements, so they are atomic
//! even without the mutex.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{finalize_job, Result, TaskStore};
use crate::error::StoreError;
use crate::models::job::{ExtractionResult, Job, JobStatus, ResultStatus};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_tasks_table",
        sql: include_str!("sql/001_create_tasks.sql"),
    },
    Migration {
        version: 2,
        description: "create_extraction_results_table",
        sql: include_str!("sql/002_create_extraction_results.sql"),
    },
];

/// Runs all pending migrations on the given connection.
fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        info!("Running migration v{}: {}", migration.version, migration.description);

        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

/// A raw row of the `tasks` table.
struct TaskRow {
    id: String,
    status: String,
    total_files: u32,
    processed_files: u32,
    failed_files: u32,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            total_files: row.get("total_files")?,
            processed_files: row.get("processed_files")?,
            failed_files: row.get("failed_files")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_job(self) -> Result<Job> {
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown task status {:?}", self.status)))?;
        Ok(Job {
            id: self.id,
            status,
            total_documents: self.total_files,
            processed_count: self.processed_files,
            failed_count: self.failed_files,
            error_message: self.error_message,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// A raw row of the `extraction_results` table.
struct ResultRow {
    task_id: String,
    filename: String,
    status: String,
    error_message: Option<String>,
    extracted_data: Option<String>,
    created_at: String,
}

impl ResultRow {
    fn from_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            task_id: row.get("task_id")?,
            filename: row.get("filename")?,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
            extracted_data: row.get("extracted_data")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_result(self) -> Result<ExtractionResult> {
        let status = ResultStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown result status {:?}", self.status)))?;
        let extracted_data = self
            .extracted_data
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("extracted_data: {}", e)))?;

        Ok(ExtractionResult {
            job_id: self.task_id,
            filename: self.filename,
            status,
            extracted_data,
            error_message: self.error_message,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {:?}: {}", s, e)))
}

fn fetch_job(conn: &Connection, job_id: &str) -> Result<Job> {
    conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![job_id], TaskRow::from_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?
        .into_job()
}

fn write_job(conn: &Connection, job: &Job) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET status = ?2, processed_files = ?3, failed_files = ?4,
         error_message = ?5, updated_at = ?6 WHERE id = ?1",
        params![
            job.id,
            job.status.as_str(),
            job.processed_count,
            job.failed_count,
            job.error_message,
            job.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Task store persisted in a SQLite database.
#[derive(Clone)]
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;

        info!("Task database opened at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database. Runs all migrations.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with the locked connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_job(&self, total_documents: u32) -> Result<Job> {
        let job = Job::new(Uuid::new_v4().to_string(), total_documents);
        let row = job.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, status, total_files, processed_files, failed_files,
                 error_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, 0, NULL, ?4, ?5)",
                params![
                    row.id,
                    row.status.as_str(),
                    row.total_documents,
                    row.created_at.to_rfc3339(),
                    row.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;

        debug!("Created job {} for {} documents", job.id, total_documents);
        Ok(job)
    }

    async fn get_job(&self, job_id: &str) -> Result<Job> {
        let job_id = job_id.to_string();
        self.with_conn(move |conn| fetch_job(conn, &job_id)).await
    }

    async fn mark_processing(&self, job_id: &str) -> Result<Job> {
        let job_id = job_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE tasks SET status = 'processing', updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![job_id, Utc::now().to_rfc3339()],
            )?;
            fetch_job(conn, &job_id)
        })
        .await
    }

    async fn record_outcome(&self, job_id: &str, success: bool) -> Result<Job> {
        let job_id = job_id.to_string();
        let (ok, failed) = if success { (1u32, 0u32) } else { (0, 1) };
        self.with_conn(move |conn| {
            // Right-hand sides see the row before the update.
            let changed = conn.execute(
                "UPDATE tasks SET
                    processed_files = processed_files + ?2,
                    failed_files = failed_files + ?3,
                    status = CASE
                        WHEN processed_files + failed_files + 1 < total_files THEN 'processing'
                        WHEN failed_files + ?3 >= total_files THEN 'failed'
                        ELSE 'completed'
                    END,
                    updated_at = ?4
                 WHERE id = ?1 AND processed_files + failed_files < total_files",
                params![job_id, ok, failed, Utc::now().to_rfc3339()],
            )?;
            if changed == 0 {
                debug!("No counter change for job {}", job_id);
            }
            fetch_job(conn, &job_id)
        })
        .await
    }

    async fn finalize(&self, job_id: &str) -> Result<Job> {
        let job_id = job_id.to_string();
        self.with_conn(move |conn| {
            let mut job = fetch_job(conn, &job_id)?;
            if !job.status.is_terminal() {
                finalize_job(&mut job);
                write_job(conn, &job)?;
            }
            Ok(job)
        })
        .await
    }

    async fn fail_job(&self, job_id: &str, message: &str) -> Result<Job> {
        let job_id = job_id.to_string();
        let message = message.to_string();
        self.with_conn(move |conn| {
            let mut job = fetch_job(conn, &job_id)?;
            job.status = JobStatus::Failed;
            job.error_message = Some(message);
            job.updated_at = Utc::now();
            write_job(conn, &job)?;
            Ok(job)
        })
        .await
    }

    async fn add_result(&self, result: ExtractionResult) -> Result<()> {
        let data = result
            .extracted_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("extracted_data: {}", e)))?;

        self.with_conn(move |conn| {
            fetch_job(conn, &result.job_id)?;
            conn.execute(
                "INSERT INTO extraction_results (task_id, filename, status, error_message,
                 extracted_data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    result.job_id,
                    result.filename,
                    result.status.as_str(),
                    result.error_message,
                    data,
                    result.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_results(&self, job_id: &str) -> Result<Vec<ExtractionResult>> {
        let job_id = job_id.to_string();
        self.with_conn(move |conn| {
            fetch_job(conn, &job_id)?;
            let mut stmt =
                conn.prepare("SELECT * FROM extraction_results WHERE task_id = ?1 ORDER BY id")?;
            let rows = stmt
                .query_map(params![job_id], ResultRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ResultRow::into_result).collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::*;

    fn store() -> Arc<dyn TaskStore> {
        Arc::new(SqliteTaskStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_migrations_recorded() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let conn = store.conn.lock().unwrap();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, MIGRATIONS.len());

        // Re-running is a no-op.
        run_migrations(&conn).unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_store_lifecycle() {
        exercise_store(store()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_all_failed() {
        exercise_all_failed(store()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_not_found() {
        exercise_not_found(store()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sqlite_store_concurrent_outcomes() {
        exercise_concurrent_outcomes(store()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_fail_and_finalize() {
        exercise_fail_and_finalize(store()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("extraction.db");

        let job_id = {
            let store = SqliteTaskStore::open(&path).unwrap();
            let job = store.create_job(1).await.unwrap();
            store
                .add_result(ExtractionResult::completed(&job.id, "a.pdf", serde_json::json!({})))
                .await
                .unwrap();
            store.record_outcome(&job.id, true).await.unwrap();
            job.id
        };

        let store = SqliteTaskStore::open(&path).unwrap();
        let job = store.get_job(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(store.list_results(&job_id).await.unwrap().len(), 1);
    }
}
