//! Temporary on-disk copies of uploaded documents.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// A staged document, removed from disk when dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    /// Write `data` to `<dir>/<job_id>-<index>-<basename>`.
    ///
    /// The guard exists before the write starts, so a partial file is
    /// removed as well.
    pub async fn create(
        dir: &Path,
        job_id: &str,
        index: usize,
        filename: &str,
        data: &[u8],
    ) -> std::io::Result<Self> {
        let staged = Self {
            path: dir.join(staged_name(job_id, index, filename)),
        };
        tokio::fs::write(&staged.path, data).await?;
        debug!("Staged {} at {}", filename, staged.path.display());
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staged file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staged file {}: {}", self.path.display(), e),
        }
    }
}

/// Unique staging name; only the last path component of `filename` is used.
pub fn staged_name(job_id: &str, index: usize, filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("document");
    format!("{}-{}-{}", job_id, index, base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_name() {
        assert_eq!(staged_name("job", 0, "bill.pdf"), "job-0-bill.pdf");
        assert_eq!(staged_name("job", 2, "../../etc/bill.pdf"), "job-2-bill.pdf");
        assert_eq!(staged_name("job", 1, ""), "job-1-document");
    }

    #[tokio::test]
    async fn test_staged_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedFile::create(dir.path(), "job", 0, "bill.txt", b"Amount Due: $1.00")
            .await
            .unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"Amount Due: $1.00");

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_same_name_in_one_batch_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = StagedFile::create(dir.path(), "job", 0, "bill.txt", b"a").await.unwrap();
        let b = StagedFile::create(dir.path(), "job", 1, "bill.txt", b"b").await.unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(std::fs::read(a.path()).unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(StagedFile::create(&missing, "job", 0, "bill.txt", b"x").await.is_err());
    }
}
