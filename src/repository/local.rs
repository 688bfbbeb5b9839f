//! Local filesystem repository.
//!
//! LocalRepository stores objects as plain files under a root directory.
//! Uploads are staged next to their destination and renamed into place, so
//! a reader never sees a partially written object.

use super::{FileInfo, Repository, RepositoryError, Result, TransferOptions, repo_path};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

/// Counter to make staging file names unique within the process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A repository rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    /// Root path on the filesystem.
    root: PathBuf,
}

impl LocalRepository {
    /// Create a new LocalRepository rooted at the given path.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Convert a normalized repository path to an absolute filesystem path.
    fn to_absolute(&self, repo_path: &str) -> PathBuf {
        let mut absolute = self.root.clone();
        for segment in repo_path.split('/').filter(|s| !s.is_empty()) {
            absolute.push(segment);
        }
        absolute
    }

    /// Staging file name unique across processes sharing the repository.
    fn staging_name() -> String {
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!(".avtmp.{}.{}", std::process::id(), seq)
    }

    fn file_info(name: String, metadata: &std::fs::Metadata) -> FileInfo {
        let is_dir = metadata.is_dir();
        FileInfo {
            name,
            size: if is_dir { 0 } else { metadata.len() },
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            is_dir,
        }
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn upload(
        &self,
        local_path: &Path,
        repo_path: &str,
        options: &TransferOptions,
    ) -> Result<()> {
        let rel = repo_path::normalize(repo_path)?;
        if rel.is_empty() {
            return Err(RepositoryError::InvalidPath {
                path: repo_path.to_string(),
                reason: "cannot upload to the repository root",
            });
        }
        if options.cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let dest = self.to_absolute(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a staging file in the destination directory, then rename
        // so the object appears atomically.
        let staging = dest.with_file_name(Self::staging_name());
        if let Err(err) = fs::copy(local_path, &staging).await {
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }
        if options.cancel.is_cancelled() {
            let _ = fs::remove_file(&staging).await;
            return Err(RepositoryError::Cancelled);
        }
        if let Err(err) = fs::rename(&staging, &dest).await {
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn download(
        &self,
        repo_path: &str,
        local_path: &Path,
        options: &TransferOptions,
    ) -> Result<()> {
        let rel = repo_path::normalize(repo_path)?;
        if options.cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let source = self.to_absolute(&rel);
        match fs::metadata(&source).await {
            // A directory is not an object.
            Ok(metadata) if !metadata.is_file() => {
                return Err(RepositoryError::NotFound(rel));
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(rel));
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&source, local_path).await?;
        Ok(())
    }

    async fn delete(&self, repo_path: &str) -> Result<()> {
        let rel = repo_path::normalize(repo_path)?;
        let target = self.to_absolute(&rel);
        match fs::metadata(&target).await {
            // Only objects are deleted; a directory holds no object itself.
            Ok(metadata) if metadata.is_dir() => return Ok(()),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        }
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn stat(&self, repo_path: &str) -> Result<FileInfo> {
        let rel = repo_path::normalize(repo_path)?;
        let target = self.to_absolute(&rel);
        let metadata = fs::metadata(&target).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                RepositoryError::NotFound(rel.clone())
            } else {
                RepositoryError::Io(err)
            }
        })?;
        Ok(Self::file_info(
            repo_path::base_name(&rel).to_string(),
            &metadata,
        ))
    }

    async fn list(&self, repo_path: &str) -> Result<Vec<FileInfo>> {
        let rel = repo_path::normalize(repo_path)?;
        let dir = self.to_absolute(&rel);
        match fs::metadata(&dir).await {
            Ok(metadata) if !metadata.is_dir() => return Ok(Vec::new()),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        }

        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(Self::file_info(name, &metadata));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
