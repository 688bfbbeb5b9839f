//! In-memory repository.
//!
//! MemoryRepository keeps every object in process memory and lists through
//! the same flat-key grouping as object storage, which makes it a faithful
//! stand-in for S3 in tests.

use super::listing::{self, FlatObject};
use super::{FileInfo, Repository, RepositoryError, Result, TransferOptions, repo_path};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tokio::sync::Mutex;

/// One stored object.
#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// A repository backed by a map of flat keys.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes at a key, bypassing the upload path.
    #[cfg(test)]
    pub(crate) async fn seed(&self, repo_path: &str, data: &[u8]) {
        let mut objects = self.objects.lock().await;
        objects.insert(
            repo_path.to_string(),
            StoredObject {
                data: data.to_vec(),
                modified: Utc::now(),
            },
        );
    }

    /// Raw bytes stored at a key, if any.
    #[cfg(test)]
    pub(crate) async fn contents(&self, repo_path: &str) -> Option<Vec<u8>> {
        let objects = self.objects.lock().await;
        objects.get(repo_path).map(|object| object.data.clone())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn location(&self) -> String {
        "memory://".to_string()
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
        let data = fs::read(local_path).await?;
        let mut objects = self.objects.lock().await;
        objects.insert(
            rel,
            StoredObject {
                data,
                modified: Utc::now(),
            },
        );
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
        let data = {
            let objects = self.objects.lock().await;
            match objects.get(&rel) {
                Some(object) => object.data.clone(),
                None => return Err(RepositoryError::NotFound(rel)),
            }
        };
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(local_path, data).await?;
        Ok(())
    }

    async fn delete(&self, repo_path: &str) -> Result<()> {
        let rel = repo_path::normalize(repo_path)?;
        let mut objects = self.objects.lock().await;
        objects.remove(&rel);
        Ok(())
    }

    async fn stat(&self, repo_path: &str) -> Result<FileInfo> {
        let rel = repo_path::normalize(repo_path)?;
        let objects = self.objects.lock().await;
        if let Some(object) = objects.get(&rel) {
            return Ok(FileInfo {
                name: repo_path::base_name(&rel).to_string(),
                size: object.data.len() as u64,
                modified: Some(object.modified),
                is_dir: false,
            });
        }
        // The root always exists; other paths exist as directories when
        // keys sit below them.
        let boundary = format!("{}/", rel);
        if rel.is_empty() || objects.keys().any(|key| key.starts_with(&boundary)) {
            return Ok(FileInfo {
                name: repo_path::base_name(&rel).to_string(),
                size: 0,
                modified: None,
                is_dir: true,
            });
        }
        Err(RepositoryError::NotFound(rel))
    }

    async fn list(&self, repo_path: &str) -> Result<Vec<FileInfo>> {
        let rel = repo_path::normalize(repo_path)?;
        let objects = self.objects.lock().await;
        let flat: Vec<FlatObject> = objects
            .iter()
            .map(|(key, object)| FlatObject {
                key: key.clone(),
                size: object.data.len() as u64,
                modified: Some(object.modified),
            })
            .collect();
        Ok(listing::list_immediate_children(&rel, &flat))
    }
}
