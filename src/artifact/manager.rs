//! Artifact operations over a repository.
//!
//! The manager ties the resolver, the workspace scanner and the transfer
//! contract together into the user-facing operations. Transfers of
//! distinct files run on a bounded worker pool; the manifest and the
//! `latest` pointer are only written once every transfer has succeeded,
//! so a failed upload can never become resolvable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manifest::{self, Manifest, ManifestEntry};
use super::resolver::{VersionResolver, validate_version};
use super::workspace::{self, WorkspaceFile, collect_files};
use super::{ArtifactError, Result};
use crate::config::DEFAULT_CONCURRENCY;
use crate::repository::{Repository, TransferOptions, repo_path};

// =============================================================================
// Summaries
// =============================================================================

/// Outcome of a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub version: String,
    pub files: usize,
    pub bytes: u64,
    /// True when `force` replaced an existing version.
    pub replaced: bool,
}

/// Outcome of a successful download.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadSummary {
    pub version: String,
    pub files: usize,
    pub bytes: u64,
}

/// One published version, as reported by `versions`.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub files: usize,
    pub bytes: u64,
    /// True for the version the `latest` pointer names.
    pub latest: bool,
}

// =============================================================================
// ArtifactManager
// =============================================================================

/// User-facing artifact operations bound to one repository.
pub struct ArtifactManager {
    repository: Arc<dyn Repository>,
    resolver: VersionResolver,
    concurrency: usize,
}

impl ArtifactManager {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        let resolver = VersionResolver::new(Arc::clone(&repository));
        Self {
            repository,
            resolver,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set the number of concurrent file transfers.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Human-readable location of the underlying repository.
    pub fn location(&self) -> String {
        self.repository.location()
    }

    /// Resolve a reference and return its manifest.
    pub async fn list(&self, reference: &str) -> Result<Manifest> {
        self.resolver.resolve(reference).await
    }

    /// Publish the given local paths as `version`.
    ///
    /// All file transfers complete before the manifest is stored and the
    /// `latest` pointer is advanced. On any transfer failure the version
    /// stays unpublished and `latest` keeps its prior value.
    pub async fn upload(
        &self,
        paths: &[PathBuf],
        version: &str,
        force: bool,
    ) -> Result<UploadSummary> {
        validate_version(version)?;

        let replaced = Manifest::load(self.repository.as_ref(), version)
            .await
            .map_err(|e| e.with_reference(version))?
            .is_some();
        if replaced && !force {
            return Err(ArtifactError::VersionExists(version.to_string()));
        }

        let files = collect_files(paths).await?;
        info!(version, files = files.len(), "uploading");

        let cancel = CancellationToken::new();
        let mut entries: Vec<ManifestEntry> = stream::iter(files.iter().map(|file| {
            let repository = Arc::clone(&self.repository);
            let options = TransferOptions {
                cancel: cancel.clone(),
            };
            let cancel = cancel.clone();
            async move {
                let result = upload_file(repository.as_ref(), version, file, &options).await;
                if result.is_err() {
                    cancel.cancel();
                }
                result
            }
        }))
        .buffer_unordered(self.concurrency)
        .try_collect()
        .await
        .map_err(|e| e.with_reference(version))?;

        // Transfers complete out of order; manifests are stored sorted.
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let manifest = Manifest {
            version: version.to_string(),
            created_at: Utc::now(),
            files: entries,
        };
        manifest
            .store(self.repository.as_ref())
            .await
            .map_err(|e| e.with_reference(version))?;
        manifest::write_latest_ref(self.repository.as_ref(), version)
            .await
            .map_err(|e| e.with_reference(version))?;
        info!(version, "published");

        Ok(UploadSummary {
            version: version.to_string(),
            files: manifest.files.len(),
            bytes: manifest.total_size(),
            replaced,
        })
    }

    /// Fetch every file of a resolved version into `dest`.
    ///
    /// Relative paths are preserved and each file's content digest is
    /// verified against the manifest.
    pub async fn download(&self, reference: &str, dest: &Path) -> Result<DownloadSummary> {
        let manifest = self.resolver.resolve(reference).await?;
        info!(
            version = %manifest.version,
            files = manifest.files.len(),
            "downloading"
        );

        let version = manifest.version.as_str();
        let cancel = CancellationToken::new();
        stream::iter(manifest.files.iter().map(|entry| {
            let repository = Arc::clone(&self.repository);
            let options = TransferOptions {
                cancel: cancel.clone(),
            };
            let cancel = cancel.clone();
            async move {
                let result = download_file(repository.as_ref(), version, entry, dest, &options).await;
                if result.is_err() {
                    cancel.cancel();
                }
                result
            }
        }))
        .buffer_unordered(self.concurrency)
        .try_collect::<Vec<()>>()
        .await
        .map_err(|e| e.with_reference(version))?;

        Ok(DownloadSummary {
            version: manifest.version.clone(),
            files: manifest.files.len(),
            bytes: manifest.total_size(),
        })
    }

    /// Enumerate published versions, newest first.
    pub async fn versions(&self) -> Result<Vec<VersionInfo>> {
        let latest = manifest::read_latest_ref(self.repository.as_ref()).await?;
        let entries = self.repository.list(&manifest::manifests_dir()).await?;

        let names: Vec<String> = entries
            .iter()
            .filter(|info| !info.is_dir)
            .filter_map(|info| info.name.strip_suffix(".json"))
            .map(|name| name.to_string())
            .collect();

        let loaded: Vec<(String, Option<Manifest>)> =
            stream::iter(names.into_iter().map(|name| {
                let repository = Arc::clone(&self.repository);
                async move {
                    match Manifest::load(repository.as_ref(), &name).await {
                        Ok(found) => Ok((name, found)),
                        Err(ArtifactError::Manifest { message, .. }) => {
                            warn!(version = %name, error = %message, "skipping unreadable manifest");
                            Ok((name, None))
                        }
                        Err(e) => Err(e.with_reference(&name)),
                    }
                }
            }))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let mut versions: Vec<VersionInfo> = loaded
            .into_iter()
            .filter_map(|(name, found)| found.map(|manifest| (name, manifest)))
            .map(|(name, manifest)| VersionInfo {
                latest: latest.as_deref() == Some(name.as_str()),
                created_at: manifest.created_at,
                files: manifest.files.len(),
                bytes: manifest.total_size(),
                name,
            })
            .collect();

        versions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(versions)
    }
}

// =============================================================================
// Per-File Transfers
// =============================================================================

async fn upload_file(
    repository: &dyn Repository,
    version: &str,
    file: &WorkspaceFile,
    options: &TransferOptions,
) -> Result<ManifestEntry> {
    let sha256 = workspace::file_digest(&file.local_path).await?;
    let repo_path = manifest::version_file_path(version, &file.path);
    debug!(path = %file.path, size = file.size, "uploading file");
    repository.upload(&file.local_path, &repo_path, options).await?;

    Ok(ManifestEntry {
        path: file.path.clone(),
        size: file.size,
        sha256,
        modified: file.modified,
    })
}

async fn download_file(
    repository: &dyn Repository,
    version: &str,
    entry: &ManifestEntry,
    dest: &Path,
    options: &TransferOptions,
) -> Result<()> {
    let invalid_entry = || ArtifactError::Manifest {
        version: version.to_string(),
        message: format!("invalid entry path '{}'", entry.path),
    };
    let rel = repo_path::normalize(&entry.path).map_err(|_| invalid_entry())?;
    if rel.is_empty() {
        return Err(invalid_entry());
    }

    let local_path = rel
        .split('/')
        .fold(dest.to_path_buf(), |path, segment| path.join(segment));
    let repo_path = manifest::version_file_path(version, &rel);
    debug!(path = %rel, "downloading file");
    repository.download(&repo_path, &local_path, options).await?;

    let actual = workspace::file_digest(&local_path).await?;
    if actual != entry.sha256 {
        return Err(ArtifactError::DigestMismatch {
            path: rel,
            expected: entry.sha256.clone(),
            actual,
        });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
