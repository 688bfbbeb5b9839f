//! Manifest objects and the repository bookkeeping layout.
//!
//! Every published version is described by one manifest stored under
//! `.av/manifests/<version>.json`. The `latest` pointer lives at
//! `.av/refs/latest` as a plain text version name. User files are kept
//! in a per-version area under `files/<version>/`, so bookkeeping and
//! content can never collide.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ArtifactError, Result};
use crate::repository::{Repository, RepositoryError, TransferOptions};

// =============================================================================
// Layout
// =============================================================================

/// Reserved bookkeeping namespace within a repository.
pub const META_PREFIX: &str = ".av";

/// Prefix holding the immutable file area of every version.
pub const FILES_PREFIX: &str = "files";

/// Repository path of the directory holding all manifests.
pub fn manifests_dir() -> String {
    format!("{}/manifests", META_PREFIX)
}

/// Repository path of the manifest for `version`.
pub fn manifest_path(version: &str) -> String {
    format!("{}/manifests/{}.json", META_PREFIX, version)
}

/// Repository path of the `latest` pointer object.
pub fn latest_ref_path() -> String {
    format!("{}/refs/latest", META_PREFIX)
}

/// Repository path of one file within a version's file area.
pub fn version_file_path(version: &str, rel_path: &str) -> String {
    format!("{}/{}/{}", FILES_PREFIX, version, rel_path)
}

// =============================================================================
// Manifest Types
// =============================================================================

/// The set of files belonging to one published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Version name this manifest was published under.
    pub version: String,
    /// Publication time.
    pub created_at: DateTime<Utc>,
    /// Files in the version, sorted by path.
    pub files: Vec<ManifestEntry>,
}

/// One file within a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Slash-separated path relative to the version root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 content digest in lowercase hexadecimal.
    pub sha256: String,
    /// Modification time of the source file, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl Manifest {
    /// Total size in bytes of all files in the manifest.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Load the manifest stored for `version`, or `None` if absent.
    pub async fn load(repository: &dyn Repository, version: &str) -> Result<Option<Manifest>> {
        let bytes = match fetch_bytes(repository, &manifest_path(version)).await {
            Ok(bytes) => bytes,
            Err(ArtifactError::Repository(RepositoryError::NotFound(_))) => return Ok(None),
            Err(e) => return Err(e),
        };
        let manifest =
            serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Manifest {
                version: version.to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(manifest))
    }

    /// Store the manifest under its version name, overwriting any existing one.
    pub async fn store(&self, repository: &dyn Repository) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| ArtifactError::Manifest {
            version: self.version.clone(),
            message: e.to_string(),
        })?;
        store_bytes(repository, &manifest_path(&self.version), &bytes).await
    }
}

// =============================================================================
// Latest Pointer
// =============================================================================

/// Read the `latest` pointer, or `None` if nothing has been published.
pub async fn read_latest_ref(repository: &dyn Repository) -> Result<Option<String>> {
    let bytes = match fetch_bytes(repository, &latest_ref_path()).await {
        Ok(bytes) => bytes,
        Err(ArtifactError::Repository(RepositoryError::NotFound(_))) => return Ok(None),
        Err(e) => return Err(e),
    };
    let name = String::from_utf8_lossy(&bytes).trim().to_string();
    if name.is_empty() {
        return Ok(None);
    }
    Ok(Some(name))
}

/// Point `latest` at the given version. Last writer wins.
pub async fn write_latest_ref(repository: &dyn Repository, version: &str) -> Result<()> {
    store_bytes(repository, &latest_ref_path(), version.as_bytes()).await
}

// =============================================================================
// Staged Byte Transfer
// =============================================================================

// The transfer contract moves whole files, so metadata objects are staged
// through a local temporary directory on both reads and writes.

async fn fetch_bytes(repository: &dyn Repository, repo_path: &str) -> Result<Vec<u8>> {
    let staging = tempfile::tempdir()?;
    let local_path = staging.path().join("object");
    repository
        .download(repo_path, &local_path, &TransferOptions::default())
        .await?;
    let bytes = tokio::fs::read(&local_path).await?;
    Ok(bytes)
}

async fn store_bytes(repository: &dyn Repository, repo_path: &str, bytes: &[u8]) -> Result<()> {
    let staging = tempfile::tempdir()?;
    let local_path = staging.path().join("object");
    tokio::fs::write(&local_path, bytes).await?;
    repository
        .upload(&local_path, repo_path, &TransferOptions::default())
        .await?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;

    fn sample_manifest() -> Manifest {
        Manifest {
            version: "v1.0.0".to_string(),
            created_at: Utc::now(),
            files: vec![
                ManifestEntry {
                    path: "data/train.csv".to_string(),
                    size: 1024,
                    sha256: "a".repeat(64),
                    modified: None,
                },
                ManifestEntry {
                    path: "model.bin".to_string(),
                    size: 4096,
                    sha256: "b".repeat(64),
                    modified: Some(Utc::now()),
                },
            ],
        }
    }

    #[test]
    fn test_layout_paths() {
        assert_eq!(manifests_dir(), ".av/manifests");
        assert_eq!(manifest_path("v1.0.0"), ".av/manifests/v1.0.0.json");
        assert_eq!(latest_ref_path(), ".av/refs/latest");
        assert_eq!(
            version_file_path("v1.0.0", "data/train.csv"),
            "files/v1.0.0/data/train.csv"
        );
    }

    #[test]
    fn test_total_size() {
        assert_eq!(sample_manifest().total_size(), 5120);
    }

    #[tokio::test]
    async fn test_store_and_load_roundtrip() {
        let repository = MemoryRepository::new();
        let manifest = sample_manifest();
        manifest.store(&repository).await.unwrap();

        let loaded = Manifest::load(&repository, "v1.0.0").await.unwrap();
        assert_eq!(loaded, Some(manifest));
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let repository = MemoryRepository::new();
        let loaded = Manifest::load(&repository, "v9").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_manifest_fails() {
        let repository = MemoryRepository::new();
        repository.seed(".av/manifests/v1.json", b"not json").await;

        let result = Manifest::load(&repository, "v1").await;
        assert!(matches!(result, Err(ArtifactError::Manifest { .. })));
    }

    #[tokio::test]
    async fn test_latest_ref_roundtrip() {
        let repository = MemoryRepository::new();
        assert_eq!(read_latest_ref(&repository).await.unwrap(), None);

        write_latest_ref(&repository, "v2.1").await.unwrap();
        assert_eq!(
            read_latest_ref(&repository).await.unwrap(),
            Some("v2.1".to_string())
        );

        write_latest_ref(&repository, "v3.0").await.unwrap();
        assert_eq!(
            read_latest_ref(&repository).await.unwrap(),
            Some("v3.0".to_string())
        );
    }

    #[tokio::test]
    async fn test_latest_ref_trims_whitespace() {
        let repository = MemoryRepository::new();
        repository.seed(".av/refs/latest", b"v1.0\n").await;
        assert_eq!(
            read_latest_ref(&repository).await.unwrap(),
            Some("v1.0".to_string())
        );

        repository.seed(".av/refs/latest", b"  \n").await;
        assert_eq!(read_latest_ref(&repository).await.unwrap(), None);
    }
}
