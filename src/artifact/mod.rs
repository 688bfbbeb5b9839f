//! Versioned artifact management.
//!
//! A repository holds artifact versions under a fixed layout: file
//! content lives at `files/<version>/<path>`, per-version manifests at
//! `.av/manifests/<version>.json` and the `latest` pointer at
//! `.av/refs/latest`. The manager publishes and fetches whole versions,
//! the resolver turns references into manifests and the workspace
//! scanner decides which local files take part in an upload.

mod manager;
mod manifest;
mod resolver;
mod workspace;

pub use manager::{ArtifactManager, DownloadSummary, UploadSummary, VersionInfo};
pub use manifest::{
    FILES_PREFIX, META_PREFIX, Manifest, ManifestEntry, latest_ref_path, manifest_path,
    manifests_dir, read_latest_ref, version_file_path, write_latest_ref,
};
pub use resolver::{REF_LATEST, VersionResolver, validate_version};
pub use workspace::{IGNORE_FILE, WorkspaceFile, collect_files};

use std::path::PathBuf;

use thiserror::Error;

use crate::repository::RepositoryError;

/// Errors from artifact operations.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no versions have been published")]
    NoVersions,

    #[error("version not found: {0}")]
    RefNotFound(String),

    #[error("invalid version name '{version}': {reason}")]
    InvalidVersion {
        version: String,
        reason: &'static str,
    },

    #[error("version already exists: {0}")]
    VersionExists(String),

    #[error("manifest for version '{version}' is invalid: {message}")]
    Manifest { version: String, message: String },

    #[error("digest mismatch for '{path}': expected {expected}, got {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("workspace path {path}: {message}")]
    Workspace { path: PathBuf, message: String },

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("ref '{reference}': {source}")]
    RefRepository {
        reference: String,
        source: RepositoryError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArtifactError {
    /// Attach the ref a repository failure happened under. Other errors
    /// pass through unchanged.
    pub(crate) fn with_reference(self, reference: &str) -> Self {
        match self {
            ArtifactError::Repository(source) => ArtifactError::RefRepository {
                reference: reference.to_string(),
                source,
            },
            other => other,
        }
    }
}

/// Result type for artifact operations.
pub type Result<T> = std::result::Result<T, ArtifactError>;
