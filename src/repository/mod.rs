//! Storage repositories for artifact data.
//!
//! A [`Repository`] stores opaque objects under hierarchical, `/`-separated
//! paths. Backends differ in how they store and list data (real directories
//! on a filesystem, flat keys on object storage), but expose identical
//! semantics through this trait, so nothing above this module knows which
//! backend it is talking to.

pub mod listing;
pub mod repo_path;

mod create_repository;
mod local;
mod memory;
mod s3;

pub use create_repository::{
    BackendType, CreateRepositoryError, ParsedRepoSpec, create_repository,
};
pub use local::LocalRepository;
pub use memory::MemoryRepository;
pub use s3::{S3Config, S3Repository};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Errors that can occur in repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The path does not resolve to a stored object.
    #[error("Path not found: {0}")]
    NotFound(String),

    /// The path is syntactically unusable.
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// A transfer observed its cancellation token and stopped.
    #[error("Transfer cancelled")]
    Cancelled,

    /// I/O error on the local side of a transfer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend failure, with the underlying error text preserved.
    #[error("Backend error: {0}")]
    Backend(String),
}

// =============================================================================
// Entry Types
// =============================================================================

/// Metadata for a stored object or listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Base name of the entry, without any parent path.
    pub name: String,
    /// Size in bytes. Directories report zero.
    pub size: u64,
    /// Last modification time, when the backend records one.
    pub modified: Option<DateTime<Utc>>,
    /// Whether the entry is a directory, real or inferred from deeper keys.
    pub is_dir: bool,
}

/// Options threaded through uploads and downloads.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Cooperative cancellation for in-flight transfers.
    pub cancel: CancellationToken,
}

// =============================================================================
// Repository Trait
// =============================================================================

/// A storage backend holding objects under `/`-separated paths.
///
/// Paths are normalized through [`repo_path::normalize`] before use, so
/// callers see the same path semantics regardless of backend. Listing never
/// invents an error for missing paths: a path with nothing under it lists
/// as empty.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Human-readable location of the repository, for logs and messages.
    fn location(&self) -> String;

    /// Copy a local file to `repo_path`, replacing any existing object.
    ///
    /// The object becomes visible at `repo_path` only once fully written;
    /// a reader never observes a partial object.
    async fn upload(
        &self,
        local_path: &Path,
        repo_path: &str,
        options: &TransferOptions,
    ) -> Result<()>;

    /// Copy the object at `repo_path` to `local_path`, creating parent
    /// directories as needed and replacing any existing file.
    ///
    /// Returns [`RepositoryError::NotFound`] if `repo_path` does not
    /// resolve to an object.
    async fn download(
        &self,
        repo_path: &str,
        local_path: &Path,
        options: &TransferOptions,
    ) -> Result<()>;

    /// Remove the object at `repo_path`.
    ///
    /// Removing a path that holds no object is not an error.
    async fn delete(&self, repo_path: &str) -> Result<()>;

    /// Metadata for the object or directory at `repo_path`.
    async fn stat(&self, repo_path: &str) -> Result<FileInfo>;

    /// Immediate children of the directory at `repo_path`, sorted by name.
    ///
    /// A path with no children, including one that does not exist or one
    /// that names a plain object, yields an empty listing.
    async fn list(&self, repo_path: &str) -> Result<Vec<FileInfo>>;
}
