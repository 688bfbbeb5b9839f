//! artvault - A versioned artifact store over pluggable backends.

pub mod artifact;
pub mod cli;
pub mod config;
pub mod repository;

pub use artifact::{ArtifactError, ArtifactManager, Manifest, ManifestEntry, VersionResolver};

pub use repository::{
    FileInfo, LocalRepository, MemoryRepository, Repository, RepositoryError, S3Repository,
    TransferOptions, create_repository,
};
