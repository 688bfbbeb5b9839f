//! Configuration types for artvault.
//!
//! This module defines the structures used to represent application configuration
//! as parsed from an INI-format config file.

use std::collections::HashMap;

/// Default number of concurrent file transfers.
pub const DEFAULT_CONCURRENCY: usize = 8;

// =============================================================================
// S3 Settings (shared between the global section and named repositories)
// =============================================================================

/// S3-specific connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
}

// =============================================================================
// Config Sections
// =============================================================================

/// [repository.{name}] section - named repository configuration.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub url: String,
    pub settings: S3Settings,
}

/// [transfer] section - file transfer tuning.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

// =============================================================================
// Top-Level Config
// =============================================================================

/// Complete application configuration as parsed from config file.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Default repository spec, used when no repository is given on the
    /// command line.
    pub repository: Option<String>,
    pub repositories: HashMap<String, RepositoryConfig>,
    pub s3: S3Settings,
    pub transfer: TransferConfig,
}
