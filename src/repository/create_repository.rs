//! Repository creation utilities.
//!
//! This module parses repository specifications and constructs the matching
//! backend. A specification is one of:
//! - `s3://bucket/prefix?endpoint_url=...&region=...`
//! - `file:///path/to/directory`
//! - `memory://` (for experiments and tests)
//! - the name of a repository from the config file
//! - a bare filesystem path

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::{LocalRepository, MemoryRepository, Repository, RepositoryError, S3Config, S3Repository};
use crate::config::{Config, S3Settings};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during repository creation.
#[derive(Debug, Error)]
pub enum CreateRepositoryError {
    /// The repository specification is invalid.
    #[error("invalid repository spec: {0}")]
    InvalidSpec(String),

    /// Repository construction failed.
    #[error("failed to open repository: {0}")]
    OpenError(#[from] RepositoryError),
}

/// Result type for repository creation.
pub type Result<T> = std::result::Result<T, CreateRepositoryError>;

// =============================================================================
// Parsed Repository Specification
// =============================================================================

/// The backend indicated by a repository specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// S3-compatible storage (s3:// URL).
    S3,
    /// Local filesystem (file:// URL or plain path).
    Local,
    /// In-memory storage (memory:// URL).
    Memory,
}

/// A parsed repository specification.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRepoSpec {
    /// The backend to use.
    pub backend_type: BackendType,

    /// For S3: the bucket name. For local: the base path.
    pub location: String,

    /// For S3: optional key prefix within the bucket.
    pub prefix: Option<String>,

    /// Optional endpoint URL (S3 only).
    pub endpoint_url: Option<String>,

    /// Optional region (S3 only).
    pub region: Option<String>,
}

impl ParsedRepoSpec {
    /// Parse a repository specification string.
    ///
    /// Bare strings are first looked up among the named repositories in the
    /// config; anything unconfigured is taken as a local filesystem path.
    pub fn parse(spec: &str, config: Option<&Config>) -> Result<Self> {
        if let Some(config) = config
            && let Some(named) = config.repositories.get(spec)
        {
            return Self::parse_named(spec, named.url.as_str(), &named.settings);
        }
        Self::parse_url(spec)
    }

    /// Parse a specification that must be a URL or a plain path, never a
    /// configured name.
    fn parse_url(spec: &str) -> Result<Self> {
        if spec.starts_with("s3://") {
            return Self::parse_s3_url(spec);
        }
        if spec.starts_with("file://") {
            return Self::parse_file_url(spec);
        }
        if spec == "memory://" {
            return Ok(Self {
                backend_type: BackendType::Memory,
                location: String::new(),
                prefix: None,
                endpoint_url: None,
                region: None,
            });
        }
        if spec.is_empty() {
            return Err(CreateRepositoryError::InvalidSpec(
                "repository spec is empty".to_string(),
            ));
        }
        // A bare path selects the local backend.
        Ok(Self {
            backend_type: BackendType::Local,
            location: spec.to_string(),
            prefix: None,
            endpoint_url: None,
            region: None,
        })
    }

    fn parse_s3_url(url: &str) -> Result<Self> {
        // Format: s3://bucket/prefix?endpoint_url=...&region=...
        let without_scheme = url.strip_prefix("s3://").unwrap_or(url);

        let (path_part, query_part) = match without_scheme.find('?') {
            Some(idx) => (&without_scheme[..idx], Some(&without_scheme[idx + 1..])),
            None => (without_scheme, None),
        };

        let (bucket, prefix) = match path_part.find('/') {
            Some(idx) => {
                let bucket = &path_part[..idx];
                let prefix = path_part[idx + 1..].trim_matches('/');
                (
                    bucket.to_string(),
                    if prefix.is_empty() {
                        None
                    } else {
                        Some(prefix.to_string())
                    },
                )
            }
            None => (path_part.to_string(), None),
        };

        if bucket.is_empty() {
            return Err(CreateRepositoryError::InvalidSpec(
                "S3 URL must include bucket name".to_string(),
            ));
        }

        let params = parse_query_string(query_part.unwrap_or(""));

        Ok(Self {
            backend_type: BackendType::S3,
            location: bucket,
            prefix,
            endpoint_url: params.get("endpoint_url").cloned(),
            region: params.get("region").cloned(),
        })
    }

    fn parse_file_url(url: &str) -> Result<Self> {
        // Format: file:///path/to/directory
        let path = url.strip_prefix("file://").unwrap_or(url).to_string();

        if path.is_empty() {
            return Err(CreateRepositoryError::InvalidSpec(
                "file:// URL must include a path".to_string(),
            ));
        }

        Ok(Self {
            backend_type: BackendType::Local,
            location: path,
            prefix: None,
            endpoint_url: None,
            region: None,
        })
    }

    fn parse_named(name: &str, url: &str, settings: &S3Settings) -> Result<Self> {
        // The config URL must be an actual URL or path, never another name.
        let mut parsed = Self::parse_url(url).map_err(|err| {
            CreateRepositoryError::InvalidSpec(format!("repository {:?}: {}", name, err))
        })?;

        // Settings from the config fill whatever the URL left out.
        if parsed.endpoint_url.is_none() {
            parsed.endpoint_url = settings.endpoint_url.clone();
        }
        if parsed.region.is_none() {
            parsed.region = settings.region.clone();
        }

        Ok(parsed)
    }

    /// Fill any S3 settings the spec left out from the global config.
    pub fn with_default_settings(mut self, settings: &S3Settings) -> Self {
        if self.endpoint_url.is_none() {
            self.endpoint_url = settings.endpoint_url.clone();
        }
        if self.region.is_none() {
            self.region = settings.region.clone();
        }
        self
    }

    /// Human-readable URL for this specification.
    pub fn url(&self) -> String {
        match self.backend_type {
            BackendType::S3 => match &self.prefix {
                Some(prefix) => format!("s3://{}/{}", self.location, prefix),
                None => format!("s3://{}", self.location),
            },
            BackendType::Local => format!("file://{}", self.location),
            BackendType::Memory => "memory://".to_string(),
        }
    }
}

/// Parse a query string into key-value pairs.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        if let Some(idx) = pair.find('=') {
            let key = &pair[..idx];
            let value = &pair[idx + 1..];
            // Basic URL decoding (just handle %20 for spaces)
            let value = value.replace("%20", " ");
            params.insert(key.to_string(), value);
        }
    }

    params
}

// =============================================================================
// Repository Construction
// =============================================================================

/// Create a repository from a specification string.
///
/// The specification is resolved against the config (named repositories,
/// global S3 settings) and the matching backend is constructed.
pub async fn create_repository(spec: &str, config: &Config) -> Result<Arc<dyn Repository>> {
    let parsed = ParsedRepoSpec::parse(spec, Some(config))?.with_default_settings(&config.s3);
    tracing::debug!(url = %parsed.url(), "opening repository");

    match parsed.backend_type {
        BackendType::Local => Ok(Arc::new(LocalRepository::new(&parsed.location))),
        BackendType::Memory => Ok(Arc::new(MemoryRepository::new())),
        BackendType::S3 => {
            let mut s3_config = S3Config::new(&parsed.location);
            if let Some(ref prefix) = parsed.prefix {
                s3_config = s3_config.with_prefix(prefix);
            }
            if let Some(ref endpoint_url) = parsed.endpoint_url {
                s3_config = s3_config.with_endpoint_url(endpoint_url);
            }
            if let Some(ref region) = parsed.region {
                s3_config = s3_config.with_region(region);
            }
            let repository = S3Repository::new(s3_config).await?;
            Ok(Arc::new(repository))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;

    #[test]
    fn test_parse_s3_url_simple() {
        let spec = ParsedRepoSpec::parse("s3://mybucket", None).unwrap();
        assert_eq!(spec.backend_type, BackendType::S3);
        assert_eq!(spec.location, "mybucket");
        assert_eq!(spec.prefix, None);
        assert_eq!(spec.endpoint_url, None);
        assert_eq!(spec.region, None);
    }

    #[test]
    fn test_parse_s3_url_with_prefix() {
        let spec = ParsedRepoSpec::parse("s3://mybucket/path/to/files", None).unwrap();
        assert_eq!(spec.backend_type, BackendType::S3);
        assert_eq!(spec.location, "mybucket");
        assert_eq!(spec.prefix, Some("path/to/files".to_string()));
    }

    #[test]
    fn test_parse_s3_url_with_params() {
        let spec = ParsedRepoSpec::parse(
            "s3://mybucket/prefix?endpoint_url=http://localhost:9000&region=us-west-2",
            None,
        )
        .unwrap();
        assert_eq!(spec.backend_type, BackendType::S3);
        assert_eq!(spec.location, "mybucket");
        assert_eq!(spec.prefix, Some("prefix".to_string()));
        assert_eq!(spec.endpoint_url, Some("http://localhost:9000".to_string()));
        assert_eq!(spec.region, Some("us-west-2".to_string()));
    }

    #[test]
    fn test_parse_file_url() {
        let spec = ParsedRepoSpec::parse("file:///home/user/files", None).unwrap();
        assert_eq!(spec.backend_type, BackendType::Local);
        assert_eq!(spec.location, "/home/user/files");
    }

    #[test]
    fn test_parse_memory_url() {
        let spec = ParsedRepoSpec::parse("memory://", None).unwrap();
        assert_eq!(spec.backend_type, BackendType::Memory);
    }

    #[test]
    fn test_parse_bare_path_is_local() {
        let spec = ParsedRepoSpec::parse("/var/data/artifacts", None).unwrap();
        assert_eq!(spec.backend_type, BackendType::Local);
        assert_eq!(spec.location, "/var/data/artifacts");

        let spec = ParsedRepoSpec::parse("relative/dir", None).unwrap();
        assert_eq!(spec.backend_type, BackendType::Local);
        assert_eq!(spec.location, "relative/dir");
    }

    #[test]
    fn test_parse_named_repository() {
        let mut config = Config::default();
        config.repositories.insert(
            "models".to_string(),
            RepositoryConfig {
                url: "s3://ml-artifacts/models".to_string(),
                settings: S3Settings {
                    endpoint_url: Some("http://localhost:9000".to_string()),
                    region: None,
                },
            },
        );

        let spec = ParsedRepoSpec::parse("models", Some(&config)).unwrap();
        assert_eq!(spec.backend_type, BackendType::S3);
        assert_eq!(spec.location, "ml-artifacts");
        assert_eq!(spec.prefix, Some("models".to_string()));
        assert_eq!(spec.endpoint_url, Some("http://localhost:9000".to_string()));
    }

    #[test]
    fn test_unconfigured_name_falls_back_to_local_path() {
        let config = Config::default();
        let spec = ParsedRepoSpec::parse("models", Some(&config)).unwrap();
        assert_eq!(spec.backend_type, BackendType::Local);
        assert_eq!(spec.location, "models");
    }

    #[test]
    fn test_default_settings_fill_missing_fields_only() {
        let defaults = S3Settings {
            endpoint_url: Some("http://localhost:9000".to_string()),
            region: Some("us-east-1".to_string()),
        };
        let spec = ParsedRepoSpec::parse("s3://bucket?region=eu-central-1", None)
            .unwrap()
            .with_default_settings(&defaults);
        assert_eq!(spec.endpoint_url, Some("http://localhost:9000".to_string()));
        assert_eq!(spec.region, Some("eu-central-1".to_string()));
    }

    #[test]
    fn test_parse_empty_bucket() {
        let result = ParsedRepoSpec::parse("s3://", None);
        assert!(matches!(result, Err(CreateRepositoryError::InvalidSpec(_))));
    }

    #[test]
    fn test_parse_empty_file_path() {
        let result = ParsedRepoSpec::parse("file://", None);
        assert!(matches!(result, Err(CreateRepositoryError::InvalidSpec(_))));
    }

    #[test]
    fn test_parse_empty_spec() {
        let result = ParsedRepoSpec::parse("", None);
        assert!(matches!(result, Err(CreateRepositoryError::InvalidSpec(_))));
    }

    #[test]
    fn test_spec_url_roundtrip() {
        let spec = ParsedRepoSpec::parse("s3://bucket/pre/fix", None).unwrap();
        assert_eq!(spec.url(), "s3://bucket/pre/fix");
        let spec = ParsedRepoSpec::parse("file:///var/data", None).unwrap();
        assert_eq!(spec.url(), "file:///var/data");
    }

    #[tokio::test]
    async fn test_create_local_repository() {
        let temp = tempfile::TempDir::new().unwrap();
        let spec = format!("file://{}", temp.path().display());
        let repository = create_repository(&spec, &Config::default()).await.unwrap();
        assert_eq!(repository.location(), temp.path().display().to_string());
    }

    #[tokio::test]
    async fn test_create_memory_repository() {
        let repository = create_repository("memory://", &Config::default())
            .await
            .unwrap();
        assert_eq!(repository.location(), "memory://");
    }
}
