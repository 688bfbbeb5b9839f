//! S3 repository.
//!
//! S3Repository stores objects in an S3 bucket, treating keys as paths with
//! `/` as the directory separator. Listings read flat keys and group them
//! client-side through [`listing::list_immediate_children`], so no
//! server-side delimiter handling is involved.

use super::listing::{self, FlatObject};
use super::{FileInfo, Repository, RepositoryError, Result, TransferOptions, repo_path};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for S3Repository.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name.
    pub bucket: String,
    /// Optional key prefix within the bucket.
    pub prefix: Option<String>,
    /// Optional custom endpoint URL (for LocalStack, MinIO, etc.).
    pub endpoint_url: Option<String>,
    /// Optional region override.
    pub region: Option<String>,
}

impl S3Config {
    /// Create a new S3Config with the given bucket name.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            endpoint_url: None,
            region: None,
        }
    }

    /// Set a key prefix within the bucket.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set a custom endpoint URL (for LocalStack, MinIO, etc.).
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Set a region override.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

// =============================================================================
// Key Mapping
// =============================================================================

/// Build the full S3 key for a normalized repository path.
fn object_key(prefix: Option<&str>, rel: &str) -> String {
    match prefix {
        Some(prefix) if !rel.is_empty() => format!("{}/{}", prefix, rel),
        Some(prefix) => prefix.to_string(),
        None => rel.to_string(),
    }
}

/// Key prefix for listing everything below a normalized repository path.
fn list_boundary(prefix: Option<&str>, rel: &str) -> String {
    let full = object_key(prefix, rel);
    if full.is_empty() {
        String::new()
    } else {
        format!("{}/", full)
    }
}

/// Strip the repository's bucket prefix from a listed key, yielding a
/// repository-relative key. Returns None for keys outside the prefix or
/// for the prefix marker itself.
fn strip_repo_prefix<'a>(prefix: Option<&str>, key: &'a str) -> Option<&'a str> {
    match prefix {
        Some(prefix) => key.strip_prefix(prefix)?.strip_prefix('/'),
        None => Some(key),
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    matches!(err, SdkError::ServiceError(e) if e.raw().status().as_u16() == 404)
}

fn map_sdk_error<E: std::fmt::Debug>(err: SdkError<E>) -> RepositoryError {
    RepositoryError::Backend(format!("{:?}", err))
}

fn to_chrono(timestamp: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

// =============================================================================
// S3Repository
// =============================================================================

/// A repository backed by an S3 bucket.
pub struct S3Repository {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Repository {
    /// Create a new S3Repository with the given configuration.
    ///
    /// Uses the standard AWS credential chain (env vars, ~/.aws, IAM roles,
    /// etc.), with region and endpoint overridable through the config.
    pub async fn new(config: S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(RepositoryError::Backend(
                "S3 bucket name is empty".to_string(),
            ));
        }

        let mut aws_config_loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = config.region {
            aws_config_loader =
                aws_config_loader.region(aws_sdk_s3::config::Region::new(region.clone()));
        }

        let aws_config = aws_config_loader.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if let Some(ref endpoint) = config.endpoint_url {
            // Path-style addressing keeps custom endpoints working without
            // per-bucket DNS.
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());
        let prefix = config
            .prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            client,
            bucket: config.bucket,
            prefix,
        })
    }

    fn key_for(&self, rel: &str) -> String {
        object_key(self.prefix.as_deref(), rel)
    }
}

#[async_trait]
impl Repository for S3Repository {
    fn location(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("s3://{}/{}", self.bucket, prefix),
            None => format!("s3://{}", self.bucket),
        }
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

        // Surface unreadable sources as I/O errors before the request.
        fs::metadata(local_path).await?;
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|err| RepositoryError::Backend(err.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key_for(&rel))
            .body(body)
            .send()
            .await
            .map_err(map_sdk_error)?;
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

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key_for(&rel))
            .send()
            .await
            .map_err(|err| {
                if is_not_found(&err) {
                    RepositoryError::NotFound(rel.clone())
                } else {
                    map_sdk_error(err)
                }
            })?;

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(local_path).await?;
        let mut body = response.body;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|err| RepositoryError::Backend(err.to_string()))?
        {
            if options.cancel.is_cancelled() {
                return Err(RepositoryError::Cancelled);
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, repo_path: &str) -> Result<()> {
        let rel = repo_path::normalize(repo_path)?;
        if rel.is_empty() {
            return Ok(());
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key_for(&rel))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn stat(&self, repo_path: &str) -> Result<FileInfo> {
        let rel = repo_path::normalize(repo_path)?;

        if !rel.is_empty() {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(self.key_for(&rel))
                .send()
                .await
            {
                Ok(head) => {
                    return Ok(FileInfo {
                        name: repo_path::base_name(&rel).to_string(),
                        size: head.content_length().unwrap_or_default().max(0) as u64,
                        modified: head.last_modified().and_then(to_chrono),
                        is_dir: false,
                    });
                }
                Err(err) if is_not_found(&err) => {
                    // Fall through to the pseudo-directory probe.
                }
                Err(err) => return Err(map_sdk_error(err)),
            }
        }

        // No object at the key; the path exists as a directory when any key
        // sits below it.
        let boundary = list_boundary(self.prefix.as_deref(), &rel);
        let mut request = self.client.list_objects_v2().bucket(&self.bucket);
        if !boundary.is_empty() {
            request = request.prefix(&boundary);
        }
        let response = request.max_keys(1).send().await.map_err(map_sdk_error)?;
        if rel.is_empty() || !response.contents().is_empty() {
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
        let boundary = list_boundary(self.prefix.as_deref(), &rel);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if !boundary.is_empty() {
                request = request.prefix(&boundary);
            }
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(map_sdk_error)?;

            for obj in response.contents() {
                let Some(key) = obj.key() else {
                    continue;
                };
                let Some(rel_key) = strip_repo_prefix(self.prefix.as_deref(), key) else {
                    continue;
                };
                objects.push(FlatObject {
                    key: rel_key.to_string(),
                    size: obj.size().unwrap_or_default().max(0) as u64,
                    modified: obj.last_modified().and_then(to_chrono),
                });
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(listing::list_immediate_children(&rel, &objects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_mapping() {
        assert_eq!(object_key(None, "a/b"), "a/b");
        assert_eq!(object_key(Some("store"), "a/b"), "store/a/b");
        assert_eq!(object_key(Some("store"), ""), "store");
        assert_eq!(object_key(None, ""), "");
    }

    #[test]
    fn test_list_boundary_ends_with_separator() {
        assert_eq!(list_boundary(None, "dir"), "dir/");
        assert_eq!(list_boundary(Some("store"), "dir"), "store/dir/");
        assert_eq!(list_boundary(Some("store"), ""), "store/");
        assert_eq!(list_boundary(None, ""), "");
    }

    #[test]
    fn test_strip_repo_prefix() {
        assert_eq!(strip_repo_prefix(None, "a/b"), Some("a/b"));
        assert_eq!(strip_repo_prefix(Some("store"), "store/a/b"), Some("a/b"));
        // The prefix marker itself and foreign keys are dropped.
        assert_eq!(strip_repo_prefix(Some("store"), "store"), None);
        assert_eq!(strip_repo_prefix(Some("store"), "storeroom/a"), None);
    }

    #[test]
    fn test_config_builder() {
        let config = S3Config::new("artifacts")
            .with_prefix("team/models")
            .with_endpoint_url("http://localhost:9000")
            .with_region("us-west-2");
        assert_eq!(config.bucket, "artifacts");
        assert_eq!(config.prefix.as_deref(), Some("team/models"));
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.region.as_deref(), Some("us-west-2"));
    }

    #[test]
    fn test_timestamp_conversion() {
        let timestamp = aws_sdk_s3::primitives::DateTime::from_secs(1_700_000_000);
        let converted = to_chrono(&timestamp).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
    }
}
