//! Reference resolution.
//!
//! A reference is either the sentinel `latest`, resolved through the
//! pointer object, or an explicit version name resolved directly to its
//! stored manifest. Resolution never mutates repository state.

use std::sync::Arc;

use super::manifest::{Manifest, read_latest_ref};
use super::{ArtifactError, Result};
use crate::repository::Repository;

/// Sentinel reference naming the most recently published version.
pub const REF_LATEST: &str = "latest";

/// Characters permitted in a version name besides ASCII alphanumerics.
const VERSION_EXTRA_CHARS: &[char] = &['.', '_', '+', '-'];

/// Validate a version name for publishing.
///
/// The sentinel `latest` is never a valid stored version name.
pub fn validate_version(version: &str) -> Result<()> {
    let reject = |reason| {
        Err(ArtifactError::InvalidVersion {
            version: version.to_string(),
            reason,
        })
    };

    if version.is_empty() {
        return reject("must not be empty");
    }
    if version == REF_LATEST {
        return reject("'latest' is reserved");
    }
    if version.starts_with('.') {
        return reject("must not start with '.'");
    }
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || VERSION_EXTRA_CHARS.contains(&c))
    {
        return reject("may only contain letters, digits, '.', '_', '+' and '-'");
    }
    Ok(())
}

/// Resolves references against the manifests stored in a repository.
#[derive(Clone)]
pub struct VersionResolver {
    repository: Arc<dyn Repository>,
}

impl VersionResolver {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Resolve a reference to a concrete version name.
    ///
    /// `latest` is read from the pointer object and fails with `NoVersions`
    /// when nothing has been published. Any other reference names itself.
    pub async fn resolve_version(&self, reference: &str) -> Result<String> {
        if reference == REF_LATEST {
            match read_latest_ref(self.repository.as_ref())
                .await
                .map_err(|e| e.with_reference(REF_LATEST))?
            {
                Some(version) => Ok(version),
                None => Err(ArtifactError::NoVersions),
            }
        } else {
            Ok(reference.to_string())
        }
    }

    /// Resolve a reference to its stored manifest.
    ///
    /// Repository failures are reported with the ref they happened under.
    pub async fn resolve(&self, reference: &str) -> Result<Manifest> {
        let version = self.resolve_version(reference).await?;
        match Manifest::load(self.repository.as_ref(), &version)
            .await
            .map_err(|e| e.with_reference(&version))?
        {
            Some(manifest) => Ok(manifest),
            None => Err(ArtifactError::RefNotFound(version)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::manifest::write_latest_ref;
    use crate::repository::MemoryRepository;
    use chrono::Utc;

    #[test]
    fn test_validate_version_accepts_common_names() {
        validate_version("v1.0.0").unwrap();
        validate_version("2024-06-01").unwrap();
        validate_version("build_7+nightly").unwrap();
        validate_version("1").unwrap();
    }

    #[test]
    fn test_validate_version_rejects_bad_names() {
        assert!(validate_version("").is_err());
        assert!(validate_version("latest").is_err());
        assert!(validate_version(".hidden").is_err());
        assert!(validate_version("..").is_err());
        assert!(validate_version("a/b").is_err());
        assert!(validate_version("v1 beta").is_err());
    }

    #[tokio::test]
    async fn test_resolve_latest_without_publishes_fails() {
        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let resolver = VersionResolver::new(repository);

        let result = resolver.resolve(REF_LATEST).await;
        assert!(matches!(result, Err(ArtifactError::NoVersions)));
    }

    #[tokio::test]
    async fn test_resolve_unknown_version_fails() {
        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let resolver = VersionResolver::new(repository);

        let result = resolver.resolve("v404").await;
        match result {
            Err(ArtifactError::RefNotFound(version)) => assert_eq!(version, "v404"),
            other => panic!("expected RefNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_latest_matches_explicit() {
        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let manifest = Manifest {
            version: "v1.0.0".to_string(),
            created_at: Utc::now(),
            files: Vec::new(),
        };
        manifest.store(repository.as_ref()).await.unwrap();
        write_latest_ref(repository.as_ref(), "v1.0.0").await.unwrap();

        let resolver = VersionResolver::new(repository);
        let by_latest = resolver.resolve(REF_LATEST).await.unwrap();
        let by_name = resolver.resolve("v1.0.0").await.unwrap();
        assert_eq!(by_latest, by_name);
        assert_eq!(
            resolver.resolve_version(REF_LATEST).await.unwrap(),
            "v1.0.0"
        );
    }

    #[tokio::test]
    async fn test_resolve_dangling_latest_pointer() {
        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        write_latest_ref(repository.as_ref(), "gone").await.unwrap();

        let resolver = VersionResolver::new(repository);
        let result = resolver.resolve(REF_LATEST).await;
        assert!(matches!(result, Err(ArtifactError::RefNotFound(v)) if v == "gone"));
    }
}
