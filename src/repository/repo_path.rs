//! Repository path normalization.
//!
//! Every backend accepts `/`-separated paths and normalizes them through
//! [`normalize`] before touching storage, so `/a//b/` and `a/b` name the
//! same object on every backend.

use super::{RepositoryError, Result};

/// Normalize a repository path to its canonical form.
///
/// Leading and trailing separators are dropped, repeated separators are
/// collapsed, and `.` segments are removed. The empty string names the
/// repository root. `..` segments are rejected outright: repository paths
/// can never escape the root.
pub fn normalize(path: &str) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(RepositoryError::InvalidPath {
                    path: path.to_string(),
                    reason: "path escapes the repository root",
                });
            }
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

/// Final segment of a normalized path. The repository root has no name.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}
