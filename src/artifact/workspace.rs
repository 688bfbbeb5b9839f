//! Local workspace scanning for uploads.
//!
//! Turns a set of local paths into the flat list of files an upload will
//! transfer. Directories are walked recursively; `.avignore` files are
//! loaded as directories are entered and their rules apply cumulatively,
//! in gitignore syntax.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;

use super::{ArtifactError, Result};

/// Ignore file honored while scanning directories.
pub const IGNORE_FILE: &str = ".avignore";

/// Directories that are always skipped regardless of ignore files.
const ALWAYS_SKIPPED_DIRS: &[&str] = &[".git"];

/// A local file selected for upload.
#[derive(Debug, Clone)]
pub struct WorkspaceFile {
    /// Location on the local filesystem.
    pub local_path: PathBuf,
    /// Slash-separated destination path relative to the version root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, when the filesystem reports one.
    pub modified: Option<DateTime<Utc>>,
}

/// Collect the files to upload from a set of local paths.
///
/// A file argument maps to its base name at the version root. A directory
/// argument maps its contents under the directory's base name; arguments
/// without one (`.`, paths ending in `..`) map contents directly to the
/// root. The result is sorted by destination path and rejects duplicates.
pub async fn collect_files(paths: &[PathBuf]) -> Result<Vec<WorkspaceFile>> {
    let mut files = Vec::new();

    for path in paths {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| ArtifactError::Workspace {
                path: path.clone(),
                message: e.to_string(),
            })?;

        if metadata.is_dir() {
            let prefix = dest_name(path)?.unwrap_or_default();
            let mut matchers = Vec::new();
            scan_directory(path, &prefix, &mut matchers, &mut files).await?;
        } else {
            let name = dest_name(path)?.ok_or_else(|| ArtifactError::Workspace {
                path: path.clone(),
                message: "path has no file name".to_string(),
            })?;
            files.push(WorkspaceFile {
                local_path: path.clone(),
                path: name,
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    for pair in files.windows(2) {
        if pair[0].path == pair[1].path {
            return Err(ArtifactError::Workspace {
                path: pair[1].local_path.clone(),
                message: format!("duplicate destination path '{}'", pair[1].path),
            });
        }
    }

    Ok(files)
}

/// Base name of a local path as a destination segment, if it has one.
fn dest_name(path: &Path) -> Result<Option<String>> {
    match path.file_name() {
        None => Ok(None),
        Some(name) => match name.to_str() {
            Some(name) => Ok(Some(name.to_string())),
            None => Err(ArtifactError::Workspace {
                path: path.to_path_buf(),
                message: "file name is not valid UTF-8".to_string(),
            }),
        },
    }
}

fn join_dest(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Walk one directory level, descending into children in sorted order.
async fn scan_directory(
    dir: &Path,
    dest_prefix: &str,
    matchers: &mut Vec<Option<Gitignore>>,
    out: &mut Vec<WorkspaceFile>,
) -> Result<()> {
    matchers.push(load_ignore_file(dir).await);

    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = match entry.file_name().to_str() {
            Some(name) => name.to_string(),
            None => {
                return Err(ArtifactError::Workspace {
                    path: entry.path(),
                    message: "file name is not valid UTF-8".to_string(),
                });
            }
        };

        let file_type = entry.file_type().await?;
        let is_dir = file_type.is_dir();
        if is_ignored(matchers, &name, is_dir) {
            continue;
        }

        if is_dir {
            let child_prefix = join_dest(dest_prefix, &name);
            Box::pin(scan_directory(&entry.path(), &child_prefix, matchers, out)).await?;
        } else if file_type.is_file() {
            let metadata = entry.metadata().await?;
            out.push(WorkspaceFile {
                local_path: entry.path(),
                path: join_dest(dest_prefix, &name),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping non-regular file");
        }
    }

    matchers.pop();
    Ok(())
}

/// Check a name against the always-skipped set and all active matchers.
fn is_ignored(matchers: &[Option<Gitignore>], name: &str, is_dir: bool) -> bool {
    if is_dir && ALWAYS_SKIPPED_DIRS.contains(&name) {
        return true;
    }

    for matcher in matchers.iter().flatten() {
        let matched = matcher.matched(Path::new(name), is_dir);
        if matched.is_ignore() {
            return true;
        }
        if matched.is_whitelist() {
            return false;
        }
    }

    false
}

/// Load the `.avignore` file of a directory, if present.
async fn load_ignore_file(dir: &Path) -> Option<Gitignore> {
    let contents = match fs::read_to_string(dir.join(IGNORE_FILE)).await {
        Ok(contents) => contents,
        Err(_) => return None,
    };

    let mut builder = GitignoreBuilder::new(dir);
    for line in contents.lines() {
        // GitignoreBuilder::add_line handles comments and blank lines
        let _ = builder.add_line(None, line);
    }
    builder.build().ok()
}

/// Compute the SHA-256 digest of a file as lowercase hexadecimal.
pub(crate) async fn file_digest(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
