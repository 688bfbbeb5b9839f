//! Command implementations for the av CLI.

use std::path::PathBuf;

use clap::Args;

use crate::artifact::{ArtifactManager, REF_LATEST};
use crate::cli::{GlobalArgs, Result};

// =============================================================================
// List
// =============================================================================

/// Arguments for the list command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Version reference (defaults to latest).
    pub reference: Option<String>,

    /// Show size and digest columns.
    #[arg(short, long)]
    pub long: bool,
}

impl ListArgs {
    pub async fn run(self, manager: &ArtifactManager, global: &GlobalArgs) -> Result<()> {
        let reference = self.reference.as_deref().unwrap_or(REF_LATEST);
        let manifest = manager.list(reference).await?;

        if global.json {
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        } else if self.long {
            for entry in &manifest.files {
                let digest = entry.sha256.get(..12).unwrap_or(&entry.sha256);
                println!("{:>12}  {}  {}", entry.size, digest, entry.path);
            }
        } else {
            for entry in &manifest.files {
                println!("{}", entry.path);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Upload
// =============================================================================

/// Arguments for the upload command.
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Version to publish as.
    #[arg(long = "ref")]
    pub reference: String,

    /// Replace the version if it already exists.
    #[arg(long)]
    pub force: bool,

    /// Files or directories to upload.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl UploadArgs {
    pub async fn run(self, manager: &ArtifactManager, global: &GlobalArgs) -> Result<()> {
        let summary = manager
            .upload(&self.paths, &self.reference, self.force)
            .await?;

        if global.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            let note = if summary.replaced { " (replaced)" } else { "" };
            println!(
                "Uploaded {} files ({}) as version {}{}",
                summary.files,
                format_size(summary.bytes),
                summary.version,
                note
            );
        }
        Ok(())
    }
}

// =============================================================================
// Download
// =============================================================================

/// Arguments for the download command.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Version reference to fetch.
    #[arg(long = "ref", default_value = REF_LATEST)]
    pub reference: String,

    /// Directory to download into.
    pub dest: PathBuf,
}

impl DownloadArgs {
    pub async fn run(self, manager: &ArtifactManager, global: &GlobalArgs) -> Result<()> {
        let summary = manager.download(&self.reference, &self.dest).await?;

        if global.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!(
                "Downloaded {} files ({}) from version {}",
                summary.files,
                format_size(summary.bytes),
                summary.version
            );
        }
        Ok(())
    }
}

// =============================================================================
// Versions
// =============================================================================

/// Arguments for the versions command.
#[derive(Args, Debug)]
pub struct VersionsArgs {}

impl VersionsArgs {
    pub async fn run(self, manager: &ArtifactManager, global: &GlobalArgs) -> Result<()> {
        let versions = manager.versions().await?;

        if global.json {
            println!("{}", serde_json::to_string_pretty(&versions)?);
            return Ok(());
        }

        if versions.is_empty() {
            println!("No versions published");
            return Ok(());
        }
        for version in &versions {
            let marker = if version.latest { "*" } else { " " };
            println!(
                "{} {:<24} {}  {:>5} files  {:>10}",
                marker,
                version.name,
                version.created_at.format("%Y-%m-%d %H:%M:%S"),
                version.files,
                format_size(version.bytes)
            );
        }
        Ok(())
    }
}

// =============================================================================
// Formatting Helpers
// =============================================================================

/// Format a byte count using binary units.
fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

// =============================================================================
// Tests
// =============================================================================
