//! Command-line interface for artvault.

pub mod args;
mod commands;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::artifact::{ArtifactError, ArtifactManager};
use crate::config::{ConfigError, ConfigResult, read_config};
use crate::repository::{CreateRepositoryError, create_repository};

pub use args::GlobalArgs;
pub use commands::{DownloadArgs, ListArgs, UploadArgs, VersionsArgs};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during CLI execution.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Repository creation error.
    #[error("{0}")]
    CreateRepository(#[from] CreateRepositoryError),

    /// Artifact operation error.
    #[error("{0}")]
    Artifact(#[from] ArtifactError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No repository was specified on the command line or in configuration.
    #[error("no repository specified (use --repository or set one in the config file)")]
    NoRepository,
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

// =============================================================================
// CLI Definition
// =============================================================================

/// av - A versioned artifact store.
#[derive(Parser, Debug)]
#[command(name = "av", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the files of a version.
    List(ListArgs),

    /// Publish local files as a new version.
    Upload(UploadArgs),

    /// Fetch a version into a local directory.
    Download(DownloadArgs),

    /// Show published versions.
    Versions(VersionsArgs),
}

impl Command {
    /// Command name used to prefix error output.
    pub fn name(&self) -> &'static str {
        match self {
            Command::List(_) => "list",
            Command::Upload(_) => "upload",
            Command::Download(_) => "download",
            Command::Versions(_) => "versions",
        }
    }
}

// =============================================================================
// CLI Execution
// =============================================================================

impl Cli {
    /// Parse command-line arguments and return the CLI instance.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Run the CLI command.
    ///
    /// Operational failures are printed to standard output prefixed with
    /// the command name and the exit status stays zero. Usage errors never
    /// reach here; clap reports them on standard error with a nonzero exit.
    pub async fn run(self) -> Result<()> {
        init_tracing(self.global.verbose);

        let name = self.command.name();
        if let Err(e) = self.execute().await {
            println!("{} {}", name, e);
        }
        Ok(())
    }

    async fn execute(self) -> Result<()> {
        let Cli { global, command } = self;

        let source = global.to_config_source();
        let ConfigResult { config, warnings } = read_config(&source)?;
        for warning in &warnings {
            warn!("{}", warning);
        }

        let spec = global
            .repository
            .clone()
            .or_else(|| config.repository.clone())
            .ok_or(CliError::NoRepository)?;
        let repository = create_repository(&spec, &config).await?;
        let manager =
            ArtifactManager::new(repository).with_concurrency(config.transfer.concurrency);

        match command {
            Command::List(cmd) => cmd.run(&manager, &global).await,
            Command::Upload(cmd) => cmd.run(&manager, &global).await,
            Command::Download(cmd) => cmd.run(&manager, &global).await,
            Command::Versions(cmd) => cmd.run(&manager, &global).await,
        }
    }
}

/// Main entry point for the CLI.
pub async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.run().await
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the verbosity flag picks the level.
/// Logs go to standard error so command output stays parseable.
fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::PathBuf;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_list_accepts_zero_or_one_reference() {
        let cli = Cli::try_parse_from(["av", "list"]).unwrap();
        assert!(matches!(cli.command, Command::List(ref cmd) if cmd.reference.is_none()));

        let cli = Cli::try_parse_from(["av", "list", "v1"]).unwrap();
        assert!(
            matches!(cli.command, Command::List(ref cmd) if cmd.reference.as_deref() == Some("v1"))
        );

        assert!(Cli::try_parse_from(["av", "list", "v1", "v2"]).is_err());
    }

    #[test]
    fn test_download_defaults_to_latest() {
        let cli = Cli::try_parse_from(["av", "download", "out"]).unwrap();
        match cli.command {
            Command::Download(cmd) => {
                assert_eq!(cmd.reference, "latest");
                assert_eq!(cmd.dest, PathBuf::from("out"));
            }
            _ => panic!("expected download command"),
        }
    }

    #[test]
    fn test_upload_requires_paths() {
        assert!(Cli::try_parse_from(["av", "upload", "--ref", "v1"]).is_err());

        let cli = Cli::try_parse_from(["av", "upload", "--ref", "v1", "--force", "a", "b"]).unwrap();
        match cli.command {
            Command::Upload(cmd) => {
                assert_eq!(cmd.reference, "v1");
                assert!(cmd.force);
                assert_eq!(cmd.paths, vec![PathBuf::from("a"), PathBuf::from("b")]);
            }
            _ => panic!("expected upload command"),
        }
    }

    #[test]
    fn test_command_names() {
        let cli = Cli::try_parse_from(["av", "versions"]).unwrap();
        assert_eq!(cli.command.name(), "versions");
        let cli = Cli::try_parse_from(["av", "list"]).unwrap();
        assert_eq!(cli.command.name(), "list");
    }

    #[test]
    fn test_global_flags_parse() {
        let cli = Cli::try_parse_from([
            "av",
            "list",
            "--repository",
            "s3://bucket/prefix",
            "--config",
            "transfer.concurrency=4",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.global.repository.as_deref(), Some("s3://bucket/prefix"));
        assert_eq!(
            cli.global.config_overrides,
            vec![("transfer.concurrency".to_string(), "4".to_string())]
        );
        assert_eq!(cli.global.verbose, 2);
        assert!(!cli.global.json);
    }
}
