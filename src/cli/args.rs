//! Command-line argument definitions and helpers.

use std::path::PathBuf;

use clap::{ArgAction, Args};

use crate::config::ConfigSource;

// =============================================================================
// Global Arguments
// =============================================================================

/// Global arguments that apply to all commands.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Repository specification (URL or named repository).
    #[arg(short = 'r', long = "repository", global = true)]
    pub repository: Option<String>,

    /// Path to the configuration file.
    #[arg(long = "config-file", global = true)]
    pub config_file: Option<PathBuf>,

    /// Configuration overrides in the form name=value.
    #[arg(long = "config", value_parser = parse_config_override, global = true)]
    pub config_overrides: Vec<(String, String)>,

    /// Format output as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl GlobalArgs {
    /// Convert to a ConfigSource for reading configuration.
    pub fn to_config_source(&self) -> ConfigSource {
        ConfigSource {
            config_file: self.config_file.clone(),
            overrides: self.config_overrides.clone(),
        }
    }
}

/// Parse a config override from "name=value" format.
fn parse_config_override(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid config override '{}': expected name=value", s))?;
    Ok((name.to_string(), value.to_string()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_override() {
        assert_eq!(
            parse_config_override("s3.region=us-east-1").unwrap(),
            ("s3.region".to_string(), "us-east-1".to_string())
        );
        assert_eq!(
            parse_config_override("transfer.concurrency=4").unwrap(),
            ("transfer.concurrency".to_string(), "4".to_string())
        );
        assert!(parse_config_override("no-equals-sign").is_err());
    }

    #[test]
    fn test_to_config_source() {
        let args = GlobalArgs {
            config_file: Some(PathBuf::from("/tmp/avconfig")),
            config_overrides: vec![("repository.url".to_string(), "/data/repo".to_string())],
            ..Default::default()
        };
        let source = args.to_config_source();
        assert_eq!(source.config_file, Some(PathBuf::from("/tmp/avconfig")));
        assert_eq!(source.overrides.len(), 1);
    }
}
