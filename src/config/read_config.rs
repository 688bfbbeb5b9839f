//! Configuration file reading and parsing.
//!
//! This module handles locating, reading, and parsing INI-format configuration
//! files, with support for key=value overrides layered on top.

use std::env;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use thiserror::Error;

use super::{Config, RepositoryConfig, S3Settings};

// =============================================================================
// Constants
// =============================================================================

/// Environment variable naming an alternate config file.
pub const ENV_CONFIG_FILE: &str = "AV_CONFIG_FILE";

/// Config file looked up in the user's home directory.
pub const DEFAULT_CONFIG_FILENAME: &str = ".avconfig";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid integer '{value}': {source}")]
    InvalidInteger {
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid override key '{key}': {message}")]
    InvalidOverrideKey { key: String, message: String },

    #[error("missing required field '{field}' in section '{section}'")]
    MissingRequiredField { section: String, field: String },
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// =============================================================================
// ConfigSource
// =============================================================================

/// Specifies how to locate and layer configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    /// Explicit config file path from CLI. If specified and doesn't exist, error.
    /// If None, fall back to AV_CONFIG_FILE env var, then ~/.avconfig.
    pub config_file: Option<PathBuf>,

    /// Individual key=value overrides (applied last).
    /// Keys use dot-notation: "s3.region", "repository.myrepo.url"
    pub overrides: Vec<(String, String)>,
}

// =============================================================================
// Config File Resolution
// =============================================================================

/// Information about how the config file was resolved.
#[derive(Debug)]
pub struct ResolvedConfigFile {
    /// The path to the config file, if one was found.
    pub path: Option<PathBuf>,
    /// Warning message if env var pointed to nonexistent file.
    pub warning: Option<String>,
}

/// Resolve which config file to use based on the ConfigSource and environment.
fn resolve_config_file(source: &ConfigSource) -> Result<ResolvedConfigFile> {
    // If explicit path provided, it must exist
    if let Some(ref path) = source.config_file {
        if path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(path.clone()),
                warning: None,
            });
        } else {
            return Err(ConfigError::FileNotFound(path.clone()));
        }
    }

    // Check environment variable
    if let Ok(env_path) = env::var(ENV_CONFIG_FILE) {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(path),
                warning: None,
            });
        } else {
            // Warn but continue with defaults
            return Ok(ResolvedConfigFile {
                path: None,
                warning: Some(format!(
                    "config file specified by {} does not exist: {}",
                    ENV_CONFIG_FILE, env_path
                )),
            });
        }
    }

    // Check ~/.avconfig
    if let Some(home) = home_dir() {
        let default_path = home.join(DEFAULT_CONFIG_FILENAME);
        if default_path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(default_path),
                warning: None,
            });
        }
    }

    // No config file found
    Ok(ResolvedConfigFile {
        path: None,
        warning: None,
    })
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

// =============================================================================
// INI Parsing
// =============================================================================

/// Parse S3 settings from an INI section.
fn parse_s3_settings(ini: &Ini, section: &str) -> S3Settings {
    S3Settings {
        endpoint_url: ini.get(section, "endpoint_url"),
        region: ini.get(section, "region"),
    }
}

/// Parse a transfer concurrency value. Zero is rejected.
fn parse_concurrency(value: &str) -> Result<usize> {
    let parsed: NonZeroUsize = value.parse().map_err(|e| ConfigError::InvalidInteger {
        value: value.to_string(),
        source: e,
    })?;
    Ok(parsed.get())
}

/// Apply an INI file's contents to a Config, layering on top of existing values.
fn apply_ini_to_config(config: &mut Config, ini: &Ini) -> Result<()> {
    // [repository] section - the default repository spec
    if let Some(url) = ini.get("repository", "url") {
        config.repository = Some(url);
    }

    // [s3] section
    let s3_settings = parse_s3_settings(ini, "s3");
    if s3_settings.endpoint_url.is_some() {
        config.s3.endpoint_url = s3_settings.endpoint_url;
    }
    if s3_settings.region.is_some() {
        config.s3.region = s3_settings.region;
    }

    // [transfer] section
    if let Some(value) = ini.get("transfer", "concurrency") {
        config.transfer.concurrency = parse_concurrency(&value)?;
    }

    // [repository.*] sections
    let sections: Vec<String> = ini.sections();
    for section_name in sections {
        if let Some(repo_name) = section_name.strip_prefix("repository.") {
            let url =
                ini.get(&section_name, "url")
                    .ok_or_else(|| ConfigError::MissingRequiredField {
                        section: section_name.clone(),
                        field: "url".to_string(),
                    })?;

            let repo_config = RepositoryConfig {
                url,
                settings: parse_s3_settings(ini, &section_name),
            };

            config
                .repositories
                .insert(repo_name.to_string(), repo_config);
        }
    }

    Ok(())
}

/// Load and parse an INI file.
fn load_ini(path: &Path) -> Result<Ini> {
    let mut ini = Ini::new();
    ini.load(path).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e,
    })?;
    Ok(ini)
}

// =============================================================================
// Override Application
// =============================================================================

/// Apply a single key=value override to the config.
fn apply_override(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.splitn(3, '.').collect();

    match parts.as_slice() {
        // repository.url - the default repository spec
        ["repository", "url"] => {
            config.repository = Some(value.to_string());
            Ok(())
        }

        // s3.endpoint_url, s3.region
        ["s3", param] => apply_s3_override(config, param, value),

        // transfer.concurrency
        ["transfer", param] => apply_transfer_override(config, param, value),

        // repository.name.param
        ["repository", name, param] => apply_repository_override(config, name, param, value),

        _ => Err(ConfigError::InvalidOverrideKey {
            key: key.to_string(),
            message: "unrecognized key format".to_string(),
        }),
    }
}

fn apply_s3_override(config: &mut Config, param: &str, value: &str) -> Result<()> {
    match param {
        "endpoint_url" => {
            config.s3.endpoint_url = Some(value.to_string());
            Ok(())
        }
        "region" => {
            config.s3.region = Some(value.to_string());
            Ok(())
        }
        _ => Err(ConfigError::InvalidOverrideKey {
            key: format!("s3.{}", param),
            message: "unknown parameter".to_string(),
        }),
    }
}

fn apply_transfer_override(config: &mut Config, param: &str, value: &str) -> Result<()> {
    match param {
        "concurrency" => {
            config.transfer.concurrency = parse_concurrency(value)?;
            Ok(())
        }
        _ => Err(ConfigError::InvalidOverrideKey {
            key: format!("transfer.{}", param),
            message: "unknown parameter".to_string(),
        }),
    }
}

fn apply_repository_override(
    config: &mut Config,
    name: &str,
    param: &str,
    value: &str,
) -> Result<()> {
    let repo = config
        .repositories
        .entry(name.to_string())
        .or_insert_with(|| RepositoryConfig {
            url: String::new(),
            settings: S3Settings::default(),
        });

    match param {
        "url" => {
            repo.url = value.to_string();
            Ok(())
        }
        "endpoint_url" => {
            repo.settings.endpoint_url = Some(value.to_string());
            Ok(())
        }
        "region" => {
            repo.settings.region = Some(value.to_string());
            Ok(())
        }
        _ => Err(ConfigError::InvalidOverrideKey {
            key: format!("repository.{}.{}", name, param),
            message: "unknown parameter".to_string(),
        }),
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

/// Result of reading configuration, including any warnings.
#[derive(Debug)]
pub struct ConfigResult {
    /// The parsed configuration.
    pub config: Config,
    /// Any warnings generated during config loading.
    pub warnings: Vec<String>,
}

/// Read and parse configuration from the specified sources.
///
/// Configuration is layered in this order:
/// 1. Built-in defaults
/// 2. Config file (from CLI, env var, or ~/.avconfig)
/// 3. Individual overrides (applied last)
pub fn read_config(source: &ConfigSource) -> Result<ConfigResult> {
    let mut warnings = Vec::new();

    // Start with defaults
    let mut config = Config::default();

    // Resolve and apply base config file
    let resolved = resolve_config_file(source)?;
    if let Some(warning) = resolved.warning {
        warnings.push(warning);
    }
    if let Some(ref path) = resolved.path {
        let ini = load_ini(path)?;
        apply_ini_to_config(&mut config, &ini)?;
    }

    // Apply individual overrides
    for (key, value) in &source.overrides {
        apply_override(&mut config, key, value)?;
    }

    Ok(ConfigResult { config, warnings })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.repository.is_none());
        assert!(config.repositories.is_empty());
        assert!(config.s3.endpoint_url.is_none());
        assert_eq!(config.transfer.concurrency, 8);
    }

    #[test]
    fn test_parse_concurrency() {
        assert_eq!(parse_concurrency("1").unwrap(), 1);
        assert_eq!(parse_concurrency("32").unwrap(), 32);
        assert!(parse_concurrency("0").is_err());
        assert!(parse_concurrency("-4").is_err());
        assert!(parse_concurrency("many").is_err());
    }

    #[test]
    fn test_apply_override_default_repository() {
        let mut config = Config::default();
        apply_override(&mut config, "repository.url", "s3://bucket/datasets").unwrap();
        assert_eq!(config.repository.as_deref(), Some("s3://bucket/datasets"));
    }

    #[test]
    fn test_apply_override_s3() {
        let mut config = Config::default();
        apply_override(&mut config, "s3.endpoint_url", "http://localhost:9000").unwrap();
        apply_override(&mut config, "s3.region", "us-west-2").unwrap();
        assert_eq!(
            config.s3.endpoint_url,
            Some("http://localhost:9000".to_string())
        );
        assert_eq!(config.s3.region, Some("us-west-2".to_string()));
    }

    #[test]
    fn test_apply_override_transfer() {
        let mut config = Config::default();
        apply_override(&mut config, "transfer.concurrency", "16").unwrap();
        assert_eq!(config.transfer.concurrency, 16);

        assert!(apply_override(&mut config, "transfer.concurrency", "0").is_err());
        assert!(apply_override(&mut config, "transfer.workers", "16").is_err());
    }

    #[test]
    fn test_apply_override_repository() {
        let mut config = Config::default();
        apply_override(&mut config, "repository.myrepo.url", "s3://bucket/prefix").unwrap();
        apply_override(&mut config, "repository.myrepo.region", "us-west-2").unwrap();

        let repo = config.repositories.get("myrepo").unwrap();
        assert_eq!(repo.url, "s3://bucket/prefix");
        assert_eq!(repo.settings.region, Some("us-west-2".to_string()));
    }

    #[test]
    fn test_apply_override_unknown_key() {
        let mut config = Config::default();
        assert!(apply_override(&mut config, "cache.path", "/tmp/x").is_err());
        assert!(apply_override(&mut config, "s3.bucket", "b").is_err());
        assert!(apply_override(&mut config, "repository", "x").is_err());
    }

    #[test]
    fn test_read_config_missing_explicit_file() {
        let source = ConfigSource {
            config_file: Some(PathBuf::from("/nonexistent/av.conf")),
            overrides: Vec::new(),
        };
        let result = read_config(&source);
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_ini_config() {
        let mut ini = Ini::new();
        ini.read(
            r#"
[repository]
url = s3://my-bucket/default

[s3]
endpoint_url = http://localhost:9000
region = us-east-1

[transfer]
concurrency = 4

[repository.main]
url = s3://my-bucket/repo
region = eu-central-1
"#
            .to_string(),
        )
        .unwrap();

        let mut config = Config::default();
        apply_ini_to_config(&mut config, &ini).unwrap();

        assert_eq!(config.repository.as_deref(), Some("s3://my-bucket/default"));
        assert_eq!(
            config.s3.endpoint_url,
            Some("http://localhost:9000".to_string())
        );
        assert_eq!(config.s3.region, Some("us-east-1".to_string()));
        assert_eq!(config.transfer.concurrency, 4);

        let repo = config.repositories.get("main").unwrap();
        assert_eq!(repo.url, "s3://my-bucket/repo");
        assert_eq!(repo.settings.region, Some("eu-central-1".to_string()));
        assert!(repo.settings.endpoint_url.is_none());
    }

    #[test]
    fn test_parse_ini_repository_missing_url() {
        let mut ini = Ini::new();
        ini.read(
            r#"
[repository.broken]
region = us-east-1
"#
            .to_string(),
        )
        .unwrap();

        let mut config = Config::default();
        let result = apply_ini_to_config(&mut config, &ini);
        assert!(matches!(
            result,
            Err(ConfigError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn test_read_config_with_file_and_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("avconfig");
        std::fs::write(
            &path,
            r#"
[s3]
region = us-east-1

[transfer]
concurrency = 4
"#,
        )
        .unwrap();

        let source = ConfigSource {
            config_file: Some(path),
            overrides: vec![("transfer.concurrency".to_string(), "12".to_string())],
        };
        let result = read_config(&source).unwrap();
        assert!(result.warnings.is_empty());
        assert_eq!(result.config.s3.region, Some("us-east-1".to_string()));
        assert_eq!(result.config.transfer.concurrency, 12);
    }
}
