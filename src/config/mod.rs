//! Configuration module.

mod read_config;
mod types;

pub use read_config::{
    ConfigError, ConfigResult, ConfigSource, DEFAULT_CONFIG_FILENAME, ENV_CONFIG_FILE, read_config,
};
pub use types::{Config, DEFAULT_CONCURRENCY, RepositoryConfig, S3Settings, TransferConfig};
