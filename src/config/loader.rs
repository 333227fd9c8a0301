//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::error::ConfigError;
use crate::config::normalize::normalize;
use crate::config::schema::HubConfig;

/// Load and normalize configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<HubConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and normalize configuration from an in-memory TOML source.
pub fn parse_config(content: &str) -> Result<HubConfig, ConfigError> {
    let raw: toml::Table = toml::from_str(content)?;
    normalize(&raw)
}
