//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or normalizing a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source is not syntactically valid.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown configuration section '{0}'")]
    UnknownSection(String),

    /// A value does not have the structure the section expects.
    #[error("section '{section}': {reason}")]
    Shape { section: String, reason: String },

    /// Generic structure mapping of a section failed.
    #[error("section '{section}': {source}")]
    Decode {
        section: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("pipe '{identity}': unknown attribute '{attribute}'")]
    UnknownAttribute { identity: String, attribute: String },

    #[error("pipe '{identity}': missing attribute '{attribute}'")]
    MissingAttribute {
        identity: String,
        attribute: &'static str,
    },

    #[error("pipe '{identity}': attribute '{attribute}' must not be empty")]
    EmptyAttribute {
        identity: String,
        attribute: &'static str,
    },

    #[error("duplicate pipe alias '{alias}' (declared by '{first}' and '{second}')")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
}

impl ConfigError {
    pub(crate) fn shape(section: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Shape {
            section: section.into(),
            reason: reason.into(),
        }
    }
}
