//! Errors raised while assembling an [`AuthConfig`](super::AuthConfig).
//!
//! Every variant names the layer that produced it: a file, a
//! `CORPAUTH_*` variable, or a key of the merged result.

use corpauth_types::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("cannot read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid TOML for [`AuthConfig`](super::AuthConfig).
    #[error("invalid config file '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The effective config could not be rendered back to TOML.
    #[error("cannot render config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A `CORPAUTH_*` variable holds a value of the wrong shape.
    #[error("environment variable {name}: {message}")]
    InvalidEnvVar { name: String, message: String },

    /// The merged config holds a value no service can start with.
    #[error("config key {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

impl ConfigError {
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_value(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            message: message.into(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::ReadFile { .. } => "CONFIG_READ_FILE",
            Self::ParseToml { .. } => "CONFIG_PARSE_TOML",
            Self::Serialize(_) => "CONFIG_SERIALIZE",
            Self::InvalidEnvVar { .. } => "CONFIG_INVALID_ENV_VAR",
            Self::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
        }
    }

    // A bad config stays bad until an operator edits it.
    fn is_recoverable(&self) -> bool {
        false
    }
}
