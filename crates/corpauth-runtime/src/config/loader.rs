//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. System config (`/etc/corpauth/config.toml`)
//! 3. Local config (`--config` path, else `CORPAUTH_CONFIG`)
//! 4. Environment variables (`CORPAUTH_*`)
//!
//! Each layer overrides the previous.

use super::{AuthConfig, ConfigError, CONFIG_PATH_ENV, SYSTEM_CONFIG_PATH};
use corpauth_hook::HandleNotFound;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper macro for parsing boolean environment variables.
macro_rules! parse_env_bool {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Helper macro for string environment variables.
macro_rules! parse_env_string {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = val;
        }
    };
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```ignore
/// use corpauth_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_config_file("/srv/corpauth/config.toml")
///     .skip_env_vars()  // For testing
///     .load()?;
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// System config path (defaults to `/etc/corpauth/config.toml`).
    system_config_path: Option<PathBuf>,

    /// Explicit local config file.
    config_file: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,

    /// Skip system config loading.
    skip_system: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system_config_path: None,
            config_file: None,
            skip_env: false,
            skip_system: false,
        }
    }

    /// Sets a custom system config path.
    #[must_use]
    pub fn with_system_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.system_config_path = Some(path.into());
        self
    }

    /// Sets the local config file, taking precedence over `CORPAUTH_CONFIG`.
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Skips environment variable loading, including `CORPAUTH_CONFIG`.
    ///
    /// Useful for testing with deterministic config.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips system config loading.
    #[must_use]
    pub fn skip_system_config(mut self) -> Self {
        self.skip_system = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any config file exists but cannot be parsed,
    /// an environment variable has an invalid value, or the merged result
    /// fails [`AuthConfig::validate`].
    /// Missing config files are silently ignored.
    pub fn load(&self) -> Result<AuthConfig, ConfigError> {
        let mut config = AuthConfig::default();

        // Layer 1: System config
        if !self.skip_system {
            let system_path = self
                .system_config_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG_PATH));

            if let Some(system_config) = self.load_file(&system_path)? {
                debug!(path = %system_path.display(), "Loaded system config");
                config.merge(&system_config);
            }
        }

        // Layer 2: Local config
        let local_path = self.config_file.clone().or_else(|| {
            if self.skip_env {
                None
            } else {
                std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from)
            }
        });
        if let Some(ref path) = local_path {
            if let Some(local_config) = self.load_file(path)? {
                debug!(path = %path.display(), "Loaded local config");
                config.merge(&local_config);
            } else {
                debug!(path = %path.display(), "Local config not found, skipping");
            }
        }

        // Layer 3: Environment variables
        if !self.skip_env {
            self.apply_env_vars(&mut config)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads a config file, returning None if it doesn't exist.
    fn load_file(&self, path: &Path) -> Result<Option<AuthConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

        let config =
            AuthConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

        Ok(Some(config))
    }

    /// Applies environment variable overrides.
    fn apply_env_vars(&self, config: &mut AuthConfig) -> Result<(), ConfigError> {
        // Boolean environment variables
        parse_env_bool!(config.database.persistent, "CORPAUTH_DB_PERSISTENT");

        // String environment variables
        parse_env_string!(config.database.host, "CORPAUTH_DB_HOST");
        parse_env_string!(config.database.name, "CORPAUTH_DB_NAME");
        parse_env_string!(config.database.user, "CORPAUTH_DB_USER");
        parse_env_string!(config.database.password, "CORPAUTH_DB_PASSWORD");
        parse_env_string!(config.logging.level, "CORPAUTH_LOG_LEVEL");

        if let Ok(val) = std::env::var("CORPAUTH_DB_PORT") {
            config.database.port = val.trim().parse().map_err(|_| {
                ConfigError::invalid_env_var("CORPAUTH_DB_PORT", "expected port number")
            })?;
        }

        if let Ok(val) = std::env::var("CORPAUTH_HANDLE_NOT_FOUND") {
            config.plugins.handle_not_found = val
                .parse::<HandleNotFound>()
                .map_err(|e| ConfigError::invalid_env_var("CORPAUTH_HANDLE_NOT_FOUND", e))?;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off"
/// (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
