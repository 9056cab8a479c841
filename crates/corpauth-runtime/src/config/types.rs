//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use super::ConfigError;
use corpauth_hook::HandleNotFound;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure.
///
/// This is the unified configuration after merging all layers.
///
/// # Example
///
/// ```
/// use corpauth_runtime::config::AuthConfig;
///
/// let config = AuthConfig::default();
/// assert_eq!(config.database.port, 5432);
/// assert_eq!(config.plugins.enabled, ["shibauth", "logger"]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Authorization database connection.
    pub database: DbConfig,

    /// Process logging.
    pub logging: LoggingConfig,

    /// Plugin selection and options.
    pub plugins: PluginsConfig,
}

impl AuthConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes to TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they
    /// differ from the default.
    pub fn merge(&mut self, other: &Self) {
        self.database.merge(&other.database);
        self.logging.merge(&other.logging);
        self.plugins.merge(&other.plugins);
    }

    /// Rejects values the service cannot start with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("database.host", "must not be empty"));
        }
        if self.database.port == 0 {
            return Err(ConfigError::invalid_value("database.port", "must not be 0"));
        }
        if self.database.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "database.connect_timeout_secs",
                "must be at least 1",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }
        if let Some(blank) = self.plugins.enabled.iter().position(|n| n.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                "plugins.enabled",
                format!("entry {blank} is empty"),
            ));
        }
        Ok(())
    }

    /// Copy with the database password masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.database.password.is_empty() {
            copy.database.password = "********".into();
        }
        for options in copy.plugins.options.values_mut() {
            if let Some(pw) = options.get_mut("password") {
                *pw = toml::Value::String("********".into());
            }
        }
        copy
    }
}

/// Authorization database connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DbConfig {
    /// Server host name or socket directory.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Database name.
    pub name: String,

    /// User name.
    pub user: String,

    /// Password. Empty means no password.
    pub password: String,

    /// Keep the connection open between queries.
    pub persistent: bool,

    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            name: "korp_auth".into(),
            user: "korp".into(),
            password: String::new(),
            persistent: true,
            connect_timeout_secs: 10,
        }
    }
}

impl DbConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.host != default.host {
            self.host = other.host.clone();
        }
        if other.port != default.port {
            self.port = other.port;
        }
        if other.name != default.name {
            self.name = other.name.clone();
        }
        if other.user != default.user {
            self.user = other.user.clone();
        }
        if other.password != default.password {
            self.password = other.password.clone();
        }
        if other.persistent != default.persistent {
            self.persistent = other.persistent;
        }
        if other.connect_timeout_secs != default.connect_timeout_secs {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
    }
}

/// Process logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive (e.g. `"info"`, `"corpauth=debug"`).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl LoggingConfig {
    fn merge(&mut self, other: &Self) {
        if other.level != Self::default().level {
            self.level = other.level.clone();
        }
    }
}

/// Plugin selection and per-plugin options.
///
/// ```toml
/// [plugins]
/// enabled = ["shibauth", "logger", "protected_corpora_db"]
/// handle_not_found = "warn"
///
/// [plugins.options.protected_corpora_db]
/// licence_table = "auth_license"
/// persistent = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginsConfig {
    /// Builtin plugins to register, in dispatch order.
    pub enabled: Vec<String>,

    /// Policy for option keys a plugin does not declare.
    pub handle_not_found: HandleNotFound,

    /// Option overrides keyed by plugin name.
    pub options: BTreeMap<String, toml::Table>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["shibauth".into(), "logger".into()],
            handle_not_found: HandleNotFound::default(),
            options: BTreeMap::new(),
        }
    }
}

impl PluginsConfig {
    /// Option overrides for `plugin`, if any.
    #[must_use]
    pub fn options_for(&self, plugin: &str) -> Option<&toml::Table> {
        self.options.get(plugin)
    }

    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.enabled != default.enabled {
            self.enabled = other.enabled.clone();
        }
        if other.handle_not_found != default.handle_not_found {
            self.handle_not_found = other.handle_not_found;
        }
        for (plugin, table) in &other.options {
            let entry = self.options.entry(plugin.clone()).or_default();
            for (key, value) in table {
                entry.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AuthConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_port_rejected() {
        let mut config = AuthConfig::default();
        config.database.port = 0;
        let err = config.validate().expect_err("port 0");
        assert!(matches!(err, ConfigError::InvalidValue { key: "database.port", .. }));
    }

    #[test]
    fn blank_plugin_name_rejected() {
        let mut config = AuthConfig::default();
        config.plugins.enabled.push("  ".into());
        let err = config.validate().expect_err("blank name");
        assert!(err.to_string().contains("entry 2 is empty"));
    }

    #[test]
    fn default_config_roundtrip() {
        let config = AuthConfig::default();
        let toml = config.to_toml().expect("serialize");
        let back = AuthConfig::from_toml(&toml).expect("deserialize");
        assert_eq!(config, back);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = AuthConfig::from_toml(
            r#"
[database]
host = "db.example.org"

[plugins.options.logger]
level = "debug"
"#,
        )
        .expect("parse");
        assert_eq!(config.database.host, "db.example.org");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.plugins.enabled, ["shibauth", "logger"]);
        let logger = config.plugins.options_for("logger").expect("logger options");
        assert_eq!(logger.get("level").and_then(|v| v.as_str()), Some("debug"));
    }

    #[test]
    fn handle_not_found_parses_lowercase() {
        let config = AuthConfig::from_toml("[plugins]\nhandle_not_found = \"error\"\n")
            .expect("parse");
        assert_eq!(config.plugins.handle_not_found, HandleNotFound::Error);
        assert!(AuthConfig::from_toml("[plugins]\nhandle_not_found = \"panic\"\n").is_err());
    }

    #[test]
    fn merge_overrides_non_defaults_only() {
        let mut base = AuthConfig::default();
        base.database.host = "base-host".into();
        base.database.persistent = false;

        let mut other = AuthConfig::default();
        other.database.port = 6543;
        other.logging.level = "debug".into();

        base.merge(&other);
        assert_eq!(base.database.host, "base-host");
        assert!(!base.database.persistent);
        assert_eq!(base.database.port, 6543);
        assert_eq!(base.logging.level, "debug");
    }

    #[test]
    fn merge_plugin_options_key_by_key() {
        let mut base = AuthConfig::from_toml(
            "[plugins.options.logger]\nlevel = \"info\"\nexclude_items = [\"Env\"]\n",
        )
        .expect("parse");
        let other = AuthConfig::from_toml("[plugins.options.logger]\nlevel = \"debug\"\n")
            .expect("parse");
        base.merge(&other);
        let logger = base.plugins.options_for("logger").expect("options");
        assert_eq!(logger.get("level").and_then(|v| v.as_str()), Some("debug"));
        assert!(logger.contains_key("exclude_items"));
    }

    #[test]
    fn redacted_masks_passwords() {
        let mut config = AuthConfig::from_toml(
            "[plugins.options.protected_corpora_db]\npassword = \"s3cret\"\n",
        )
        .expect("parse");
        config.database.password = "hunter2".into();
        let shown = config.redacted().to_toml().expect("serialize");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("s3cret"));
    }
}
