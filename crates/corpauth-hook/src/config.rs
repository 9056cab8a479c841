//! Plugin configuration resolution.
//!
//! Every plugin declares its options as a typed struct whose `Default`
//! holds the declared defaults. Overrides come from the `[plugins.options.<name>]`
//! table of the process configuration and are layered over the defaults
//! key by key.
//!
//! # Example TOML
//!
//! ```toml
//! [plugins]
//! handle_not_found = "error"
//!
//! [plugins.options.logger]
//! level = "debug"
//! exclude_items = ["env"]
//! ```

use crate::HookError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with override keys a plugin does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleNotFound {
    /// Log a warning and drop the key.
    #[default]
    Warn,
    /// Fail plugin registration.
    Error,
    /// Drop the key silently.
    Ignore,
}

impl HandleNotFound {
    /// Returns the configuration string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Ignore => "ignore",
        }
    }
}

impl FromStr for HandleNotFound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!(
                "invalid handle_not_found value '{other}' (expected warn, error or ignore)"
            )),
        }
    }
}

impl fmt::Display for HandleNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves the effective configuration of `plugin`.
///
/// Starts from `C::default()`, replaces every declared key present in
/// `overrides`, and applies `policy` to undeclared keys.
///
/// Option fields of `C` that default to `None` are not declared, since
/// they do not serialize; plugin configs use concrete defaults instead.
///
/// # Errors
///
/// - [`HookError::ConfigMismatch`] for undeclared keys under
///   [`HandleNotFound::Error`]
/// - [`HookError::InvalidConfig`] if an override has the wrong type
pub fn resolve_plugin_config<C>(
    plugin: &str,
    overrides: Option<&toml::Table>,
    policy: HandleNotFound,
) -> Result<C, HookError>
where
    C: Serialize + DeserializeOwned + Default,
{
    resolve_plugin_config_with(plugin, C::default(), overrides, policy)
}

/// Like [`resolve_plugin_config`], with explicit declared defaults.
///
/// Used by plugins whose defaults depend on process configuration.
pub fn resolve_plugin_config_with<C>(
    plugin: &str,
    defaults: C,
    overrides: Option<&toml::Table>,
    policy: HandleNotFound,
) -> Result<C, HookError>
where
    C: Serialize + DeserializeOwned,
{
    let mut merged = match toml::Value::try_from(defaults) {
        Ok(toml::Value::Table(table)) => table,
        Ok(other) => {
            return Err(HookError::invalid_config(
                plugin,
                format!("defaults must be a table, got {}", other.type_str()),
            ))
        }
        Err(e) => return Err(HookError::invalid_config(plugin, e.to_string())),
    };

    let mut unknown: Vec<String> = Vec::new();
    for (key, value) in overrides.into_iter().flatten() {
        if merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        } else {
            unknown.push(key.clone());
        }
    }

    if !unknown.is_empty() {
        unknown.sort();
        match policy {
            HandleNotFound::Error => {
                return Err(HookError::ConfigMismatch {
                    plugin: plugin.to_string(),
                    keys: unknown,
                })
            }
            HandleNotFound::Warn => {
                for key in &unknown {
                    tracing::warn!(plugin, key = %key, "Unknown plugin option ignored");
                }
            }
            HandleNotFound::Ignore => {}
        }
    }

    toml::Value::Table(merged)
        .try_into::<C>()
        .map_err(|e| HookError::invalid_config(plugin, e.to_string()))
}
