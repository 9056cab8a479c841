//! Error types for the plugin pipeline.

use crate::MountPoint;
use corpauth_types::{ErrorCode, StoreError};
use thiserror::Error;

/// Errors that can occur while registering plugins or dispatching
/// mount points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// Unknown mount point string.
    #[error("unknown mount point: {0}")]
    UnknownMountPoint(String),

    /// A plugin with the same name is already registered.
    #[error("plugin already registered: {0}")]
    DuplicatePlugin(String),

    /// No builtin plugin has this name (policy `error`).
    #[error("plugin not found: {0}")]
    UnknownPlugin(String),

    /// Override options not declared by the plugin (policy `error`).
    #[error("plugin '{plugin}': unknown option(s): {}", keys.join(", "))]
    ConfigMismatch {
        /// Plugin whose configuration was being resolved.
        plugin: String,
        /// Offending override keys.
        keys: Vec<String>,
    },

    /// Override options have the wrong type or the defaults do not
    /// serialize.
    #[error("plugin '{plugin}': invalid configuration: {message}")]
    InvalidConfig {
        /// Plugin whose configuration was being resolved.
        plugin: String,
        /// Error message.
        message: String,
    },

    /// A plugin called the authorization store and it failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A plugin failed for a reason of its own.
    #[error("plugin '{plugin}' failed at {point}: {message}")]
    PluginFailed {
        /// Name of the failing plugin.
        plugin: String,
        /// Mount point being dispatched.
        point: MountPoint,
        /// Error message.
        message: String,
    },
}

impl HookError {
    /// Creates an invalid config error.
    pub fn invalid_config(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Returns the store error if this error came from the store.
    #[must_use]
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl ErrorCode for HookError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownMountPoint(_) => "HOOK_UNKNOWN_MOUNT_POINT",
            Self::DuplicatePlugin(_) => "HOOK_DUPLICATE_PLUGIN",
            Self::UnknownPlugin(_) => "HOOK_UNKNOWN_PLUGIN",
            Self::ConfigMismatch { .. } => "HOOK_CONFIG_MISMATCH",
            Self::InvalidConfig { .. } => "HOOK_INVALID_CONFIG",
            Self::Store(e) => e.code(),
            Self::PluginFailed { .. } => "HOOK_PLUGIN_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_recoverable(),
            _ => false,
        }
    }
}
