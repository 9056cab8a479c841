//! Builtin plugins.
//!
//! | Name                   | Mount points                        |
//! |------------------------|-------------------------------------|
//! | `shibauth`             | `filter_identity_postdata`          |
//! | `logger`               | `enter`, `filter_result`, `log`, `exit` |
//! | `protected_corpora_db` | `filter_protected_corpora`          |
//!
//! `plugins.enabled` selects plugins by name, in registration order.
//! Names without a builtin follow `plugins.handle_not_found`.

pub mod logger;
pub mod protected_corpora;
pub mod shibauth;

pub use logger::{LoggerConfig, LoggerPlugin};
pub use protected_corpora::{ProtectedCorporaConfig, ProtectedCorporaPlugin};
pub use shibauth::ShibAuthPlugin;

use crate::config::AuthConfig;
use corpauth_hook::{HandleNotFound, HookError, Pipeline, Plugin};

/// Names of all builtin plugins.
pub const BUILTIN_PLUGINS: [&str; 3] = [shibauth::NAME, logger::NAME, protected_corpora::NAME];

/// Instantiates builtin plugin `name` with its options from `config`.
///
/// Returns `Ok(None)` if there is no builtin with this name.
///
/// # Errors
///
/// Option resolution or plugin construction errors.
pub fn builtin_plugin(name: &str, config: &AuthConfig) -> Result<Option<Box<dyn Plugin>>, HookError> {
    let options = config.plugins.options_for(name);
    let policy = config.plugins.handle_not_found;
    let plugin: Box<dyn Plugin> = match name {
        shibauth::NAME => Box::new(ShibAuthPlugin::from_options(options, policy)?),
        logger::NAME => Box::new(LoggerPlugin::from_options(options, policy)?),
        protected_corpora::NAME => Box::new(ProtectedCorporaPlugin::from_options(
            &config.database,
            options,
            policy,
        )?),
        _ => return Ok(None),
    };
    Ok(Some(plugin))
}

/// Builds the pipeline of the plugins enabled in `config`.
///
/// # Errors
///
/// - [`HookError::UnknownPlugin`] for a name without a builtin under
///   policy `error`
/// - [`HookError::DuplicatePlugin`] for a name enabled twice
/// - any error from [`builtin_plugin`]
pub fn build_pipeline(config: &AuthConfig) -> Result<Pipeline, HookError> {
    let mut pipeline = Pipeline::new();
    for name in &config.plugins.enabled {
        match builtin_plugin(name, config)? {
            Some(plugin) => {
                pipeline.register(plugin)?;
            }
            None => match config.plugins.handle_not_found {
                HandleNotFound::Error => return Err(HookError::UnknownPlugin(name.clone())),
                HandleNotFound::Warn => {
                    tracing::warn!(plugin = %name, "plugin not found, skipping");
                }
                HandleNotFound::Ignore => {}
            },
        }
    }

    for name in config.plugins.options.keys() {
        if !config.plugins.enabled.contains(name) {
            tracing::debug!(plugin = %name, "options given for a plugin that is not enabled");
        }
    }

    tracing::info!(plugins = ?pipeline.plugin_names(), "plugin pipeline built");
    Ok(pipeline)
}
