//! Configuration management with hierarchical layering.
//!
//! # Architecture
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌────────────────────────────────────────────────┐
//! │  1. Environment Variables (CORPAUTH_*)         │  Runtime override
//! ├────────────────────────────────────────────────┤
//! │  2. Local Config (--config / CORPAUTH_CONFIG)  │  Deployment-specific
//! ├────────────────────────────────────────────────┤
//! │  3. System Config (/etc/corpauth/config.toml)  │  Host defaults
//! ├────────────────────────────────────────────────┤
//! │  4. Default Values (compile-time)              │  Fallback
//! └────────────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `CORPAUTH_CONFIG` | local config path | PathBuf |
//! | `CORPAUTH_DB_HOST` | `database.host` | String |
//! | `CORPAUTH_DB_PORT` | `database.port` | u16 |
//! | `CORPAUTH_DB_NAME` | `database.name` | String |
//! | `CORPAUTH_DB_USER` | `database.user` | String |
//! | `CORPAUTH_DB_PASSWORD` | `database.password` | String |
//! | `CORPAUTH_DB_PERSISTENT` | `database.persistent` | bool |
//! | `CORPAUTH_LOG_LEVEL` | `logging.level` | String |
//! | `CORPAUTH_HANDLE_NOT_FOUND` | `plugins.handle_not_found` | warn/error/ignore |
//!
//! # Example Configuration
//!
//! ```toml
//! [database]
//! host = "localhost"
//! port = 5432
//! name = "korp_auth"
//! user = "korp"
//! persistent = true
//!
//! [logging]
//! level = "info"
//!
//! [plugins]
//! enabled = ["shibauth", "logger", "protected_corpora_db"]
//! handle_not_found = "warn"
//!
//! [plugins.options.logger]
//! categories = ["auth", "params", "result", "times"]
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{AuthConfig, DbConfig, LoggingConfig, PluginsConfig};

/// Default system-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/corpauth/config.toml";

/// Environment variable naming the local configuration file.
pub const CONFIG_PATH_ENV: &str = "CORPAUTH_CONFIG";
