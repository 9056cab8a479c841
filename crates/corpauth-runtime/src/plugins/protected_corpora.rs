//! Protected corpora listing plugin.
//!
//! Appends the corpora whose licence requires authorization, as listed by
//! the authorization database. Connection options default to the
//! `[database]` section and can be overridden per plugin:
//!
//! ```toml
//! [plugins.options.protected_corpora_db]
//! host = "authdb.internal"
//! licence_table = "auth.auth_license"
//! ```

use crate::config::DbConfig;
use crate::service::STORE_TIME_KEY;
use crate::store::{AuthorizationStore, DEFAULT_LICENCE_TABLE, PROTECTED_RESOURCES_SQL};
use corpauth_hook::{
    resolve_plugin_config_with, HandleNotFound, HookError, MountPoint, Plugin, RequestContext,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Plugin name.
pub const NAME: &str = "protected_corpora_db";

/// Options of [`ProtectedCorporaPlugin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectedCorporaConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub name: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Keep the connection open between requests.
    pub persistent: bool,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Table holding corpus licences.
    pub licence_table: String,
    /// Listing statement; `{licence_table}` is substituted.
    pub list_sql: String,
}

impl Default for ProtectedCorporaConfig {
    fn default() -> Self {
        Self::from_database(&DbConfig::default())
    }
}

impl ProtectedCorporaConfig {
    /// Options inheriting the connection parameters of `db`.
    #[must_use]
    pub fn from_database(db: &DbConfig) -> Self {
        Self {
            host: db.host.clone(),
            port: db.port,
            name: db.name.clone(),
            user: db.user.clone(),
            password: db.password.clone(),
            persistent: db.persistent,
            connect_timeout_secs: db.connect_timeout_secs,
            licence_table: DEFAULT_LICENCE_TABLE.into(),
            list_sql: PROTECTED_RESOURCES_SQL.into(),
        }
    }

    /// Connection parameters.
    #[must_use]
    pub fn database(&self) -> DbConfig {
        DbConfig {
            host: self.host.clone(),
            port: self.port,
            name: self.name.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            persistent: self.persistent,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}

/// Adds store-listed protected corpora to `filter_protected_corpora`.
pub struct ProtectedCorporaPlugin {
    store: Arc<dyn AuthorizationStore>,
}

impl ProtectedCorporaPlugin {
    /// Creates the plugin over an existing store.
    #[must_use]
    pub fn with_store(store: Arc<dyn AuthorizationStore>) -> Self {
        Self { store }
    }

    /// Creates the plugin with its own PostgreSQL connection.
    ///
    /// No connection is opened until the first listing.
    ///
    /// # Errors
    ///
    /// [`HookError::InvalidConfig`] if `licence_table` is not an identifier.
    #[cfg(feature = "postgres")]
    pub fn connect(config: &ProtectedCorporaConfig) -> Result<Self, HookError> {
        use crate::store::{PgConnector, StoreAdapter};

        let db = config.database();
        let adapter = StoreAdapter::new(PgConnector::new(&db), db.persistent)
            .with_protected_sql(&config.list_sql, &config.licence_table)
            .map_err(|e| HookError::invalid_config(NAME, e.to_string()))?;
        Ok(Self::with_store(Arc::new(adapter)))
    }

    /// Without the `postgres` feature there is no backend to connect to.
    ///
    /// # Errors
    ///
    /// Always [`HookError::InvalidConfig`].
    #[cfg(not(feature = "postgres"))]
    pub fn connect(_config: &ProtectedCorporaConfig) -> Result<Self, HookError> {
        Err(HookError::invalid_config(
            NAME,
            "built without PostgreSQL support",
        ))
    }

    /// Creates the plugin from option overrides layered over `database`.
    ///
    /// # Errors
    ///
    /// See [`resolve_plugin_config_with`]. Without the `postgres` feature
    /// this always fails with [`HookError::InvalidConfig`].
    pub fn from_options(
        database: &DbConfig,
        overrides: Option<&toml::Table>,
        policy: HandleNotFound,
    ) -> Result<Self, HookError> {
        let config = resolve_plugin_config_with(
            NAME,
            ProtectedCorporaConfig::from_database(database),
            overrides,
            policy,
        )?;
        Self::connect(&config)
    }
}

impl std::fmt::Debug for ProtectedCorporaPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedCorporaPlugin").finish_non_exhaustive()
    }
}

impl Plugin for ProtectedCorporaPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn mount_points(&self) -> &[MountPoint] {
        &[MountPoint::FilterProtectedCorpora]
    }

    fn filter_protected_corpora(
        &self,
        mut corpora: Vec<String>,
        ctx: &RequestContext,
    ) -> Result<Vec<String>, HookError> {
        let started = Instant::now();
        let listed = self.store.protected_resources();
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        ctx.update(STORE_TIME_KEY, json!(0.0), |v| {
            json!(v.as_f64().unwrap_or(0.0) + ms)
        });
        let listed = listed?;
        tracing::debug!(request_id = %ctx.id(), count = listed.len(), "protected corpora listed");
        corpora.extend(listed);
        Ok(corpora)
    }
}
