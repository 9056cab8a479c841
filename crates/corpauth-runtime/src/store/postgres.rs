//! PostgreSQL backend on `tokio-postgres`.
//!
//! Each connection owns a single-threaded tokio runtime that drives the
//! protocol task; store calls block on it. Callers stay synchronous and
//! may also call from inside an async runtime.

use super::{Connection, Connector, Param, Row};
use crate::config::DbConfig;
use corpauth_types::StoreError;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

/// Private runtime of one connection.
///
/// tokio refuses to `block_on` from a thread already running a runtime, and
/// to drop a runtime there. When called from async code the wait moves to a
/// scoped helper thread, and the runtime is always shut down in the
/// background. The calling task is blocked for the duration of the query.
struct StoreRuntime(Option<Runtime>);

impl StoreRuntime {
    fn new() -> Result<Self, StoreError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map(|rt| Self(Some(rt)))
            .map_err(|e| StoreError::connection(format!("failed to start store runtime: {e}")))
    }

    fn block_on<F>(&self, fut: F) -> Result<F::Output, StoreError>
    where
        F: Future + Send,
        F::Output: Send,
    {
        let rt = self
            .0
            .as_ref()
            .ok_or_else(|| StoreError::connection("store runtime shut down"))?;
        if Handle::try_current().is_err() {
            return Ok(rt.block_on(fut));
        }
        std::thread::scope(|s| s.spawn(|| rt.block_on(fut)).join())
            .map_err(|_| StoreError::connection("store worker thread panicked"))
    }

    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(rt) = &self.0 {
            rt.spawn(fut);
        }
    }
}

impl Drop for StoreRuntime {
    fn drop(&mut self) {
        if let Some(rt) = self.0.take() {
            rt.shutdown_background();
        }
    }
}

/// Connector for a PostgreSQL authorization database.
#[derive(Clone)]
pub struct PgConnector {
    config: tokio_postgres::Config,
}

impl PgConnector {
    /// Creates a connector from connection parameters.
    #[must_use]
    pub fn new(db: &DbConfig) -> Self {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&db.host)
            .port(db.port)
            .dbname(&db.name)
            .user(&db.user)
            .application_name("corpauth")
            .connect_timeout(Duration::from_secs(db.connect_timeout_secs));
        if !db.password.is_empty() {
            config.password(&db.password);
        }
        Self { config }
    }
}

impl std::fmt::Debug for PgConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnector")
            .field("hosts", &self.config.get_hosts())
            .field("dbname", &self.config.get_dbname())
            .field("user", &self.config.get_user())
            .finish_non_exhaustive()
    }
}

impl Connector for PgConnector {
    type Conn = PgConnection;

    fn connect(&self) -> Result<PgConnection, StoreError> {
        let runtime = StoreRuntime::new()?;

        let (client, connection) = runtime
            .block_on(self.config.connect(NoTls))?
            .map_err(map_pg_error)?;

        // drive the connection in background
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "postgres connection task ended");
            }
        });

        Ok(PgConnection { client, runtime })
    }
}

/// An open PostgreSQL connection.
pub struct PgConnection {
    client: Client,
    runtime: StoreRuntime,
}

impl Connection for PgConnection {
    fn query(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Row>, StoreError> {
        if self.client.is_closed() {
            return Err(StoreError::connection("connection closed"));
        }

        let bound: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| match p {
                Param::Bool(b) => b as &(dyn ToSql + Sync),
                Param::Text(s) => s as &(dyn ToSql + Sync),
                Param::TextList(v) => v as &(dyn ToSql + Sync),
            })
            .collect();

        let rows = self
            .runtime
            .block_on(self.client.query(sql, &bound))?
            .map_err(map_pg_error)?;

        rows.iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| row.try_get::<_, Option<String>>(i))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Row)
                    .map_err(|e| StoreError::malformed(format!("non-text result column: {e}")))
            })
            .collect()
    }
}

/// Classifies a driver error for the adapter's retry policy.
fn map_pg_error(e: tokio_postgres::Error) -> StoreError {
    if e.is_closed() {
        return StoreError::connection(e.to_string());
    }
    let message = e
        .as_db_error()
        .map_or_else(|| e.to_string(), |db| db.message().to_string());
    match e.code() {
        Some(code)
            if *code == SqlState::INSUFFICIENT_PRIVILEGE
                || *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION =>
        {
            StoreError::AccessDenied(message)
        }
        // Class 08 (connection exception) and 57P (operator intervention)
        Some(code) if code.code().starts_with("08") || code.code().starts_with("57P") => {
            StoreError::connection(message)
        }
        Some(_) => StoreError::malformed(message),
        // No SQLSTATE: I/O, timeout or protocol failure.
        None => StoreError::connection(message),
    }
}
