//! Connection-managing store adapter.

use super::{
    protected_resources_sql, AuthorizationStore, Connection, Connector, Param, PermissionQuery,
    Row, ACADEMIC_STATUS_SQL, DEFAULT_LICENCE_TABLE, PERMITTED_RESOURCES_SQL,
    PROTECTED_RESOURCES_SQL,
};
use corpauth_types::StoreError;
use parking_lot::Mutex;

/// Attempts per query: the first try plus one reconnect-and-retry.
pub const MAX_ATTEMPTS: u32 = 2;

/// Store adapter over a [`Connector`].
///
/// Holds at most one connection, opened lazily on the first query and
/// guarded by a mutex; concurrent callers serialize on it.
///
/// # Failure policy
///
/// | Error | Action |
/// |-------|--------|
/// | `Connection` (1st) | drop connection, reconnect, retry once |
/// | `Connection` (2nd) | return `Unavailable { attempts: 2 }` |
/// | anything else | return immediately |
///
/// With `persistent = false` the connection is dropped after every query,
/// whatever its outcome.
///
/// # Blocking
///
/// Every call blocks the calling thread until the store answers or the
/// retry budget is spent. Calling from inside a tokio task is allowed and
/// never panics: the PostgreSQL backend waits on a helper thread and the
/// task's worker thread stays blocked meanwhile. Async servers should
/// still prefer `spawn_blocking` so other tasks keep running.
pub struct StoreAdapter<C: Connector> {
    connector: C,
    conn: Mutex<Option<C::Conn>>,
    persistent: bool,
    protected_sql: String,
}

impl<C: Connector> StoreAdapter<C> {
    /// Creates an adapter. No connection is opened yet.
    pub fn new(connector: C, persistent: bool) -> Self {
        Self {
            connector,
            conn: Mutex::new(None),
            persistent,
            protected_sql: PROTECTED_RESOURCES_SQL
                .replace("{licence_table}", DEFAULT_LICENCE_TABLE),
        }
    }

    /// Uses `template` (with `{licence_table}`) for the protected listing.
    ///
    /// # Errors
    ///
    /// [`StoreError::MalformedQuery`] if `licence_table` is not an identifier.
    pub fn with_protected_sql(
        mut self,
        template: &str,
        licence_table: &str,
    ) -> Result<Self, StoreError> {
        self.protected_sql = protected_resources_sql(template, licence_table)?;
        Ok(self)
    }

    /// Whether the connection is kept between queries.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Whether a connection is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Drops the current connection, if any.
    pub fn disconnect(&self) {
        if self.conn.lock().take().is_some() {
            tracing::debug!("authorization store disconnected");
        }
    }

    /// Runs `sql` with `params`, applying the failure policy.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] after two connection-class failures;
    /// other store errors unchanged.
    pub fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>, StoreError> {
        let mut slot = self.conn.lock();
        let result = self.query_with_retry(&mut slot, sql, params);
        if !self.persistent && slot.take().is_some() {
            tracing::trace!("non-persistent store connection closed");
        }
        result
    }

    fn query_with_retry(
        &self,
        slot: &mut Option<C::Conn>,
        sql: &str,
        params: &[Param],
    ) -> Result<Vec<Row>, StoreError> {
        let mut reason = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(slot, sql, params) {
                Ok(rows) => return Ok(rows),
                Err(StoreError::Connection(message)) => {
                    *slot = None;
                    if attempt < MAX_ATTEMPTS {
                        tracing::debug!(
                            "store connection error, reconnect and retry {attempt}/{}: {message}",
                            MAX_ATTEMPTS - 1
                        );
                    }
                    reason = message;
                }
                Err(other) => return Err(other),
            }
        }
        tracing::warn!(attempts = MAX_ATTEMPTS, reason = %reason, "authorization store unavailable");
        Err(StoreError::Unavailable {
            attempts: MAX_ATTEMPTS,
            reason,
        })
    }

    fn attempt(
        &self,
        slot: &mut Option<C::Conn>,
        sql: &str,
        params: &[Param],
    ) -> Result<Vec<Row>, StoreError> {
        let conn = match slot.take() {
            Some(conn) => conn,
            None => {
                let conn = self.connector.connect()?;
                tracing::debug!("authorization store connected");
                conn
            }
        };
        slot.insert(conn).query(sql, params)
    }
}

impl<C: Connector> std::fmt::Debug for StoreAdapter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAdapter")
            .field("persistent", &self.persistent)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

fn first_column(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.0.into_iter().next().flatten())
        .collect()
}

impl<C: Connector> AuthorizationStore for StoreAdapter<C> {
    fn academic_status(&self, username: &str) -> Result<bool, StoreError> {
        let rows = self.query(ACADEMIC_STATUS_SQL, &[Param::Text(username.to_string())])?;
        Ok(!rows.is_empty())
    }

    fn permitted_resources(&self, query: &PermissionQuery) -> Result<Vec<String>, StoreError> {
        let rows = self.query(PERMITTED_RESOURCES_SQL, &query.params())?;
        Ok(first_column(rows))
    }

    fn protected_resources(&self) -> Result<Vec<String>, StoreError> {
        let rows = self.query(&self.protected_sql, &[])?;
        Ok(first_column(rows))
    }
}


#[cfg(test)]
mod tests {
    use super::scripted::Script;
    use super::*;

    fn rows(ids: &[&str]) -> Vec<Row> {
        ids.iter().map(|id| Row::from_texts([*id])).collect()
    }

    #[test]
    fn lazy_connect_on_first_query() {
        let script = Script::default().with_rows(rows(&["A"]));
        let adapter = StoreAdapter::new(script.clone(), true);
        assert_eq!(script.connects(), 0);
        assert!(!adapter.is_connected());

        adapter.query("SELECT 1", &[]).expect("query");
        adapter.query("SELECT 1", &[]).expect("query");
        assert_eq!(script.connects(), 1);
        assert!(adapter.is_connected());
    }

    #[test]
    fn one_connection_failure_is_absorbed() {
        let script = Script::default()
            .fail_query(StoreError::connection("server closed the connection"))
            .with_rows(rows(&["A"]));
        let adapter = StoreAdapter::new(script.clone(), true);

        let out = adapter.query("SELECT corpus", &[]).expect("retry succeeds");
        assert_eq!(out, rows(&["A"]));
        assert_eq!(script.connects(), 2);
        assert_eq!(script.queries(), 2);
    }

    #[test]
    fn connect_failure_then_success() {
        let script = Script::default().fail_connect(StoreError::connection("refused"));
        let adapter = StoreAdapter::new(script.clone(), true);
        adapter.query("SELECT 1", &[]).expect("second connect works");
        assert_eq!(script.connects(), 2);
    }

    #[test]
    fn two_connection_failures_are_unavailable() {
        // Connect is refused, the reconnect works but the query is reset.
        let script = Script::default()
            .fail_connect(StoreError::connection("refused"))
            .fail_query(StoreError::connection("reset"));
        let adapter = StoreAdapter::new(script.clone(), true);

        let err = adapter.query("SELECT 1", &[]).expect_err("should fail");
        assert_eq!(
            err,
            StoreError::Unavailable {
                attempts: 2,
                reason: "reset".into(),
            }
        );
        assert_eq!(script.connects(), 2);
        assert!(!adapter.is_connected());
    }

    #[test]
    fn malformed_query_not_retried() {
        let script = Script::default().fail_query(StoreError::malformed("syntax error"));
        let adapter = StoreAdapter::new(script.clone(), true);

        let err = adapter.query("SELEC", &[]).expect_err("should fail");
        assert_eq!(err, StoreError::malformed("syntax error"));
        assert_eq!(script.queries(), 1);
        assert_eq!(script.connects(), 1);
        // The connection itself is still fine.
        assert!(adapter.is_connected());
    }

    #[test]
    fn access_denied_not_retried() {
        let script = Script::default()
            .fail_connect(StoreError::AccessDenied("password authentication failed".into()));
        let adapter = StoreAdapter::new(script.clone(), true);
        let err = adapter.query("SELECT 1", &[]).expect_err("should fail");
        assert!(matches!(err, StoreError::AccessDenied(_)));
        assert_eq!(script.connects(), 1);
    }

    #[test]
    fn non_persistent_drops_connection_after_each_call() {
        let script = Script::default();
        let adapter = StoreAdapter::new(script.clone(), false);

        adapter.query("SELECT 1", &[]).expect("query");
        assert!(!adapter.is_connected());
        adapter.query("SELECT 1", &[]).expect("query");
        assert_eq!(script.connects(), 2);

        let failing = Script::default().fail_query(StoreError::malformed("bad"));
        let adapter = StoreAdapter::new(failing, false);
        assert!(adapter.query("x", &[]).is_err());
        assert!(!adapter.is_connected());
    }

    #[test]
    fn academic_status_binds_username() {
        let script = Script::default().with_rows(rows(&["alice@uni.fi"]));
        let adapter = StoreAdapter::new(script.clone(), true);
        assert!(adapter.academic_status("alice@uni.fi").expect("lookup"));

        let seen = script.seen.lock();
        assert_eq!(seen[0].0, ACADEMIC_STATUS_SQL);
        assert_eq!(seen[0].1, [Param::Text("alice@uni.fi".into())]);
    }

    #[test]
    fn academic_status_false_without_rows() {
        let adapter = StoreAdapter::new(Script::default(), true);
        assert!(!adapter.academic_status("nobody").expect("lookup"));
    }

    #[test]
    fn permitted_resources_skips_nulls() {
        let script = Script::default().with_rows(vec![
            Row::from_texts(["corpus_a"]),
            Row(vec![None]),
            Row::from_texts(["CORPUS_B"]),
        ]);
        let adapter = StoreAdapter::new(script, true);
        let query = PermissionQuery {
            academic: false,
            top_domain: "org".into(),
            username: "u@x.org".into(),
            entitlement: vec![],
        };
        assert_eq!(
            adapter.permitted_resources(&query).expect("query"),
            ["corpus_a", "CORPUS_B"]
        );
    }

    #[test]
    fn protected_sql_is_configurable() {
        let script = Script::default();
        let adapter = StoreAdapter::new(script.clone(), true)
            .with_protected_sql("SELECT corpus FROM {licence_table}", "licences")
            .expect("valid table");
        adapter.protected_resources().expect("query");
        assert_eq!(script.seen.lock()[0].0, "SELECT corpus FROM licences");
    }
}
