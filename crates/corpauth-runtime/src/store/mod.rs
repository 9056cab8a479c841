//! Authorization store.
//!
//! # Layers
//!
//! ```text
//! AuthorizationStore      academic_status / permitted_resources / protected_resources
//!        ▲
//! StoreAdapter<C>         lazy connect, one reconnect-and-retry, persistence policy
//!        ▲
//! Connector / Connection  backend: PostgreSQL, or scripted in tests
//! ```
//!
//! [`MemoryStore`] implements [`AuthorizationStore`] directly over
//! in-memory tables.
//!
//! Every value derived from the caller reaches the backend as a bound
//! [`Param`]; statements never contain caller data.

mod adapter;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use adapter::{StoreAdapter, MAX_ATTEMPTS};
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::{PgConnection, PgConnector};

use corpauth_types::StoreError;

/// Academic status lookup. `$1` = username.
pub const ACADEMIC_STATUS_SQL: &str =
    "SELECT person FROM auth_academic WHERE person = $1::text LIMIT 1";

/// Union of licence-, allow-list- and entitlement-based corpora.
///
/// `$1` = academic, `$2` = top-level domain, `$3` = username,
/// `$4` = entitlement tokens.
pub const PERMITTED_RESOURCES_SQL: &str = "\
SELECT corpus FROM auth_license
 WHERE $1::boolean AND (license = 'ACA' OR (license = 'ACA-Fi' AND $2::text = 'fi'))
UNION
SELECT corpus FROM auth_allow WHERE person = $3::text
UNION
SELECT corpus FROM auth_lbr_map WHERE lbr_id = ANY($4::text[])";

/// Default protected-corpora listing; `{licence_table}` is substituted
/// from configuration.
pub const PROTECTED_RESOURCES_SQL: &str =
    "SELECT corpus FROM {licence_table} WHERE NOT license LIKE 'PUB%'";

/// Default licence table.
pub const DEFAULT_LICENCE_TABLE: &str = "auth_license";

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// SQL boolean.
    Bool(bool),
    /// SQL text.
    Text(String),
    /// SQL `text[]`.
    TextList(Vec<String>),
}

/// A result row; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row(pub Vec<Option<String>>);

impl Row {
    /// Creates a row from non-null text columns.
    pub fn from_texts<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(|c| Some(c.into())).collect())
    }

    /// Column `idx` as text, `None` if NULL or missing.
    #[must_use]
    pub fn text(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(|c| c.as_deref())
    }
}

/// Opens connections to a store backend.
pub trait Connector: Send + Sync {
    /// Connection type produced by this connector.
    type Conn: Connection;

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// [`StoreError::Connection`] if the backend cannot be reached;
    /// [`StoreError::AccessDenied`] if it rejects the credentials.
    fn connect(&self) -> Result<Self::Conn, StoreError>;
}

/// An open connection to a store backend.
pub trait Connection: Send {
    /// Runs `sql` with bound `params`.
    ///
    /// # Errors
    ///
    /// Connection-class failures must be reported as
    /// [`StoreError::Connection`]; the adapter only retries those.
    fn query(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Row>, StoreError>;
}

/// Inputs of the permitted-resources lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionQuery {
    /// Final academic status.
    pub academic: bool,
    /// Top-level domain, `"fi"` enables `ACA-Fi` licences.
    pub top_domain: String,
    /// Asserted username.
    pub username: String,
    /// Entitlement tokens.
    pub entitlement: Vec<String>,
}

impl PermissionQuery {
    /// Parameters for [`PERMITTED_RESOURCES_SQL`].
    #[must_use]
    pub fn params(&self) -> [Param; 4] {
        [
            Param::Bool(self.academic),
            Param::Text(self.top_domain.clone()),
            Param::Text(self.username.clone()),
            Param::TextList(self.entitlement.clone()),
        ]
    }
}

/// Logical operations on the authorization store.
pub trait AuthorizationStore: Send + Sync {
    /// Whether `username` is on the local academic list.
    fn academic_status(&self, username: &str) -> Result<bool, StoreError>;

    /// Corpora granted by licence, allow-list and entitlement mapping.
    /// May contain duplicates and any letter case.
    fn permitted_resources(&self, query: &PermissionQuery) -> Result<Vec<String>, StoreError>;

    /// Corpora whose licence requires authorization.
    fn protected_resources(&self) -> Result<Vec<String>, StoreError>;
}

/// Builds the protected listing statement, substituting `{licence_table}`.
///
/// # Errors
///
/// [`StoreError::MalformedQuery`] unless `licence_table` is a plain
/// (optionally schema-qualified) SQL identifier.
pub fn protected_resources_sql(template: &str, licence_table: &str) -> Result<String, StoreError> {
    if !is_sql_identifier(licence_table) {
        return Err(StoreError::malformed(format!(
            "invalid licence table name: {licence_table:?}"
        )));
    }
    Ok(template.replace("{licence_table}", licence_table))
}

fn is_sql_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
