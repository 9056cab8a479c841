//! Unified error interface and the authorization store error type.
//!
//! All corpauth error types implement [`ErrorCode`] so that the transport
//! layer can map them to responses without matching on concrete types.

use thiserror::Error;

/// Unified error code interface for corpauth errors.
///
/// # Code Format
///
/// - **UPPER_SNAKE_CASE**, e.g. `"STORE_UNAVAILABLE"`
/// - **Namespace-prefixed**: `STORE_`, `HOOK_`, `CONFIG_`, `SERVICE_`
/// - **Stable**: codes are part of the API contract
///
/// # Example
///
/// ```
/// use corpauth_types::{ErrorCode, StoreError};
///
/// let err = StoreError::connection("server has gone away");
/// assert_eq!(err.code(), "STORE_CONNECTION");
/// assert!(err.is_recoverable());
/// ```
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying (or operator action) may make the
    /// operation succeed.
    fn is_recoverable(&self) -> bool;
}

/// Validates that an error code follows corpauth conventions.
///
/// # Panics
///
/// Panics if the code is empty, lacks `expected_prefix`, or is not
/// UPPER_SNAKE_CASE. Intended for tests.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();
    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

fn is_upper_snake_case(s: &str) -> bool {
    !s.starts_with('_')
        && !s.ends_with('_')
        && !s.contains("__")
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Errors raised by the authorization store and its adapter.
///
/// Only [`StoreError::Connection`] is retryable, and only by the adapter,
/// which retries it exactly once before reporting
/// [`StoreError::Unavailable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connecting failed or an established connection broke.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The adapter exhausted its single reconnect-and-retry.
    #[error("authorization store unavailable after {attempts} attempts: {reason}")]
    Unavailable {
        /// Number of attempts made (always 2 for the adapter).
        attempts: u32,
        /// Message of the last connection error.
        reason: String,
    },

    /// The statement was rejected by the store (syntax, schema mismatch).
    #[error("malformed store query: {0}")]
    MalformedQuery(String),

    /// The store refused the credentials or the operation.
    #[error("store access denied: {0}")]
    AccessDenied(String),
}

impl StoreError {
    /// Creates a connection-class error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Creates a malformed-query error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedQuery(message.into())
    }

    /// Returns `true` for errors the adapter may answer with a reconnect.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if the store could not be reached at all.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "STORE_CONNECTION",
            Self::Unavailable { .. } => "STORE_UNAVAILABLE",
            Self::MalformedQuery(_) => "STORE_MALFORMED_QUERY",
            Self::AccessDenied(_) => "STORE_ACCESS_DENIED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Unavailable { .. })
    }
}
