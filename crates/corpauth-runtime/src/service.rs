//! Authorization decision service.
//!
//! Drives one request through the plugin pipeline and the permission
//! resolver:
//!
//! ```text
//! begin ─► filter_identity_postdata ─► log(Normalized-params)
//!       ─► resolve ─► log(Result) ─► filter_result ─► exit
//! ```
//!
//! `exit` runs on every path, including failures.

use crate::config::{AuthConfig, ConfigError};
use crate::plugins::build_pipeline;
use crate::resolver::PermissionResolver;
use crate::store::AuthorizationStore;
use corpauth_hook::{HookError, LogEntry, LogLevel, Pipeline, RequestContext};
use corpauth_types::identity::{FORMAT, REMOTE_USER};
use corpauth_types::{
    canonical_corpus_id, CorporaFormat, DecisionPayload, ErrorCode, IdentityAttributes,
    RequestArgs, RequestEnv, StoreError,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Scratch key accumulating time spent in the store, in milliseconds.
pub const STORE_TIME_KEY: &str = "store.time_ms";

/// Errors of a service request.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The authorization store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A plugin failed.
    #[error(transparent)]
    Hook(HookError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No store backend is compiled in.
    #[error("no authorization store backend available (enable the `postgres` feature)")]
    NoBackend,

    /// The decision payload could not be encoded.
    #[error("failed to encode decision: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<HookError> for ServiceError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::Store(e) => Self::Store(e),
            other => Self::Hook(other),
        }
    }
}

impl ErrorCode for ServiceError {
    fn code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.code(),
            Self::Hook(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::NoBackend => "SERVICE_NO_BACKEND",
            Self::Encode(_) => "SERVICE_ENCODE",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_recoverable(),
            Self::Hook(e) => e.is_recoverable(),
            Self::Config(e) => e.is_recoverable(),
            Self::NoBackend | Self::Encode(_) => false,
        }
    }
}

/// The authorization decision service.
///
/// Holds the process-wide pipeline and resolver; every call creates its
/// own request context, so one service can serve concurrent requests.
///
/// # Example
///
/// ```
/// use corpauth_hook::Pipeline;
/// use corpauth_runtime::service::AuthService;
/// use corpauth_runtime::store::MemoryStore;
/// use corpauth_types::{RequestArgs, RequestEnv};
/// use std::sync::Arc;
///
/// let store = MemoryStore::new().with_allow("alice@uni.fi", "secret");
/// let service = AuthService::new(Arc::new(Pipeline::new()), Arc::new(store));
///
/// let args = RequestArgs::new().with("remote_user", "alice@uni.fi");
/// let out = service.handle(args, RequestEnv::new()).unwrap();
/// assert_eq!(out["authenticated"], true);
/// assert_eq!(out["permitted_resources"]["corpora"]["SECRET"]["read"], true);
/// ```
#[derive(Debug, Clone)]
pub struct AuthService {
    pipeline: Arc<Pipeline>,
    resolver: PermissionResolver,
}

impl AuthService {
    /// Creates a service over `pipeline` and `store`.
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>, store: Arc<dyn AuthorizationStore>) -> Self {
        Self {
            pipeline,
            resolver: PermissionResolver::new(store),
        }
    }

    /// Creates a service from configuration: the enabled plugins and a
    /// PostgreSQL store on `[database]`.
    ///
    /// # Errors
    ///
    /// Plugin errors, or [`ServiceError::NoBackend`] without the
    /// `postgres` feature.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ServiceError> {
        let pipeline = Arc::new(build_pipeline(config)?);
        let store = default_store(config)?;
        Ok(Self::new(pipeline, store))
    }

    /// The plugin pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The permission resolver.
    #[must_use]
    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Decides one authorization request.
    ///
    /// Returns the outbound JSON after `filter_result`.
    ///
    /// # Errors
    ///
    /// Store failures (after the adapter's retry) and plugin failures.
    /// `exit` has run when this returns, whatever the outcome.
    pub fn handle(&self, args: RequestArgs, env: RequestEnv) -> Result<Value, ServiceError> {
        let scope = self.pipeline.begin(args.clone(), env);
        let debug = scope.is_debug();

        let args = self.pipeline.filter_identity_postdata(args, &scope)?;
        let logged_args = if debug {
            args.to_json()
        } else {
            args.without(REMOTE_USER).to_json()
        };
        self.pipeline.log(
            &LogEntry::new(LogLevel::Info, "params", "Normalized-params", logged_args),
            &scope,
        );

        let identity = IdentityAttributes::from_args(&args);
        let started = Instant::now();
        let resolved = self.resolver.resolve_identity(&identity);
        record_store_time(&scope, started);
        let result = resolved.map_err(|e| {
            tracing::warn!(request_id = %scope.id(), error = %e, "permission resolution failed");
            e
        })?;

        let format = CorporaFormat::from_arg(args.get(FORMAT));
        let payload = DecisionPayload::from_result(&result, format, identity.username());
        let logged = if debug { payload.clone() } else { payload.redacted() };
        self.pipeline.log(
            &LogEntry::new(LogLevel::Info, "result", "Result", serde_json::to_value(&logged)?),
            &scope,
        );

        let value = self
            .pipeline
            .filter_result(serde_json::to_value(&payload)?, &scope)?;
        tracing::info!(
            request_id = %scope.id(),
            authenticated = result.authenticated,
            corpora = result.corpora.len(),
            "request decided"
        );
        scope.finish();
        Ok(value)
    }

    /// Lists the protected corpora through `filter_protected_corpora`.
    ///
    /// The result is upper-cased, deduplicated and sorted.
    ///
    /// # Errors
    ///
    /// Plugin failures, including store failures of listing plugins.
    pub fn protected_corpora(&self, env: RequestEnv) -> Result<Vec<String>, ServiceError> {
        let scope = self.pipeline.begin(RequestArgs::new(), env);
        let corpora = self.pipeline.filter_protected_corpora(Vec::new(), &scope)?;
        let corpora: BTreeSet<String> = corpora.iter().map(|c| canonical_corpus_id(c)).collect();
        scope.finish();
        Ok(corpora.into_iter().collect())
    }
}

fn record_store_time(ctx: &RequestContext, started: Instant) {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    ctx.update(STORE_TIME_KEY, json!(0.0), |v| {
        json!(v.as_f64().unwrap_or(0.0) + ms)
    });
}

#[cfg(feature = "postgres")]
fn default_store(config: &AuthConfig) -> Result<Arc<dyn AuthorizationStore>, ServiceError> {
    use crate::store::{PgConnector, StoreAdapter};

    Ok(Arc::new(StoreAdapter::new(
        PgConnector::new(&config.database),
        config.database.persistent,
    )))
}

#[cfg(not(feature = "postgres"))]
fn default_store(_config: &AuthConfig) -> Result<Arc<dyn AuthorizationStore>, ServiceError> {
    Err(ServiceError::NoBackend)
}
