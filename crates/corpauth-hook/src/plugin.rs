//! Plugin trait and testing utilities.

use crate::{HookError, MountPoint, RequestContext};
use chrono::{DateTime, Utc};
use corpauth_types::RequestArgs;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Diagnostic detail, shown for `debug` requests.
    Debug,
    /// Normal request reporting.
    Info,
    /// Unexpected but handled conditions.
    Warning,
    /// Failed requests.
    Error,
    /// Failures affecting the whole service. Emitted as `tracing` errors.
    Critical,
}

impl LogLevel {
    /// Parses a level name, falling back to `Info` for unknown names.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::Info)
    }

    /// Lower-case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the `log` action mount point.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Category used for filtering (e.g. `"auth"`, `"debug"`).
    pub category: String,
    /// Item name, the label of the logged value.
    pub item: String,
    /// Logged value.
    pub value: Value,
}

impl LogEntry {
    /// Creates a log entry.
    pub fn new(
        level: LogLevel,
        category: impl Into<String>,
        item: impl Into<String>,
        value: Value,
    ) -> Self {
        Self {
            level,
            category: category.into(),
            item: item.into(),
            value,
        }
    }
}

/// An extension registered with the [`Pipeline`](crate::Pipeline).
///
/// A plugin declares the mount points it implements through
/// [`mount_points`](Self::mount_points); the pipeline indexes that set at
/// registration and only ever calls the declared methods. Every method has
/// an identity (filters) or no-op (actions) default.
///
/// # Thread Safety
///
/// One instance serves every request of the process. Per-request state
/// belongs in the [`RequestContext`] scratch store.
pub trait Plugin: Send + Sync {
    /// Unique plugin name.
    fn name(&self) -> &str;

    /// Mount points this plugin implements.
    fn mount_points(&self) -> &[MountPoint];

    /// `enter` action: the request has entered the pipeline.
    fn enter(&self, _ctx: &RequestContext) {}

    /// `filter_identity_postdata` filter.
    fn filter_identity_postdata(
        &self,
        postdata: RequestArgs,
        _ctx: &RequestContext,
    ) -> Result<RequestArgs, HookError> {
        Ok(postdata)
    }

    /// `filter_protected_corpora` filter.
    ///
    /// Plugins backed by the authorization store return
    /// [`HookError::Store`] when the store is unavailable.
    fn filter_protected_corpora(
        &self,
        corpora: Vec<String>,
        _ctx: &RequestContext,
    ) -> Result<Vec<String>, HookError> {
        Ok(corpora)
    }

    /// `filter_result` filter.
    fn filter_result(&self, result: Value, _ctx: &RequestContext) -> Result<Value, HookError> {
        Ok(result)
    }

    /// `log` action.
    fn log(&self, _entry: &LogEntry, _ctx: &RequestContext) {}

    /// `exit` action: the request is leaving; scratch state is released
    /// right after all plugins have run.
    fn exit(&self, _end: DateTime<Utc>, _elapsed: Duration, _ctx: &RequestContext) {}
}

/// Test utilities for the plugin pipeline.
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type ArgsFn = Box<dyn Fn(RequestArgs) -> Result<RequestArgs, HookError> + Send + Sync>;
    type CorporaFn = Box<dyn Fn(Vec<String>) -> Result<Vec<String>, HookError> + Send + Sync>;
    type ResultFn = Box<dyn Fn(Value) -> Result<Value, HookError> + Send + Sync>;

    /// A configurable plugin for tests.
    ///
    /// Filters default to identity. Every dispatched mount point is
    /// appended to a shared journal as `"<name>:<point>"`, so ordering
    /// across plugins can be asserted.
    pub struct MockPlugin {
        /// Plugin name.
        pub name: String,
        /// Declared mount points.
        pub points: Vec<MountPoint>,
        args_fn: ArgsFn,
        corpora_fn: CorporaFn,
        result_fn: ResultFn,
        /// Number of dispatched calls.
        pub call_count: Arc<AtomicUsize>,
        /// Shared journal of calls.
        pub journal: Arc<Mutex<Vec<String>>>,
    }

    impl MockPlugin {
        /// Creates a pass-through plugin implementing `points`.
        pub fn new(name: &str, points: &[MountPoint]) -> Self {
            Self {
                name: name.to_string(),
                points: points.to_vec(),
                args_fn: Box::new(|args: RequestArgs| Ok::<_, HookError>(args)),
                corpora_fn: Box::new(|corpora: Vec<String>| Ok::<_, HookError>(corpora)),
                result_fn: Box::new(|value: Value| Ok::<_, HookError>(value)),
                call_count: Arc::new(AtomicUsize::new(0)),
                journal: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Creates a plugin implementing every mount point.
        pub fn all_points(name: &str) -> Self {
            Self::new(name, &MountPoint::ALL)
        }

        /// Uses `journal` instead of a private one.
        #[must_use]
        pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
            self.journal = journal;
            self
        }

        /// Sets the `filter_identity_postdata` behavior.
        #[must_use]
        pub fn on_postdata(
            mut self,
            f: impl Fn(RequestArgs) -> Result<RequestArgs, HookError> + Send + Sync + 'static,
        ) -> Self {
            self.args_fn = Box::new(f);
            self
        }

        /// Sets the `filter_protected_corpora` behavior.
        #[must_use]
        pub fn on_corpora(
            mut self,
            f: impl Fn(Vec<String>) -> Result<Vec<String>, HookError> + Send + Sync + 'static,
        ) -> Self {
            self.corpora_fn = Box::new(f);
            self
        }

        /// Sets the `filter_result` behavior.
        #[must_use]
        pub fn on_result(
            mut self,
            f: impl Fn(Value) -> Result<Value, HookError> + Send + Sync + 'static,
        ) -> Self {
            self.result_fn = Box::new(f);
            self
        }

        /// Returns the number of dispatched calls.
        pub fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        fn record(&self, point: MountPoint) {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.journal.lock().push(format!("{}:{}", self.name, point));
        }
    }

    impl Plugin for MockPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn mount_points(&self) -> &[MountPoint] {
            &self.points
        }

        fn enter(&self, _ctx: &RequestContext) {
            self.record(MountPoint::Enter);
        }

        fn filter_identity_postdata(
            &self,
            postdata: RequestArgs,
            _ctx: &RequestContext,
        ) -> Result<RequestArgs, HookError> {
            self.record(MountPoint::FilterIdentityPostdata);
            (self.args_fn)(postdata)
        }

        fn filter_protected_corpora(
            &self,
            corpora: Vec<String>,
            _ctx: &RequestContext,
        ) -> Result<Vec<String>, HookError> {
            self.record(MountPoint::FilterProtectedCorpora);
            (self.corpora_fn)(corpora)
        }

        fn filter_result(&self, result: Value, _ctx: &RequestContext) -> Result<Value, HookError> {
            self.record(MountPoint::FilterResult);
            (self.result_fn)(result)
        }

        fn log(&self, _entry: &LogEntry, _ctx: &RequestContext) {
            self.record(MountPoint::Log);
        }

        fn exit(&self, _end: DateTime<Utc>, _elapsed: Duration, _ctx: &RequestContext) {
            self.record(MountPoint::Exit);
        }
    }
}
