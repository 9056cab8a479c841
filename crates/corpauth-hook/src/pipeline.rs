//! Plugin pipeline: registration and mount-point dispatch.
//!
//! Plugins run in registration order. A plugin's rank is its registration
//! index and never changes. At registration every declared mount point is
//! indexed, so dispatch only visits plugins that implement the point.

use crate::{HookError, LogEntry, MountPoint, Plugin, RequestContext, RequestState};
use chrono::Utc;
use corpauth_types::{RequestArgs, RequestEnv};
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Deref;

/// Ordered chain of registered plugins.
///
/// # Concurrency
///
/// Registration takes `&mut self` and happens once at startup. Dispatch
/// takes `&self`; share a built pipeline as `Arc<Pipeline>`.
pub struct Pipeline {
    plugins: Vec<Box<dyn Plugin>>,
    index: HashMap<MountPoint, Vec<usize>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registers a plugin after all previously registered ones.
    ///
    /// Returns the plugin's rank (its position in dispatch order).
    ///
    /// # Errors
    ///
    /// [`HookError::DuplicatePlugin`] if a plugin with the same name is
    /// already registered.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<usize, HookError> {
        let name = plugin.name().to_string();
        if self.plugins.iter().any(|p| p.name() == name) {
            return Err(HookError::DuplicatePlugin(name));
        }

        let rank = self.plugins.len();
        let mut declared: Vec<MountPoint> = Vec::new();
        for &point in plugin.mount_points() {
            // A point listed twice must not run the plugin twice.
            if declared.contains(&point) {
                continue;
            }
            declared.push(point);
            self.index.entry(point).or_default().push(rank);
        }

        tracing::info!(plugin = %name, rank, "Loaded plugin");
        tracing::debug!(
            plugin = %name,
            mount_points = ?declared.iter().map(MountPoint::as_str).collect::<Vec<_>>(),
            "Plugin mount points"
        );

        self.plugins.push(plugin);
        Ok(rank)
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin names in dispatch order.
    #[must_use]
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Names of the plugins implementing `point`, in dispatch order.
    #[must_use]
    pub fn implementors(&self, point: MountPoint) -> Vec<&str> {
        self.plugins_at(point).map(|p| p.name()).collect()
    }

    fn plugins_at(&self, point: MountPoint) -> impl Iterator<Item = &dyn Plugin> + '_ {
        self.index
            .get(&point)
            .into_iter()
            .flatten()
            .map(move |&rank| self.plugins[rank].as_ref())
    }

    /// Threads `value` through every plugin implementing a filter point.
    ///
    /// The first plugin error stops the chain and is returned.
    fn run_filter<T, F>(
        &self,
        point: MountPoint,
        value: T,
        ctx: &RequestContext,
        call: F,
    ) -> Result<T, HookError>
    where
        F: Fn(&dyn Plugin, T) -> Result<T, HookError>,
    {
        debug_assert!(point.is_filter());
        let mut current = value;
        for plugin in self.plugins_at(point) {
            current = call(plugin, current).map_err(|e| {
                tracing::warn!(
                    request_id = %ctx.id(),
                    plugin = plugin.name(),
                    point = %point,
                    error = %e,
                    "plugin filter failed"
                );
                e
            })?;
        }
        Ok(current)
    }

    /// Creates the context of a new request and dispatches `enter`.
    ///
    /// The returned scope dispatches `exit` and releases the context when
    /// it is finished or dropped, whichever comes first.
    pub fn begin(&self, args: RequestArgs, env: RequestEnv) -> RequestScope<'_> {
        let ctx = RequestContext::new(args, env);
        tracing::debug!(request_id = %ctx.id(), "request entered");
        for plugin in self.plugins_at(MountPoint::Enter) {
            plugin.enter(&ctx);
        }
        ctx.advance(RequestState::Entered);
        RequestScope {
            pipeline: self,
            ctx,
            finished: false,
        }
    }

    /// Dispatches the `filter_identity_postdata` filter.
    pub fn filter_identity_postdata(
        &self,
        postdata: RequestArgs,
        ctx: &RequestContext,
    ) -> Result<RequestArgs, HookError> {
        ctx.advance(RequestState::Resolving);
        self.run_filter(MountPoint::FilterIdentityPostdata, postdata, ctx, |p, v| {
            p.filter_identity_postdata(v, ctx)
        })
    }

    /// Dispatches the `filter_protected_corpora` filter.
    pub fn filter_protected_corpora(
        &self,
        corpora: Vec<String>,
        ctx: &RequestContext,
    ) -> Result<Vec<String>, HookError> {
        ctx.advance(RequestState::Resolving);
        self.run_filter(MountPoint::FilterProtectedCorpora, corpora, ctx, |p, v| {
            p.filter_protected_corpora(v, ctx)
        })
    }

    /// Dispatches the `filter_result` filter.
    pub fn filter_result(&self, result: Value, ctx: &RequestContext) -> Result<Value, HookError> {
        let out = self.run_filter(MountPoint::FilterResult, result, ctx, |p, v| {
            p.filter_result(v, ctx)
        })?;
        ctx.advance(RequestState::ResultFiltered);
        Ok(out)
    }

    /// Dispatches the `log` action.
    pub fn log(&self, entry: &LogEntry, ctx: &RequestContext) {
        for plugin in self.plugins_at(MountPoint::Log) {
            plugin.log(entry, ctx);
        }
    }

    /// Dispatches `exit` and releases the context. Runs at most once per
    /// context.
    fn finish_request(&self, ctx: &RequestContext) {
        if ctx.state() == RequestState::Exited {
            return;
        }
        let end = Utc::now();
        let elapsed = ctx.elapsed();
        for plugin in self.plugins_at(MountPoint::Exit) {
            plugin.exit(end, elapsed, ctx);
        }
        ctx.release();
        tracing::debug!(
            request_id = %ctx.id(),
            elapsed_ms = elapsed.as_millis() as u64,
            "request exited"
        );
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("plugins", &self.plugin_names())
            .finish()
    }
}

/// A request in flight: owns its [`RequestContext`] and guarantees that
/// `exit` runs exactly once.
///
/// Call [`finish`](Self::finish) on the normal path. If the scope is
/// dropped instead (an error was propagated with `?`, or the caller was
/// cancelled), `exit` runs from `Drop`.
pub struct RequestScope<'p> {
    pipeline: &'p Pipeline,
    ctx: RequestContext,
    finished: bool,
}

impl RequestScope<'_> {
    /// The request's context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Dispatches `exit` and releases the context.
    pub fn finish(mut self) {
        self.finished = true;
        self.pipeline.finish_request(&self.ctx);
    }
}

impl Deref for RequestScope<'_> {
    type Target = RequestContext;

    fn deref(&self) -> &RequestContext {
        &self.ctx
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(request_id = %self.ctx.id(), "request scope dropped before finish");
            self.pipeline.finish_request(&self.ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPlugin;
    use corpauth_types::StoreError;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn journal() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn appender(tag: &'static str) -> MockPlugin {
        MockPlugin::new(tag, &[MountPoint::FilterProtectedCorpora]).on_corpora(move |mut v| {
            v.push(tag.to_string());
            Ok(v)
        })
    }

    // ── Registration ─────────────────────────────────────────

    #[test]
    fn register_assigns_ranks_in_order() {
        let mut p = Pipeline::new();
        assert_eq!(p.register(Box::new(MockPlugin::all_points("a"))), Ok(0));
        assert_eq!(p.register(Box::new(MockPlugin::all_points("b"))), Ok(1));
        assert_eq!(p.plugin_names(), ["a", "b"]);
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut p = Pipeline::new();
        p.register(Box::new(MockPlugin::all_points("a"))).expect("first");
        let err = p
            .register(Box::new(MockPlugin::all_points("a")))
            .expect_err("duplicate");
        assert_eq!(err, HookError::DuplicatePlugin("a".into()));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn implementors_follow_declarations() {
        let mut p = Pipeline::new();
        p.register(Box::new(MockPlugin::new("log", &[MountPoint::Log])))
            .expect("register");
        p.register(Box::new(MockPlugin::all_points("all")))
            .expect("register");
        assert_eq!(p.implementors(MountPoint::Log), ["log", "all"]);
        assert_eq!(p.implementors(MountPoint::Enter), ["all"]);
    }

    #[test]
    fn duplicated_declaration_runs_once() {
        let mut p = Pipeline::new();
        let plugin = MockPlugin::new("twice", &[MountPoint::Enter, MountPoint::Enter]);
        let counter = plugin.call_count.clone();
        p.register(Box::new(plugin)).expect("register");
        p.begin(RequestArgs::new(), RequestEnv::new()).finish();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    // ── Filter composition ───────────────────────────────────

    #[test]
    fn filter_composes_in_registration_order() {
        let mut p = Pipeline::new();
        p.register(Box::new(appender("A"))).expect("register");
        p.register(Box::new(appender("B"))).expect("register");
        let scope = p.begin(RequestArgs::new(), RequestEnv::new());
        let out = p
            .filter_protected_corpora(vec!["X".into()], &scope)
            .expect("filter");
        assert_eq!(out, ["X", "A", "B"]);
    }

    #[test]
    fn removing_plugin_changes_result() {
        let mut p = Pipeline::new();
        p.register(Box::new(appender("A"))).expect("register");
        let scope = p.begin(RequestArgs::new(), RequestEnv::new());
        let out = p.filter_protected_corpora(vec![], &scope).expect("filter");
        assert_eq!(out, ["A"]);
    }

    #[test]
    fn filter_without_implementors_is_identity() {
        let p = Pipeline::new();
        let scope = p.begin(RequestArgs::new(), RequestEnv::new());
        let out = p.filter_result(json!({"k": 1}), &scope).expect("filter");
        assert_eq!(out, json!({"k": 1}));
        assert_eq!(scope.state(), RequestState::ResultFiltered);
    }

    #[test]
    fn non_implementor_not_called() {
        let mut p = Pipeline::new();
        let plugin = MockPlugin::new("enter-only", &[MountPoint::Enter]);
        let counter = plugin.call_count.clone();
        p.register(Box::new(plugin)).expect("register");
        let scope = p.begin(RequestArgs::new(), RequestEnv::new());
        p.filter_result(json!({}), &scope).expect("filter");
        p.log(
            &LogEntry::new(crate::LogLevel::Info, "c", "i", json!(null)),
            &scope,
        );
        scope.finish();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn filter_error_stops_chain() {
        let mut p = Pipeline::new();
        let failing = MockPlugin::new("db", &[MountPoint::FilterProtectedCorpora])
            .on_corpora(|_| Err(StoreError::connection("gone").into()));
        let after = appender("after");
        let after_calls = after.call_count.clone();
        p.register(Box::new(failing)).expect("register");
        p.register(Box::new(after)).expect("register");

        let scope = p.begin(RequestArgs::new(), RequestEnv::new());
        let err = p
            .filter_protected_corpora(vec![], &scope)
            .expect_err("should fail");
        assert!(err.as_store_error().is_some());
        assert_eq!(after_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    // ── Lifecycle ────────────────────────────────────────────

    #[test]
    fn lifecycle_order_across_plugins() {
        let j = journal();
        let mut p = Pipeline::new();
        p.register(Box::new(MockPlugin::all_points("a").with_journal(j.clone())))
            .expect("register");
        p.register(Box::new(MockPlugin::all_points("b").with_journal(j.clone())))
            .expect("register");

        let scope = p.begin(RequestArgs::new(), RequestEnv::new());
        let args = p
            .filter_identity_postdata(RequestArgs::new(), &scope)
            .expect("postdata");
        assert_eq!(args, RequestArgs::new());
        p.filter_result(json!({}), &scope).expect("result");
        scope.finish();

        assert_eq!(
            *j.lock(),
            vec![
                "a:enter",
                "b:enter",
                "a:filter_identity_postdata",
                "b:filter_identity_postdata",
                "a:filter_result",
                "b:filter_result",
                "a:exit",
                "b:exit",
            ]
        );
    }

    #[test]
    fn states_progress_through_lifecycle() {
        let p = Pipeline::new();
        let scope = p.begin(RequestArgs::new(), RequestEnv::new());
        assert_eq!(scope.state(), RequestState::Entered);
        p.filter_identity_postdata(RequestArgs::new(), &scope)
            .expect("postdata");
        assert_eq!(scope.state(), RequestState::Resolving);
        p.filter_result(json!({}), &scope).expect("result");
        assert_eq!(scope.state(), RequestState::ResultFiltered);
    }

    #[test]
    fn drop_runs_exit_once() {
        let mut p = Pipeline::new();
        let plugin = MockPlugin::new("exit", &[MountPoint::Exit]);
        let counter = plugin.call_count.clone();
        p.register(Box::new(plugin)).expect("register");

        {
            let scope = p.begin(RequestArgs::new(), RequestEnv::new());
            scope.set("k", json!(1));
            // dropped without finish()
        }
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);

        p.begin(RequestArgs::new(), RequestEnv::new()).finish();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn exit_runs_when_resolution_fails() {
        fn failing_request(p: &Pipeline) -> Result<(), HookError> {
            let scope = p.begin(RequestArgs::new(), RequestEnv::new());
            p.filter_protected_corpora(vec![], &scope)?;
            scope.finish();
            Ok(())
        }

        let j = journal();
        let mut p = Pipeline::new();
        p.register(Box::new(
            MockPlugin::all_points("db")
                .with_journal(j.clone())
                .on_corpora(|_| {
                    Err(StoreError::Unavailable {
                        attempts: 2,
                        reason: "down".into(),
                    }
                    .into())
                }),
        ))
        .expect("register");

        assert!(failing_request(&p).is_err());
        assert_eq!(j.lock().last().map(String::as_str), Some("db:exit"));
    }

    #[test]
    fn scratch_released_at_exit() {
        struct Peek(Arc<Mutex<Option<usize>>>);
        impl Plugin for Peek {
            fn name(&self) -> &str {
                "peek"
            }
            fn mount_points(&self) -> &[MountPoint] {
                &[MountPoint::Enter, MountPoint::Exit]
            }
            fn enter(&self, ctx: &RequestContext) {
                ctx.set("peek.seen", json!(true));
            }
            fn exit(
                &self,
                _end: chrono::DateTime<Utc>,
                _elapsed: std::time::Duration,
                ctx: &RequestContext,
            ) {
                *self.0.lock() = Some(ctx.scratch_len());
            }
        }

        let seen = Arc::new(Mutex::new(None));
        let mut p = Pipeline::new();
        p.register(Box::new(Peek(seen.clone()))).expect("register");

        let scope = p.begin(RequestArgs::new(), RequestEnv::new());
        assert_eq!(scope.get("peek.seen"), Some(json!(true)));
        scope.finish();
        // Scratch was still visible during exit
        assert_eq!(*seen.lock(), Some(1));
    }

    #[test]
    fn concurrent_requests_do_not_share_scratch() {
        struct Tagger;
        impl Plugin for Tagger {
            fn name(&self) -> &str {
                "tagger"
            }
            fn mount_points(&self) -> &[MountPoint] {
                &[MountPoint::Enter, MountPoint::FilterResult]
            }
            fn enter(&self, ctx: &RequestContext) {
                ctx.set("tagger.user", json!(ctx.args().get("remote_user")));
            }
            fn filter_result(
                &self,
                mut result: Value,
                ctx: &RequestContext,
            ) -> Result<Value, HookError> {
                result["user"] = ctx.get("tagger.user").unwrap_or(Value::Null);
                Ok(result)
            }
        }

        let mut p = Pipeline::new();
        p.register(Box::new(Tagger)).expect("register");
        let p = Arc::new(p);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let p = Arc::clone(&p);
                std::thread::spawn(move || {
                    let user = format!("user{i}");
                    let scope =
                        p.begin(RequestArgs::new().with("remote_user", &user), RequestEnv::new());
                    let out = p.filter_result(json!({}), &scope).expect("result");
                    scope.finish();
                    (user, out)
                })
            })
            .collect();

        for h in handles {
            let (user, out) = h.join().expect("thread");
            assert_eq!(out["user"], json!(user));
        }
    }
}
