//! Request context: per-request handle passed to every mount point.
//!
//! Plugins are shared by all requests, so anything a plugin needs to carry
//! from one mount point to a later one within the same request (start
//! times, accumulators, the effective log level) goes into the context's
//! scratch store, never into plugin fields.

use chrono::{DateTime, Utc};
use corpauth_types::{RequestArgs, RequestEnv, RequestId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lifecycle state of a request inside the pipeline.
///
/// States only move forward; see [`RequestContext::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestState {
    /// Context created, `enter` not yet dispatched.
    NotStarted,
    /// `enter` has run.
    Entered,
    /// Identity and permission work in progress.
    Resolving,
    /// `filter_result` has run.
    ResultFiltered,
    /// `exit` has run and the scratch store is released.
    Exited,
}

#[derive(Debug)]
struct ContextInner {
    state: RequestState,
    scratch: HashMap<String, Value>,
}

/// Context of one in-flight request.
///
/// Created by [`Pipeline::begin`](crate::Pipeline::begin), valid until
/// the matching `exit` dispatch. The scratch store is released exactly once
/// at exit.
#[derive(Debug)]
pub struct RequestContext {
    id: RequestId,
    started_at: DateTime<Utc>,
    started: Instant,
    args: RequestArgs,
    env: RequestEnv,
    inner: Mutex<ContextInner>,
}

impl RequestContext {
    /// Creates a context for a request with the given arguments and
    /// transport environment.
    #[must_use]
    pub fn new(args: RequestArgs, env: RequestEnv) -> Self {
        Self {
            id: RequestId::new(),
            started_at: Utc::now(),
            started: Instant::now(),
            args,
            env,
            inner: Mutex::new(ContextInner {
                state: RequestState::NotStarted,
                scratch: HashMap::new(),
            }),
        }
    }

    /// Unique identifier of this request.
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wall-clock time the request entered.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time elapsed since the request entered.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Request arguments as received from the transport, before any
    /// `filter_identity_postdata` rewriting.
    #[must_use]
    pub fn args(&self) -> &RequestArgs {
        &self.args
    }

    /// Transport environment of the request.
    #[must_use]
    pub fn env(&self) -> &RequestEnv {
        &self.env
    }

    /// Whether the caller asked for debug output.
    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.args.is_debug()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.inner.lock().state
    }

    /// Moves the request to `state` if that is later than the current one.
    ///
    /// Returns `false` (and leaves the state alone) for backward moves.
    pub fn advance(&self, state: RequestState) -> bool {
        let mut inner = self.inner.lock();
        if state > inner.state {
            inner.state = state;
            true
        } else {
            false
        }
    }

    /// Returns a copy of scratch entry `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().scratch.get(key).cloned()
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.lock().scratch.insert(key.into(), value)
    }

    /// Replaces entry `key` with `f(current)`, where a missing entry reads
    /// as `default`. Returns the new value.
    pub fn update<F>(&self, key: &str, default: Value, f: F) -> Value
    where
        F: FnOnce(Value) -> Value,
    {
        let mut inner = self.inner.lock();
        let current = inner.scratch.remove(key).unwrap_or(default);
        let next = f(current);
        inner.scratch.insert(key.to_string(), next.clone());
        next
    }

    /// Removes entry `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.lock().scratch.remove(key)
    }

    /// Number of scratch entries.
    #[must_use]
    pub fn scratch_len(&self) -> usize {
        self.inner.lock().scratch.len()
    }

    /// Marks the request exited and drops all scratch state.
    ///
    /// Returns `false` if the context was already released.
    pub(crate) fn release(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == RequestState::Exited {
            return false;
        }
        inner.state = RequestState::Exited;
        inner.scratch.clear();
        true
    }
}
