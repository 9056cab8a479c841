//! Request logging plugin.
//!
//! Emits one `tracing` event per logged item, tagged with the request id
//! and a category. Categories and single items can be switched off, and a
//! request carrying a true `debug` argument is logged at debug level.
//!
//! The arguments appear twice in the `params` category: `Params` as
//! posted at `enter`, and `Normalized-params` once the identity filter
//! has rewritten them.
//!
//! Usernames are never logged in clear text: the `auth` category records
//! the MD5 digest of the user and the domain part after `@`.

use crate::service::STORE_TIME_KEY;
use chrono::{DateTime, Utc};
use corpauth_hook::{
    resolve_plugin_config, HandleNotFound, HookError, LogEntry, LogLevel, MountPoint, Plugin,
    RequestContext,
};
use corpauth_types::identity::REMOTE_USER;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Plugin name.
pub const NAME: &str = "logger";

/// Target of the emitted events.
pub const LOG_TARGET: &str = "corpauth::request";

/// All categories.
pub const CATEGORIES: [&str; 8] = [
    "auth", "debug", "env", "params", "referrer", "result", "times", "userinfo",
];

const LEVEL_KEY: &str = "logger.level";

/// Free-form client tag echoed into the `params` category.
const LOGINFO: &str = "loginfo";

/// Logger options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Base level (`debug`, `info`, `warning`, `error`, `critical`).
    pub level: String,
    /// Categories to log.
    pub categories: Vec<String>,
    /// Items never logged (e.g. `"User-agent"`).
    pub exclude_items: Vec<String>,
    /// Log requests with a true `debug` argument at debug level.
    pub enable_debug_param: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            categories: CATEGORIES.iter().map(|c| c.to_string()).collect(),
            exclude_items: Vec::new(),
            enable_debug_param: true,
        }
    }
}

/// Category-filtered request logger.
#[derive(Debug)]
pub struct LoggerPlugin {
    config: LoggerConfig,
    level: LogLevel,
}

impl LoggerPlugin {
    /// Creates the logger.
    #[must_use]
    pub fn new(config: LoggerConfig) -> Self {
        let level = LogLevel::parse_lenient(&config.level);
        Self { config, level }
    }

    /// Creates the logger from option overrides.
    ///
    /// # Errors
    ///
    /// See [`resolve_plugin_config`].
    pub fn from_options(
        overrides: Option<&toml::Table>,
        policy: HandleNotFound,
    ) -> Result<Self, HookError> {
        let config: LoggerConfig = resolve_plugin_config(NAME, overrides, policy)?;
        Ok(Self::new(config))
    }

    /// Whether an item would be logged at `level` for this request.
    #[must_use]
    pub fn enabled(
        &self,
        level: LogLevel,
        category: &str,
        item: &str,
        ctx: &RequestContext,
    ) -> bool {
        level >= self.request_level(ctx)
            && self.config.categories.iter().any(|c| c == category)
            && !self.config.exclude_items.iter().any(|i| i == item)
    }

    fn request_level(&self, ctx: &RequestContext) -> LogLevel {
        ctx.get(LEVEL_KEY)
            .and_then(|v| v.as_str().map(LogLevel::parse_lenient))
            .unwrap_or(self.level)
    }

    fn emit(&self, level: LogLevel, category: &str, item: &str, value: &Value, ctx: &RequestContext) {
        if !self.enabled(level, category, item, ctx) {
            return;
        }
        let id = ctx.id();
        match level {
            LogLevel::Debug => {
                tracing::debug!(target: LOG_TARGET, request_id = %id, category, "{item}: {value}")
            }
            LogLevel::Info => {
                tracing::info!(target: LOG_TARGET, request_id = %id, category, "{item}: {value}")
            }
            LogLevel::Warning => {
                tracing::warn!(target: LOG_TARGET, request_id = %id, category, "{item}: {value}")
            }
            LogLevel::Error | LogLevel::Critical => {
                tracing::error!(target: LOG_TARGET, request_id = %id, category, "{item}: {value}")
            }
        }
    }

    fn info(&self, category: &str, item: &str, value: Value, ctx: &RequestContext) {
        self.emit(LogLevel::Info, category, item, &value, ctx);
    }

    fn debug(&self, category: &str, item: &str, value: Value, ctx: &RequestContext) {
        self.emit(LogLevel::Debug, category, item, &value, ctx);
    }
}

/// MD5 hex digest and domain part of a username.
#[must_use]
pub fn hash_user(user: &str) -> (String, String) {
    let domain = user.split_once('@').map(|(_, d)| d).unwrap_or("");
    (format!("{:x}", md5::compute(user.as_bytes())), domain.to_string())
}

/// Info-level `(category, item, value)` triples logged at `enter`.
///
/// `Params` are the arguments as posted, before identity normalization;
/// the service logs the normalized ones later as `Normalized-params`.
fn enter_items(ctx: &RequestContext) -> Vec<(&'static str, &'static str, Value)> {
    let env = ctx.env();
    let args = ctx.args();
    let command = match env.path().trim_matches('/') {
        "" => "authorize",
        path => path,
    };
    let params = if ctx.is_debug() {
        args.to_json()
    } else {
        args.without(REMOTE_USER).to_json()
    };

    let user = env
        .var("REMOTE_USER")
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| args.get(REMOTE_USER));
    let (auth_user, auth_domain) = if user.is_empty() {
        (Value::Null, Value::Null)
    } else {
        let (digest, domain) = hash_user(user);
        (json!(digest), json!(domain))
    };

    vec![
        ("userinfo", "IP", json!(env.client_addr())),
        ("userinfo", "User-agent", json!(env.user_agent())),
        ("referrer", "Referrer", json!(env.referrer())),
        ("params", "Command", json!(command)),
        ("params", "Params", params),
        ("params", "Loginfo", json!(args.get(LOGINFO))),
        ("auth", "Auth-domain", auth_domain),
        ("auth", "Auth-user", auth_user),
    ]
}

impl Plugin for LoggerPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn mount_points(&self) -> &[MountPoint] {
        &[
            MountPoint::Enter,
            MountPoint::FilterResult,
            MountPoint::Log,
            MountPoint::Exit,
        ]
    }

    fn enter(&self, ctx: &RequestContext) {
        let level = if self.config.enable_debug_param && ctx.is_debug() {
            LogLevel::Debug
        } else {
            self.level
        };
        ctx.set(LEVEL_KEY, json!(level.as_str()));

        for (category, item, value) in enter_items(ctx) {
            self.info(category, item, value, ctx);
        }

        let vars: serde_json::Map<String, Value> = ctx
            .env()
            .vars()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        self.debug("env", "Env", Value::Object(vars), ctx);
    }

    fn filter_result(&self, result: Value, ctx: &RequestContext) -> Result<Value, HookError> {
        self.debug("debug", "Result", result.clone(), ctx);
        Ok(result)
    }

    fn log(&self, entry: &LogEntry, ctx: &RequestContext) {
        self.emit(entry.level, &entry.category, &entry.item, &entry.value, ctx);
    }

    fn exit(&self, _end: DateTime<Utc>, elapsed: Duration, ctx: &RequestContext) {
        let store_ms = ctx
            .get(STORE_TIME_KEY)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        self.info("times", "Store-time-total", json!(store_ms / 1000.0), ctx);
        self.info("times", "Elapsed", json!(elapsed.as_secs_f64()), ctx);
        ctx.remove(LEVEL_KEY);
    }
}
