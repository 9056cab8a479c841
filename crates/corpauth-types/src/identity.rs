//! Inbound request arguments and identity attributes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key of the asserted username in the request arguments.
pub const REMOTE_USER: &str = "remote_user";
/// Key of the affiliation attribute.
pub const AFFILIATION: &str = "affiliation";
/// Key of the `;`-separated entitlement attribute.
pub const ENTITLEMENT: &str = "entitlement";
/// Key of the optional debug flag.
pub const DEBUG: &str = "debug";
/// Key of the optional corpora encoding flag.
pub const FORMAT: &str = "format";

/// Flat string mapping of the arguments of one request ("postdata").
///
/// This is the value threaded through the `filter_identity_postdata`
/// mount point. Missing keys read as the empty string, matching how the
/// decision service treats absent attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestArgs(BTreeMap<String, String>);

impl RequestArgs {
    /// Creates empty arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds arguments from a JSON object.
    ///
    /// Strings are taken as-is, other scalars are rendered with their JSON
    /// text, `null` becomes the empty string. Returns `None` if `value` is
    /// not an object.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let map = obj
            .iter()
            .map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k.clone(), s)
            })
            .collect();
        Some(Self(map))
    }

    /// Returns the value for `key`, or `""` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    /// Returns `true` if `key` is present (even if empty).
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Sets `key` to `value`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns `true` if the `debug` argument is `1`, `true` or `yes`
    /// (case-insensitive).
    #[must_use]
    pub fn is_debug(&self) -> bool {
        matches!(
            self.get(DEBUG).to_lowercase().as_str(),
            "1" | "true" | "yes"
        )
    }

    /// Returns a copy without `key`, for logging arguments without
    /// personal data.
    #[must_use]
    pub fn without(&self, key: &str) -> Self {
        let mut map = self.0.clone();
        map.remove(key);
        Self(map)
    }

    /// Iterates over all arguments in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the arguments as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Identity attributes asserted for one request.
///
/// Immutable once constructed. `entitlement` is the raw `;`-delimited
/// string; tokenizing it is the resolver's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAttributes {
    /// Asserted username; empty means anonymous.
    pub username: String,
    /// Affiliation text (lower-cased by the normalizer).
    pub affiliation: String,
    /// Raw `;`-separated entitlement tokens.
    pub entitlement: String,
}

impl IdentityAttributes {
    /// Creates identity attributes.
    pub fn new(
        username: impl Into<String>,
        affiliation: impl Into<String>,
        entitlement: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            affiliation: affiliation.into(),
            entitlement: entitlement.into(),
        }
    }

    /// Reads the identity attributes from request arguments.
    #[must_use]
    pub fn from_args(args: &RequestArgs) -> Self {
        Self::new(args.get(REMOTE_USER), args.get(AFFILIATION), args.get(ENTITLEMENT))
    }

    /// Returns `true` if no username was asserted.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }

    /// Returns the username, or `None` for anonymous callers.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        (!self.username.is_empty()).then_some(self.username.as_str())
    }
}

/// Transport-level data of one request: environment variables set by the
/// web server (or authentication module) and HTTP request headers.
///
/// Header names are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnv {
    environ: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    path: String,
}

impl RequestEnv {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: sets environment variable `key`.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environ.insert(key.into(), value.into());
        self
    }

    /// Builder: sets header `name`.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Builder: sets the request path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Returns environment variable `key` if set.
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.environ.get(key).map(String::as_str)
    }

    /// Returns header `name` (case-insensitive) if set.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Request path as seen by the transport.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Originating client address: first hop of `X-Forwarded-For`, else
    /// `REMOTE_ADDR`.
    #[must_use]
    pub fn client_addr(&self) -> Option<&str> {
        self.header("X-Forwarded-For")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| self.var("REMOTE_ADDR"))
    }

    /// `User-Agent` header.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.header("User-Agent")
    }

    /// `Referer` header.
    #[must_use]
    pub fn referrer(&self) -> Option<&str> {
        self.header("Referer")
    }

    /// All environment variables, in key order.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.environ.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_read_as_empty() {
        let args = RequestArgs::new();
        assert_eq!(args.get(REMOTE_USER), "");
        assert!(!args.contains(REMOTE_USER));
    }

    #[test]
    fn from_json_stringifies_scalars() {
        let args = RequestArgs::from_json(&json!({
            "remote_user": "a@example.edu",
            "debug": 1,
            "format": null,
        }))
        .expect("object");
        assert_eq!(args.get("remote_user"), "a@example.edu");
        assert_eq!(args.get("debug"), "1");
        assert_eq!(args.get("format"), "");
        assert!(args.contains("format"));
    }

    #[test]
    fn from_json_rejects_non_object() {
        assert!(RequestArgs::from_json(&json!(["a"])).is_none());
    }

    #[test]
    fn debug_flag_values() {
        for v in ["1", "true", "TRUE", "Yes"] {
            assert!(RequestArgs::new().with(DEBUG, v).is_debug(), "{v}");
        }
        for v in ["", "0", "false", "on"] {
            assert!(!RequestArgs::new().with(DEBUG, v).is_debug(), "{v}");
        }
    }

    #[test]
    fn without_removes_only_that_key() {
        let args = RequestArgs::new()
            .with(REMOTE_USER, "u")
            .with(AFFILIATION, "staff");
        let redacted = args.without(REMOTE_USER);
        assert!(!redacted.contains(REMOTE_USER));
        assert_eq!(redacted.get(AFFILIATION), "staff");
        assert!(args.contains(REMOTE_USER));
    }

    #[test]
    fn identity_from_args() {
        let args = RequestArgs::new()
            .with(REMOTE_USER, "a@example.edu")
            .with(AFFILIATION, "faculty")
            .with(ENTITLEMENT, "urn:a;urn:b");
        let id = IdentityAttributes::from_args(&args);
        assert_eq!(id.username(), Some("a@example.edu"));
        assert_eq!(id.entitlement, "urn:a;urn:b");
        assert!(!id.is_anonymous());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let env = RequestEnv::new().with_header("X-Remote-User", "u");
        assert_eq!(env.header("x-remote-user"), Some("u"));
        assert_eq!(env.header("X-REMOTE-USER"), Some("u"));
    }

    #[test]
    fn client_addr_prefers_forwarded_for() {
        let env = RequestEnv::new()
            .with_var("REMOTE_ADDR", "127.0.0.1")
            .with_header("X-Forwarded-For", "10.0.0.5, 127.0.0.1");
        assert_eq!(env.client_addr(), Some("10.0.0.5"));
        let env = RequestEnv::new().with_var("REMOTE_ADDR", "127.0.0.1");
        assert_eq!(env.client_addr(), Some("127.0.0.1"));
    }

    #[test]
    fn anonymous_identity() {
        let id = IdentityAttributes::from_args(&RequestArgs::new());
        assert!(id.is_anonymous());
        assert_eq!(id.username(), None);
    }
}
