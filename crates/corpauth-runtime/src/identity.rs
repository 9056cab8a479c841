//! Identity normalization.
//!
//! Reads the identity asserted by the authentication layer (Shibboleth
//! environment variables, or headers set by a reverse proxy) and rewrites
//! the request arguments to carry it.

use corpauth_types::identity::{AFFILIATION, ENTITLEMENT, REMOTE_USER};
use corpauth_types::{RequestArgs, RequestEnv};
use serde::{Deserialize, Serialize};

/// Environment keys consulted by the [`IdentityNormalizer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityKeys {
    /// Key of the username.
    pub user_key: String,
    /// Keys of the affiliation, tried in order.
    pub affiliation_keys: Vec<String>,
    /// Key of the entitlement list.
    pub entitlement_key: String,
}

impl Default for IdentityKeys {
    fn default() -> Self {
        Self {
            user_key: "REMOTE_USER".into(),
            affiliation_keys: vec![
                "HTTP_UNSCOPED_AFFILIATION".into(),
                "HTTP_AFFILIATION".into(),
            ],
            entitlement_key: "HTTP_ENTITLEMENT".into(),
        }
    }
}

/// Turns a transport environment into identity request arguments.
#[derive(Debug, Clone, Default)]
pub struct IdentityNormalizer {
    keys: IdentityKeys,
}

impl IdentityNormalizer {
    /// Creates a normalizer reading `keys`.
    #[must_use]
    pub fn new(keys: IdentityKeys) -> Self {
        Self { keys }
    }

    /// Keys this normalizer reads.
    #[must_use]
    pub fn keys(&self) -> &IdentityKeys {
        &self.keys
    }

    /// Value of logical key `key`.
    ///
    /// The environment variable wins when set and non-empty. Otherwise the
    /// derived header name `Name` (see [`header_name`]) is tried as
    /// `X-Name`, then `Name`. Returns `""` when nothing matches.
    #[must_use]
    pub fn lookup<'a>(&self, env: &'a RequestEnv, key: &str) -> &'a str {
        if let Some(value) = env.var(key).filter(|v| !v.is_empty()) {
            return value;
        }
        let name = header_name(key);
        env.header(&format!("X-{name}"))
            .filter(|v| !v.is_empty())
            .or_else(|| env.header(&name).filter(|v| !v.is_empty()))
            .unwrap_or("")
    }

    /// Identity arguments for `env`, or `None` if no username is asserted.
    ///
    /// The affiliation is lower-cased; the entitlement is kept raw.
    #[must_use]
    pub fn normalize(&self, env: &RequestEnv) -> Option<RequestArgs> {
        let user = self.lookup(env, &self.keys.user_key);
        if user.is_empty() {
            return None;
        }
        let affiliation = self
            .keys
            .affiliation_keys
            .iter()
            .map(|k| self.lookup(env, k))
            .find(|v| !v.is_empty())
            .unwrap_or("");
        let entitlement = self.lookup(env, &self.keys.entitlement_key);

        Some(
            RequestArgs::new()
                .with(REMOTE_USER, user)
                .with(AFFILIATION, affiliation.to_lowercase())
                .with(ENTITLEMENT, entitlement),
        )
    }

    /// Rewrites `postdata` with the asserted identity.
    ///
    /// The three identity keys are replaced; other arguments (`format`,
    /// `debug`) are kept. Without an asserted username the identity keys
    /// are blanked, so posted values never stand in for an identity the
    /// authentication layer did not assert.
    #[must_use]
    pub fn apply(&self, mut postdata: RequestArgs, env: &RequestEnv) -> RequestArgs {
        match self.normalize(env) {
            Some(identity) => {
                for (key, value) in identity.iter() {
                    postdata.insert(key, value);
                }
            }
            None => {
                for key in [REMOTE_USER, AFFILIATION, ENTITLEMENT] {
                    postdata.insert(key, "");
                }
            }
        }
        postdata
    }
}

/// Header name derived from an environment key.
///
/// Strips a leading `HTTP_`, turns `_` into `-` and title-cases each
/// alphabetic run: `HTTP_UNSCOPED_AFFILIATION` → `Unscoped-Affiliation`.
#[must_use]
pub fn header_name(key: &str) -> String {
    let stripped = key.strip_prefix("HTTP_").unwrap_or(key);
    let mut out = String::with_capacity(stripped.len());
    let mut prev_alpha = false;
    for c in stripped.chars() {
        let c = if c == '_' { '-' } else { c };
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
