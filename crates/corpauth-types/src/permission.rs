//! Permission verdict and the outbound decision payload.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Result of permission resolution for one request.
///
/// `corpora` holds canonical (upper-case) identifiers; the set type makes
/// duplicates impossible. Iteration order is sorted but not part of the
/// contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResult {
    /// Whether a username was asserted.
    pub authenticated: bool,
    /// Permitted corpus identifiers, upper-case.
    pub corpora: BTreeSet<String>,
}

impl PermissionResult {
    /// The verdict for anonymous callers: unauthenticated, no corpora.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// An authenticated verdict; identifiers are canonicalized to upper
    /// case and deduplicated.
    pub fn authenticated<I, S>(corpora: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            authenticated: true,
            corpora: corpora
                .into_iter()
                .map(|c| canonical_corpus_id(c.as_ref()))
                .collect(),
        }
    }

    /// Returns `true` if `corpus` (any case) is permitted.
    #[must_use]
    pub fn permits(&self, corpus: &str) -> bool {
        self.corpora.contains(&canonical_corpus_id(corpus))
    }
}

/// Canonical form of a corpus identifier.
#[must_use]
pub fn canonical_corpus_id(id: &str) -> String {
    id.to_uppercase()
}

/// Encoding of the corpora set in the outbound payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorporaFormat {
    /// Mapping from identifier to `{"read": true}`.
    #[default]
    Map,
    /// Bare list of identifiers (`format=short`).
    Short,
}

impl CorporaFormat {
    /// Selects the encoding from the inbound `format` argument.
    #[must_use]
    pub fn from_arg(format: &str) -> Self {
        if format == "short" {
            Self::Short
        } else {
            Self::Map
        }
    }
}

/// Grant value in the map encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadGrant {
    /// Always `true` for permitted corpora.
    pub read: bool,
}

/// Corpora as they appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorporaEncoding {
    /// `["A", "B"]`
    List(Vec<String>),
    /// `{"A": {"read": true}}`
    Map(BTreeMap<String, ReadGrant>),
}

impl CorporaEncoding {
    /// Encodes a corpora set in the given format.
    #[must_use]
    pub fn encode(corpora: &BTreeSet<String>, format: CorporaFormat) -> Self {
        match format {
            CorporaFormat::Short => Self::List(corpora.iter().cloned().collect()),
            CorporaFormat::Map => Self::Map(
                corpora
                    .iter()
                    .map(|c| (c.clone(), ReadGrant { read: true }))
                    .collect(),
            ),
        }
    }

    /// Number of corpora.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::List(v) => v.len(),
            Self::Map(m) => m.len(),
        }
    }

    /// Returns `true` if no corpora are encoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `permitted_resources` section of the decision payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermittedResources {
    /// Encoded corpora.
    pub corpora: CorporaEncoding,
    /// Validated username, `null` when anonymous or redacted.
    pub username: Option<String>,
}

/// Outbound decision payload.
///
/// ```json
/// {"authenticated": true,
///  "permitted_resources": {"corpora": {"C1": {"read": true}}, "username": "u"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPayload {
    /// Whether a username was asserted.
    pub authenticated: bool,
    /// Permitted resources.
    pub permitted_resources: PermittedResources,
}

impl DecisionPayload {
    /// Builds the payload for a verdict.
    #[must_use]
    pub fn from_result(
        result: &PermissionResult,
        format: CorporaFormat,
        username: Option<&str>,
    ) -> Self {
        Self {
            authenticated: result.authenticated,
            permitted_resources: PermittedResources {
                corpora: CorporaEncoding::encode(&result.corpora, format),
                username: username.map(str::to_string),
            },
        }
    }

    /// Returns a copy with the username removed, for logging.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.permitted_resources.username = None;
        copy
    }
}
