//! Permission resolution.
//!
//! Turns asserted identity attributes into a [`PermissionResult`]:
//!
//! ```text
//! username ─┬─ empty ───────────────────────────────► unauthenticated
//!           └─ classify ─► academic? ─ no ─► academic_status (store)
//!                              │                     │
//!                              └──────── yes ◄───────┘
//!                                         ▼
//!                              permitted_resources (store)
//!                                         ▼
//!                              upper-case, deduplicate
//! ```

use crate::store::{AuthorizationStore, PermissionQuery};
use corpauth_types::{IdentityAttributes, PermissionResult, StoreError};
use std::sync::Arc;

/// Username suffix of identities from the foreign identity provider.
pub const FOREIGN_IDP_SUFFIX: &str = "@clarin.eu";
/// Username suffix of foreign-provider identities with a Finnish e-mail.
pub const FOREIGN_FI_SUFFIX: &str = ".fi@clarin.eu";
/// Entitlement asserting academic status at the foreign provider.
pub const FOREIGN_ACADEMIC_ENTITLEMENT: &str = "http://www.clarin.eu/entitlement/academic";
/// Registry entitlement granting academic status.
pub const REGISTRY_ACADEMIC_URN: &str = "urn:nbn:fi:lb-2016110710";
/// Affiliation keywords implying academic status.
pub const ACADEMIC_AFFILIATIONS: [&str; 5] = ["member", "employee", "student", "faculty", "staff"];

/// Store-independent facts derived from identity attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Username comes from the foreign identity provider.
    pub foreign_idp: bool,
    /// Foreign-provider username with a Finnish e-mail address.
    pub foreign_fi_email: bool,
    /// Top-level domain used for `ACA-Fi` licences.
    pub top_domain: String,
    /// Entitlement tokens, first occurrence order, no empties.
    pub entitlement: Vec<String>,
    /// Academic status before the local allow-list lookup.
    pub academic: bool,
}

/// Splits an entitlement string on `;`, dropping empty and repeated tokens.
#[must_use]
pub fn tokenize_entitlement(raw: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in raw.split(';').filter(|t| !t.is_empty()) {
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }
    tokens
}

/// Classifies identity attributes without consulting the store.
///
/// Affiliation keywords match as substrings, so `"member@uni.fi"` counts.
#[must_use]
pub fn classify(username: &str, affiliation: &str, entitlement_raw: &str) -> Classification {
    let foreign_idp = username.ends_with(FOREIGN_IDP_SUFFIX);
    let foreign_fi_email = username.ends_with(FOREIGN_FI_SUFFIX);
    let entitlement = tokenize_entitlement(entitlement_raw);
    let has = |urn: &str| entitlement.iter().any(|t| t == urn);

    let academic = (!foreign_idp && ACADEMIC_AFFILIATIONS.iter().any(|k| affiliation.contains(k)))
        || (foreign_idp && has(FOREIGN_ACADEMIC_ENTITLEMENT))
        || has(REGISTRY_ACADEMIC_URN);

    // Academic status of a foreign .fi user came from the registry.
    let top_domain = if academic && foreign_fi_email {
        "fi".to_string()
    } else {
        username.rsplit('.').next().unwrap_or(username).to_string()
    };

    Classification {
        foreign_idp,
        foreign_fi_email,
        top_domain,
        entitlement,
        academic,
    }
}

/// Resolves permissions against an [`AuthorizationStore`].
///
/// Store errors propagate unchanged; the resolver never retries and
/// never produces a partial result.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn AuthorizationStore>,
}

impl PermissionResolver {
    /// Creates a resolver over `store`.
    pub fn new(store: Arc<dyn AuthorizationStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn AuthorizationStore> {
        &self.store
    }

    /// Resolves the permissions of `username`.
    ///
    /// An empty username is unauthenticated and makes no store call.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`] from the academic-status or permitted-resources
    /// lookups.
    pub fn resolve(
        &self,
        username: &str,
        affiliation: &str,
        entitlement_raw: &str,
    ) -> Result<PermissionResult, StoreError> {
        tracing::debug!(username, "resolving permissions");
        if username.is_empty() {
            return Ok(PermissionResult::unauthenticated());
        }

        let class = classify(username, affiliation, entitlement_raw);
        let mut academic = class.academic;
        tracing::debug!(
            academic,
            foreign_idp = class.foreign_idp,
            top_domain = %class.top_domain,
            entitlement = ?class.entitlement,
            "identity classified"
        );

        if !academic && self.store.academic_status(username)? {
            tracing::debug!(username, "academic status granted locally");
            academic = true;
        }

        let query = PermissionQuery {
            academic,
            top_domain: class.top_domain,
            username: username.to_string(),
            entitlement: class.entitlement,
        };
        let corpora = self.store.permitted_resources(&query)?;
        let result = PermissionResult::authenticated(corpora);
        tracing::debug!(corpora = ?result.corpora, "permissions resolved");
        Ok(result)
    }

    /// [`resolve`](Self::resolve) for a set of identity attributes.
    pub fn resolve_identity(
        &self,
        identity: &IdentityAttributes,
    ) -> Result<PermissionResult, StoreError> {
        self.resolve(
            &identity.username,
            &identity.affiliation,
            &identity.entitlement,
        )
    }
}

impl std::fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver").finish_non_exhaustive()
    }
}
