//! In-memory authorization store.

use super::{AuthorizationStore, PermissionQuery};
use corpauth_types::StoreError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

/// Licence classes understood by the permission lookup.
pub const LICENSE_ACA: &str = "ACA";
/// Academic licence restricted to Finnish users.
pub const LICENSE_ACA_FI: &str = "ACA-Fi";

#[derive(Debug, Default)]
struct Tables {
    academic: BTreeSet<String>,
    licenses: BTreeMap<String, String>,
    allow: BTreeSet<(String, String)>,
    lbr_map: BTreeSet<(String, String)>,
}

/// Authorization store held in memory.
///
/// Mirrors the relational layout (`auth_academic`, `auth_license`,
/// `auth_allow`, `auth_lbr_map`) and evaluates the same lookups. Every
/// call is recorded, and a failure can be injected for the next calls.
///
/// # Example
///
/// ```
/// use corpauth_runtime::store::{AuthorizationStore, MemoryStore};
///
/// let store = MemoryStore::new()
///     .with_license("corpus_aca", "ACA")
///     .with_license("open_corpus", "PUB");
/// assert_eq!(store.protected_resources().unwrap(), ["corpus_aca"]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    calls: Mutex<Vec<String>>,
    failure: Mutex<Option<StoreError>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `person` to `auth_academic`.
    #[must_use]
    pub fn with_academic(self, person: &str) -> Self {
        self.tables.lock().academic.insert(person.to_string());
        self
    }

    /// Sets the licence of `corpus` in `auth_license`.
    #[must_use]
    pub fn with_license(self, corpus: &str, license: &str) -> Self {
        self.tables
            .lock()
            .licenses
            .insert(corpus.to_string(), license.to_string());
        self
    }

    /// Adds a `(person, corpus)` row to `auth_allow`.
    #[must_use]
    pub fn with_allow(self, person: &str, corpus: &str) -> Self {
        self.tables
            .lock()
            .allow
            .insert((person.to_string(), corpus.to_string()));
        self
    }

    /// Adds a `(lbr_id, corpus)` row to `auth_lbr_map`.
    #[must_use]
    pub fn with_lbr_mapping(self, lbr_id: &str, corpus: &str) -> Self {
        self.tables
            .lock()
            .lbr_map
            .insert((lbr_id.to_string(), corpus.to_string()));
        self
    }

    /// Makes every following call fail with `err` until [`recover`](Self::recover).
    pub fn fail_with(&self, err: StoreError) {
        *self.failure.lock() = Some(err);
    }

    /// Clears an injected failure.
    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Names of the operations called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of operations called so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn record(&self, op: &str) -> Result<(), StoreError> {
        self.calls.lock().push(op.to_string());
        match self.failure.lock().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl AuthorizationStore for MemoryStore {
    fn academic_status(&self, username: &str) -> Result<bool, StoreError> {
        self.record("academic_status")?;
        Ok(self.tables.lock().academic.contains(username))
    }

    fn permitted_resources(&self, query: &PermissionQuery) -> Result<Vec<String>, StoreError> {
        self.record("permitted_resources")?;
        let tables = self.tables.lock();
        let mut out: BTreeSet<String> = BTreeSet::new();

        if query.academic {
            out.extend(
                tables
                    .licenses
                    .iter()
                    .filter(|(_, license)| {
                        license.as_str() == LICENSE_ACA
                            || (license.as_str() == LICENSE_ACA_FI && query.top_domain == "fi")
                    })
                    .map(|(corpus, _)| corpus.clone()),
            );
        }
        out.extend(
            tables
                .allow
                .iter()
                .filter(|(person, _)| *person == query.username)
                .map(|(_, corpus)| corpus.clone()),
        );
        out.extend(
            tables
                .lbr_map
                .iter()
                .filter(|(lbr_id, _)| query.entitlement.contains(lbr_id))
                .map(|(_, corpus)| corpus.clone()),
        );

        Ok(out.into_iter().collect())
    }

    fn protected_resources(&self) -> Result<Vec<String>, StoreError> {
        self.record("protected_resources")?;
        Ok(self
            .tables
            .lock()
            .licenses
            .iter()
            .filter(|(_, license)| !license.starts_with("PUB"))
            .map(|(corpus, _)| corpus.clone())
            .collect())
    }
}
