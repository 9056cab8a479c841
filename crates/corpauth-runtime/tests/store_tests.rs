//! Store adapter resilience against a flaky backend.

use corpauth_runtime::resolver::PermissionResolver;
use corpauth_runtime::store::{
    AuthorizationStore, Connection, Connector, Param, Row, StoreAdapter, ACADEMIC_STATUS_SQL,
    PERMITTED_RESOURCES_SQL,
};
use corpauth_types::StoreError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Backend whose connections die after a fixed number of queries.
#[derive(Default)]
struct Flaky {
    /// Queries each connection serves before failing.
    lifetime: usize,
    /// Remaining connect attempts that fail.
    refuse: AtomicUsize,
    connects: AtomicUsize,
    statements: Arc<Mutex<Vec<(String, Vec<Param>)>>>,
}

struct FlakyConn {
    remaining: usize,
    statements: Arc<Mutex<Vec<(String, Vec<Param>)>>>,
}

impl Connector for Flaky {
    type Conn = FlakyConn;

    fn connect(&self) -> Result<FlakyConn, StoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(StoreError::connection("connection refused"));
        }
        Ok(FlakyConn {
            remaining: self.lifetime,
            statements: Arc::clone(&self.statements),
        })
    }
}

impl Connection for FlakyConn {
    fn query(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Row>, StoreError> {
        if self.remaining == 0 {
            return Err(StoreError::connection("server closed the connection"));
        }
        self.remaining -= 1;
        self.statements
            .lock()
            .push((sql.to_string(), params.to_vec()));
        if sql == ACADEMIC_STATUS_SQL {
            Ok(Vec::new())
        } else if sql == PERMITTED_RESOURCES_SQL {
            Ok(vec![
                Row::from_texts(["corpus_a"]),
                Row(vec![None]),
                Row::from_texts(["Corpus_A"]),
            ])
        } else {
            Ok(vec![Row::from_texts(["protected_x"])])
        }
    }
}

fn flaky(lifetime: usize, refuse: usize) -> Flaky {
    Flaky {
        lifetime,
        refuse: AtomicUsize::new(refuse),
        ..Flaky::default()
    }
}

#[test]
fn reconnects_when_connection_dies_between_requests() {
    let adapter = Arc::new(StoreAdapter::new(flaky(2, 0), true));
    let resolver = PermissionResolver::new(adapter.clone());

    let first = resolver.resolve("u@x.org", "", "").expect("first");
    assert_eq!(first.corpora.len(), 1);
    assert!(adapter.is_connected());

    let second = resolver.resolve("u@x.org", "", "").expect("second");
    assert_eq!(second, first);
}

#[test]
fn refused_twice_is_unavailable() {
    let adapter = StoreAdapter::new(flaky(10, 2), true);
    let err = adapter.academic_status("u@x.org").expect_err("down");
    assert_eq!(
        err,
        StoreError::Unavailable {
            attempts: 2,
            reason: "connection refused".into()
        }
    );
    assert!(!adapter.is_connected());

    assert!(!adapter.academic_status("u@x.org").expect("recovered"));
}

#[test]
fn refused_once_recovers() {
    let adapter = StoreAdapter::new(flaky(10, 1), true);
    assert_eq!(
        adapter.protected_resources().expect("listing"),
        ["protected_x"]
    );
}

#[test]
fn caller_values_are_bound_not_inlined() {
    let backend = flaky(10, 0);
    let statements = Arc::clone(&backend.statements);
    let adapter = Arc::new(StoreAdapter::new(backend, false));
    let resolver = PermissionResolver::new(adapter.clone());

    let hostile = "x'; DROP TABLE auth_allow; --@uni.fi";
    resolver
        .resolve(hostile, "", "urn:a;urn:b;urn:a")
        .expect("resolve");

    let seen = statements.lock();
    assert_eq!(seen.len(), 2);
    for (sql, _) in seen.iter() {
        assert!(!sql.contains("DROP"));
    }
    assert_eq!(seen[0].1, [Param::Text(hostile.to_string())]);
    assert_eq!(
        seen[1].1,
        [
            Param::Bool(false),
            Param::Text("fi".into()),
            Param::Text(hostile.to_string()),
            Param::TextList(vec!["urn:a".into(), "urn:b".into()]),
        ]
    );
    assert!(!adapter.is_connected());
}

#[test]
fn non_persistent_connects_per_query() {
    let backend = flaky(10, 0);
    let adapter = StoreAdapter::new(backend, false);
    adapter.protected_resources().expect("one");
    adapter.protected_resources().expect("two");
    assert!(!adapter.is_connected());
}
