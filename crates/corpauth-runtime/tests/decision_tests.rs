//! End-to-end decisions through the configured pipeline and an in-memory
//! store.

use corpauth_hook::HandleNotFound;
use corpauth_runtime::plugins::{build_pipeline, ProtectedCorporaPlugin};
use corpauth_runtime::resolver::{FOREIGN_ACADEMIC_ENTITLEMENT, REGISTRY_ACADEMIC_URN};
use corpauth_runtime::{AuthConfig, AuthService, MemoryStore};
use corpauth_types::{ErrorCode, RequestArgs, RequestEnv, StoreError};
use serde_json::json;
use std::sync::Arc;

fn store() -> MemoryStore {
    MemoryStore::new()
        .with_license("aca_corpus", "ACA")
        .with_license("fi_corpus", "ACA-Fi")
        .with_license("open_corpus", "PUB")
        .with_license("res_corpus", "RES")
        .with_academic("visitor@lib.org")
        .with_allow("alice@uni.fi", "res_corpus")
        .with_lbr_mapping("urn:nbn:fi:lb-2019", "res_corpus")
}

fn service(store: MemoryStore) -> AuthService {
    let pipeline = build_pipeline(&AuthConfig::default()).expect("pipeline");
    AuthService::new(Arc::new(pipeline), Arc::new(store))
}

fn corpora(out: &serde_json::Value) -> Vec<String> {
    let mut keys: Vec<String> = out["permitted_resources"]["corpora"]
        .as_object()
        .expect("map encoding")
        .keys()
        .cloned()
        .collect();
    keys.sort();
    keys
}

#[test]
fn finnish_staff_member() {
    let env = RequestEnv::new()
        .with_var("REMOTE_USER", "alice@uni.fi")
        .with_var("HTTP_UNSCOPED_AFFILIATION", "Staff");
    let out = service(store())
        .handle(RequestArgs::new(), env)
        .expect("decision");

    assert_eq!(out["authenticated"], true);
    assert_eq!(out["permitted_resources"]["username"], "alice@uni.fi");
    assert_eq!(corpora(&out), ["ACA_CORPUS", "FI_CORPUS", "RES_CORPUS"]);
}

#[test]
fn faculty_member_gets_academic_licences() {
    let store = MemoryStore::new().with_license("corpus1", "ACA");
    let env = RequestEnv::new()
        .with_var("REMOTE_USER", "a@example.edu")
        .with_var("HTTP_AFFILIATION", "faculty")
        .with_var("HTTP_ENTITLEMENT", "");
    let out = service(store)
        .handle(RequestArgs::new(), env)
        .expect("decision");
    assert_eq!(out["authenticated"], true);
    assert_eq!(corpora(&out), ["CORPUS1"]);
}

#[test]
fn posted_identity_alone_is_anonymous() {
    let store = Arc::new(
        store()
            .with_license("secret", "RES")
            .with_allow("alice@uni.fi", "secret"),
    );
    let pipeline = build_pipeline(&AuthConfig::default()).expect("pipeline");
    let svc = AuthService::new(Arc::new(pipeline), store.clone());
    let args = RequestArgs::new()
        .with("remote_user", "alice@uni.fi")
        .with("affiliation", "staff")
        .with("format", "short");
    let out = svc.handle(args, RequestEnv::new()).expect("decision");
    assert_eq!(
        out,
        json!({"authenticated": false,
               "permitted_resources": {"corpora": [], "username": null}})
    );
    assert_eq!(store.call_count(), 0);
}

#[test]
fn posted_identity_used_without_normalizer() {
    let mut config = AuthConfig::default();
    config.plugins.enabled = vec!["logger".into()];
    let pipeline = build_pipeline(&config).expect("pipeline");
    let svc = AuthService::new(Arc::new(pipeline), Arc::new(store()));
    let args = RequestArgs::new()
        .with("remote_user", "a@example.edu")
        .with("affiliation", "faculty");
    let out = svc.handle(args, RequestEnv::new()).expect("decision");
    assert_eq!(out["permitted_resources"]["username"], "a@example.edu");
    assert_eq!(corpora(&out), ["ACA_CORPUS"]);
}

#[test]
fn non_academic_outside_finland() {
    let env = RequestEnv::new()
        .with_header("X-Remote-User", "guest@example.org")
        .with_header("X-Affiliation", "affiliate");
    let out = service(store())
        .handle(RequestArgs::new(), env)
        .expect("decision");
    assert_eq!(out["authenticated"], true);
    assert!(corpora(&out).is_empty());
}

#[test]
fn local_academic_list() {
    let env = RequestEnv::new().with_var("REMOTE_USER", "visitor@lib.org");
    let out = service(store())
        .handle(RequestArgs::new(), env)
        .expect("decision");
    assert_eq!(corpora(&out), ["ACA_CORPUS"]);
}

#[test]
fn foreign_provider_with_finnish_email() {
    let entitlement = format!("{REGISTRY_ACADEMIC_URN};urn:nbn:fi:lb-2019");
    let env = RequestEnv::new()
        .with_var("REMOTE_USER", "someone.fi@clarin.eu")
        .with_var("HTTP_ENTITLEMENT", entitlement);
    let out = service(store())
        .handle(RequestArgs::new().with("format", "short"), env)
        .expect("decision");
    assert_eq!(
        out["permitted_resources"]["corpora"],
        json!(["ACA_CORPUS", "FI_CORPUS", "RES_CORPUS"])
    );
}

#[test]
fn foreign_provider_academic_entitlement() {
    let env = RequestEnv::new()
        .with_var("REMOTE_USER", "x@clarin.eu")
        .with_var("HTTP_ENTITLEMENT", FOREIGN_ACADEMIC_ENTITLEMENT);
    let out = service(store())
        .handle(RequestArgs::new(), env)
        .expect("decision");
    assert_eq!(corpora(&out), ["ACA_CORPUS"]);
}

#[test]
fn foreign_provider_affiliation_alone_is_not_academic() {
    let env = RequestEnv::new()
        .with_var("REMOTE_USER", "someone@clarin.eu")
        .with_var("HTTP_AFFILIATION", "member");
    let out = service(store())
        .handle(RequestArgs::new(), env)
        .expect("decision");
    assert!(corpora(&out).is_empty());
}

#[test]
fn anonymous_makes_no_store_call() {
    let store = Arc::new(store());
    let pipeline = build_pipeline(&AuthConfig::default()).expect("pipeline");
    let svc = AuthService::new(Arc::new(pipeline), store.clone());
    let out = svc
        .handle(RequestArgs::new(), RequestEnv::new())
        .expect("decision");
    assert_eq!(
        out,
        json!({"authenticated": false,
               "permitted_resources": {"corpora": {}, "username": null}})
    );
    assert_eq!(store.call_count(), 0);
}

#[test]
fn asserted_identity_overrides_posted_user() {
    let env = RequestEnv::new().with_var("REMOTE_USER", "guest@example.org");
    let args = RequestArgs::new()
        .with("remote_user", "alice@uni.fi")
        .with("affiliation", "staff");
    let out = service(store()).handle(args, env).expect("decision");
    assert_eq!(out["permitted_resources"]["username"], "guest@example.org");
    assert!(corpora(&out).is_empty());
}

#[test]
fn store_outage_is_reported() {
    let s = store();
    s.fail_with(StoreError::Unavailable {
        attempts: 2,
        reason: "connection refused".into(),
    });
    let env = RequestEnv::new().with_var("REMOTE_USER", "guest@example.org");
    let err = service(s)
        .handle(RequestArgs::new(), env)
        .expect_err("should fail");
    assert_eq!(err.code(), "STORE_UNAVAILABLE");
    assert!(err.is_recoverable());
}

#[test]
fn protected_listing_through_plugin() {
    let mut config = AuthConfig::default();
    config.plugins.enabled = vec!["logger".into()];
    config.plugins.handle_not_found = HandleNotFound::Error;
    let mut pipeline = build_pipeline(&config).expect("pipeline");
    pipeline
        .register(Box::new(ProtectedCorporaPlugin::with_store(Arc::new(store()))))
        .expect("register");

    let svc = AuthService::new(Arc::new(pipeline), Arc::new(MemoryStore::new()));
    let listed = svc.protected_corpora(RequestEnv::new()).expect("listing");
    assert_eq!(listed, ["ACA_CORPUS", "FI_CORPUS", "RES_CORPUS"]);
}

#[test]
fn concurrent_requests_are_isolated() {
    let svc = Arc::new(service(store()));
    let handles: Vec<_> = ["alice@uni.fi", "guest@example.org"]
        .into_iter()
        .map(|user| {
            let svc = Arc::clone(&svc);
            std::thread::spawn(move || {
                let env = RequestEnv::new().with_var("REMOTE_USER", user);
                let out = svc.handle(RequestArgs::new(), env).expect("decision");
                (user, out)
            })
        })
        .collect();

    for handle in handles {
        let (user, out) = handle.join().expect("thread");
        assert_eq!(out["permitted_resources"]["username"], user);
        let expected: Vec<&str> = if user == "alice@uni.fi" {
            vec!["RES_CORPUS"]
        } else {
            vec![]
        };
        assert_eq!(corpora(&out), expected);
    }
}
