//! Runtime for the corpauth authorization decision service.
//!
//! # Crate Architecture
//!
//! ```text
//! corpauth-types    : RequestArgs, IdentityAttributes, PermissionResult
//!         ↑
//! corpauth-hook     : Plugin, Pipeline, RequestContext
//!         ↑
//! corpauth-runtime  : identity, resolver, store, plugins, AuthService  ◄── HERE
//!         ↑
//! corpauth-cli      : `corpauth` binary
//! ```
//!
//! # Modules
//!
//! | Module       | Role |
//! |--------------|------|
//! | [`config`]   | Layered TOML / environment configuration |
//! | [`identity`] | Asserted identity from environment or headers |
//! | [`resolver`] | Corpus permissions for an identity |
//! | [`store`]    | Authorization store, retrying adapter, backends |
//! | [`plugins`]  | Builtin plugins and pipeline assembly |
//! | [`service`]  | One request, end to end |
//!
//! # Example
//!
//! ```
//! use corpauth_runtime::plugins::ShibAuthPlugin;
//! use corpauth_runtime::service::AuthService;
//! use corpauth_runtime::store::MemoryStore;
//! use corpauth_hook::Pipeline;
//! use corpauth_types::{RequestArgs, RequestEnv};
//! use std::sync::Arc;
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.register(Box::new(ShibAuthPlugin::default())).expect("register");
//!
//! let store = MemoryStore::new().with_license("corpus_aca", "ACA");
//! let service = AuthService::new(Arc::new(pipeline), Arc::new(store));
//!
//! let env = RequestEnv::new()
//!     .with_var("REMOTE_USER", "alice@uni.fi")
//!     .with_var("HTTP_UNSCOPED_AFFILIATION", "staff");
//! let out = service.handle(RequestArgs::new(), env).expect("decision");
//! assert_eq!(out["permitted_resources"]["corpora"]["CORPUS_ACA"]["read"], true);
//! ```

pub mod config;
pub mod identity;
pub mod plugins;
pub mod resolver;
pub mod service;
pub mod store;

pub use config::{AuthConfig, ConfigError, ConfigLoader};
pub use identity::{IdentityKeys, IdentityNormalizer};
pub use plugins::build_pipeline;
pub use resolver::PermissionResolver;
pub use service::{AuthService, ServiceError};
pub use store::{AuthorizationStore, MemoryStore, StoreAdapter};
