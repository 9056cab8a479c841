//! Plugin pipeline for corpauth.
//!
//! # Crate Architecture
//!
//! ```text
//! corpauth-types    : RequestId, IdentityAttributes, PermissionResult
//!         ↑
//! corpauth-hook     : MountPoint, Plugin, Pipeline, RequestContext  ◄── HERE
//!         ↑
//! corpauth-runtime  : builtin plugins, AuthService
//! ```
//!
//! # Overview
//!
//! A request passes six mount points. Plugins register once per process
//! and declare which mount points they implement:
//!
//! | Mount point                | Kind   | Value threaded      |
//! |----------------------------|--------|---------------------|
//! | `enter`                    | action | -                   |
//! | `filter_identity_postdata` | filter | request arguments   |
//! | `filter_protected_corpora` | filter | corpus id list      |
//! | `filter_result`            | filter | outbound JSON       |
//! | `log`                      | action | [`LogEntry`]        |
//! | `exit`                     | action | -                   |
//!
//! Filters run in registration order, each receiving the previous
//! plugin's output. A failing filter stops the chain.
//!
//! # Example
//!
//! ```
//! use corpauth_hook::{HookError, MountPoint, Pipeline, Plugin, RequestContext};
//! use corpauth_types::{RequestArgs, RequestEnv};
//!
//! struct Extra;
//!
//! impl Plugin for Extra {
//!     fn name(&self) -> &str {
//!         "extra"
//!     }
//!     fn mount_points(&self) -> &[MountPoint] {
//!         &[MountPoint::FilterProtectedCorpora]
//!     }
//!     fn filter_protected_corpora(
//!         &self,
//!         mut corpora: Vec<String>,
//!         _ctx: &RequestContext,
//!     ) -> Result<Vec<String>, HookError> {
//!         corpora.push("SECRET".to_string());
//!         Ok(corpora)
//!     }
//! }
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.register(Box::new(Extra)).expect("register");
//!
//! let scope = pipeline.begin(RequestArgs::new(), RequestEnv::new());
//! let corpora = pipeline.filter_protected_corpora(vec![], &scope).expect("filter");
//! assert_eq!(corpora, ["SECRET"]);
//! scope.finish();
//! ```

mod config;
mod context;
mod error;
mod pipeline;
mod plugin;
mod point;

pub use config::{resolve_plugin_config, resolve_plugin_config_with, HandleNotFound};
pub use context::{RequestContext, RequestState};
pub use error::HookError;
pub use pipeline::{Pipeline, RequestScope};
pub use plugin::{LogEntry, LogLevel, Plugin};
pub use point::{MountKind, MountPoint};

#[cfg(any(test, feature = "test-utils"))]
pub use plugin::testing;
