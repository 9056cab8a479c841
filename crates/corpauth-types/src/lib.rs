//! Core types for corpauth.
//!
//! This crate holds the vocabulary shared by every other corpauth crate:
//! request identifiers, the identity attributes asserted by a caller, the
//! permission verdict, the outbound decision payload and the error-code
//! contract.
//!
//! # Crate Architecture
//!
//! ```text
//! corpauth-types    : RequestId, IdentityAttributes, PermissionResult,
//!         ↑           DecisionPayload, ErrorCode, StoreError  ◄── HERE
//! corpauth-hook     : MountPoint, Plugin, Pipeline, RequestContext
//!         ↑
//! corpauth-runtime  : identity normalizer, resolver, store adapter,
//!         ↑           builtin plugins, AuthService, AuthConfig
//! corpauth-cli      : command-line transport
//! ```
//!
//! # Example
//!
//! ```
//! use corpauth_types::{CorporaFormat, DecisionPayload, PermissionResult};
//!
//! let result = PermissionResult::authenticated(["corpus1", "CORPUS1", "other"]);
//! assert_eq!(result.corpora.len(), 2);
//!
//! let payload = DecisionPayload::from_result(&result, CorporaFormat::Short, Some("a@example.edu"));
//! assert!(payload.authenticated);
//! ```

pub mod error;
pub mod id;
pub mod identity;
pub mod permission;

pub use error::{assert_error_code, ErrorCode, StoreError};
pub use id::RequestId;
pub use identity::{IdentityAttributes, RequestArgs, RequestEnv};
pub use permission::{
    canonical_corpus_id, CorporaEncoding, CorporaFormat, DecisionPayload, PermissionResult,
    PermittedResources, ReadGrant,
};
