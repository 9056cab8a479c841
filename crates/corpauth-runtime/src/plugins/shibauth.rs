//! Shibboleth identity plugin.

use crate::identity::{IdentityKeys, IdentityNormalizer};
use corpauth_hook::{
    resolve_plugin_config, HandleNotFound, HookError, MountPoint, Plugin, RequestContext,
};
use corpauth_types::RequestArgs;

/// Plugin name.
pub const NAME: &str = "shibauth";

/// Rewrites the request arguments with the identity asserted by
/// Shibboleth (environment) or the reverse proxy (headers).
///
/// Options are the [`IdentityKeys`]:
///
/// ```toml
/// [plugins.options.shibauth]
/// user_key = "REMOTE_USER"
/// affiliation_keys = ["HTTP_UNSCOPED_AFFILIATION", "HTTP_AFFILIATION"]
/// entitlement_key = "HTTP_ENTITLEMENT"
/// ```
#[derive(Debug, Default)]
pub struct ShibAuthPlugin {
    normalizer: IdentityNormalizer,
}

impl ShibAuthPlugin {
    /// Creates the plugin reading `keys`.
    #[must_use]
    pub fn new(keys: IdentityKeys) -> Self {
        Self {
            normalizer: IdentityNormalizer::new(keys),
        }
    }

    /// Creates the plugin from option overrides.
    ///
    /// # Errors
    ///
    /// See [`resolve_plugin_config`].
    pub fn from_options(
        overrides: Option<&toml::Table>,
        policy: HandleNotFound,
    ) -> Result<Self, HookError> {
        let keys: IdentityKeys = resolve_plugin_config(NAME, overrides, policy)?;
        Ok(Self::new(keys))
    }
}

impl Plugin for ShibAuthPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn mount_points(&self) -> &[MountPoint] {
        &[MountPoint::FilterIdentityPostdata]
    }

    fn filter_identity_postdata(
        &self,
        postdata: RequestArgs,
        ctx: &RequestContext,
    ) -> Result<RequestArgs, HookError> {
        let args = self.normalizer.apply(postdata, ctx.env());
        tracing::trace!(
            request_id = %ctx.id(),
            asserted = !args.get(corpauth_types::identity::REMOTE_USER).is_empty(),
            "identity postdata filtered"
        );
        Ok(args)
    }
}
