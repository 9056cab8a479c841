//! Mount points of the request lifecycle.
//!
//! A mount point is either a *filter* (a value is threaded through every
//! implementing plugin) or an *action* (plugins run for side effects).

use crate::HookError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Invocation kind of a mount point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountKind {
    /// Each plugin may replace the value; the final value goes downstream.
    Filter,
    /// Plugins observe; return values are discarded.
    Action,
}

/// All mount points where plugins can be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountPoint {
    /// Request entered the pipeline; the context has just been created.
    Enter,
    /// Rewrite the request arguments before identity is read from them.
    FilterIdentityPostdata,
    /// Extend the list of corpora that require authorization.
    FilterProtectedCorpora,
    /// Rewrite the outbound result.
    FilterResult,
    /// General logging tap other components can raise.
    Log,
    /// Request is leaving the pipeline; the context is released after this.
    Exit,
}

impl MountPoint {
    /// Every mount point, in lifecycle order.
    pub const ALL: [MountPoint; 6] = [
        Self::Enter,
        Self::FilterIdentityPostdata,
        Self::FilterProtectedCorpora,
        Self::FilterResult,
        Self::Log,
        Self::Exit,
    ];

    /// Returns the invocation kind.
    #[must_use]
    pub fn kind(&self) -> MountKind {
        match self {
            Self::FilterIdentityPostdata | Self::FilterProtectedCorpora | Self::FilterResult => {
                MountKind::Filter
            }
            Self::Enter | Self::Log | Self::Exit => MountKind::Action,
        }
    }

    /// Returns `true` for filter mount points.
    #[must_use]
    pub fn is_filter(&self) -> bool {
        self.kind() == MountKind::Filter
    }

    /// Returns `true` for action mount points.
    #[must_use]
    pub fn is_action(&self) -> bool {
        self.kind() == MountKind::Action
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::FilterIdentityPostdata => "filter_identity_postdata",
            Self::FilterProtectedCorpora => "filter_protected_corpora",
            Self::FilterResult => "filter_result",
            Self::Log => "log",
            Self::Exit => "exit",
        }
    }
}

impl FromStr for MountPoint {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| HookError::UnknownMountPoint(s.to_string()))
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
