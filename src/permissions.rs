//! Permission lookup
//!
//! The gate only needs a yes/no answer for "does this identity hold this
//! permission". Hosts with their own permission backend implement
//! [`PermissionProvider`]; [`ConfigPermissions`] answers from the
//! `permissions` table of the active config.

use std::sync::Arc;

use crate::config::SharedConfig;

/// Permission required for the admin commands.
pub const ADMIN_PERMISSION: &str = "iplimit.admin";

pub trait PermissionProvider: Send + Sync {
    fn has_permission(&self, identity: &str, permission: &str) -> bool;
}

impl<P: PermissionProvider + ?Sized> PermissionProvider for Arc<P> {
    fn has_permission(&self, identity: &str, permission: &str) -> bool {
        (**self).has_permission(identity, permission)
    }
}

/// Grants read from the active configuration, so a reload takes effect
/// for the next check.
#[derive(Debug, Clone)]
pub struct ConfigPermissions {
    config: Arc<SharedConfig>,
}

impl ConfigPermissions {
    pub fn new(config: Arc<SharedConfig>) -> Self {
        Self { config }
    }
}

impl PermissionProvider for ConfigPermissions {
    fn has_permission(&self, identity: &str, permission: &str) -> bool {
        self.config.current().grants(identity, permission)
    }
}

/// Grants nothing. Useful when no identity may bypass the limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPermissions;

impl PermissionProvider for NoPermissions {
    fn has_permission(&self, _identity: &str, _permission: &str) -> bool {
        false
    }
}
