//! Field guards.
//!
//! ```ignore
//! #[graphql(guard = "AuthGuard")]
//! #[graphql(guard = "RoleGuard::any(&[\"admin\"])")]
//! #[graphql(guard = "PermissionGuard::any(&[\"read:users\"])")]
//! ```

use std::future::Future;

use async_graphql::{Context, Guard, Result};
use tracing::debug;

use super::context::{load_permissions, ContextExt};
use crate::error::AppError;

/// Requires a signed-in caller.
pub struct AuthGuard;

impl Guard for AuthGuard {
    fn check(&self, ctx: &Context<'_>) -> impl Future<Output = Result<()>> + Send {
        let result = ctx.require_user().map(|_| ());
        async move { result }
    }
}

/// Requires any of the named roles.
pub struct RoleGuard {
    roles: &'static [&'static str],
}

impl RoleGuard {
    pub fn any(roles: &'static [&'static str]) -> Self {
        Self { roles }
    }
}

impl Guard for RoleGuard {
    fn check(&self, ctx: &Context<'_>) -> impl Future<Output = Result<()>> + Send {
        async move {
            let permissions = load_permissions(ctx).await?;
            if permissions.has_role(self.roles) {
                Ok(())
            } else {
                debug!(user_id = %permissions.id, roles = ?self.roles, "role check failed");
                Err(AppError::Forbidden.into_graphql(&ctx.locale()))
            }
        }
    }
}

/// Requires any of the `action:resource` scopes; admins always pass.
pub struct PermissionGuard {
    scopes: &'static [&'static str],
}

impl PermissionGuard {
    pub fn any(scopes: &'static [&'static str]) -> Self {
        Self { scopes }
    }
}

impl Guard for PermissionGuard {
    fn check(&self, ctx: &Context<'_>) -> impl Future<Output = Result<()>> + Send {
        async move {
            let permissions = load_permissions(ctx).await?;
            if permissions.has_permission(self.scopes) {
                Ok(())
            } else {
                debug!(user_id = %permissions.id, scopes = ?self.scopes, "permission check failed");
                Err(AppError::Forbidden.into_graphql(&ctx.locale()))
            }
        }
    }
}
