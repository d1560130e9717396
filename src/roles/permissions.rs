use anyhow::Context;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::RoleGrant;
use crate::store::Store;

pub const ADMIN_ROLE: &str = "admin";
const CACHE_TTL_SECS: u64 = 5 * 60;

fn cache_key(user_id: Uuid) -> String {
    format!("permissions:{}", user_id)
}

/// Roles of one user, loaded once per request.
#[derive(Debug, Clone)]
pub struct UserPermissions {
    pub id: Uuid,
    pub roles: Vec<RoleGrant>,
}

impl UserPermissions {
    /// Reads the cached grants or loads and caches them.
    pub async fn load(db: &PgPool, store: &dyn Store, user_id: Uuid) -> anyhow::Result<Self> {
        let key = cache_key(user_id);
        let cached = store.get(&key).await.context("read permission cache")?;
        if let Some(roles) = cached.and_then(|raw| serde_json::from_str::<Vec<RoleGrant>>(&raw).ok()) {
            debug!(%user_id, "permissions from cache");
            return Ok(Self { id: user_id, roles });
        }

        let roles = RoleGrant::for_user(db, user_id).await?;
        let raw = serde_json::to_string(&roles).context("serialize permissions")?;
        store
            .set(&key, &raw, CACHE_TTL_SECS)
            .await
            .context("write permission cache")?;
        Ok(Self { id: user_id, roles })
    }

    pub async fn invalidate(store: &dyn Store, user_id: Uuid) -> anyhow::Result<()> {
        store.remove(&cache_key(user_id)).await
    }

    pub fn has_role(&self, names: &[&str]) -> bool {
        self.roles.iter().any(|r| names.contains(&r.name.as_str()))
    }

    /// Any of `scopes` granted; admins pass every check.
    pub fn has_permission(&self, scopes: &[&str]) -> bool {
        self.has_role(&[ADMIN_ROLE])
            || self
                .roles
                .iter()
                .flat_map(|r| r.permissions.iter())
                .any(|p| scopes.contains(&p.scope().as_str()))
    }
}
