mod permissions;
mod repo;

pub use permissions::{UserPermissions, ADMIN_ROLE};

use async_graphql::{ComplexObject, SimpleObject};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Permission {
    pub id: Uuid,
    pub role_id: Uuid,
    pub action: String,
    pub resource: String,
}

impl Permission {
    /// `action:resource`, e.g. `read:users`.
    pub fn scope(&self) -> String {
        format!("{}:{}", self.action, self.resource)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// A role together with the permissions it grants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, SimpleObject)]
#[graphql(name = "Role", complex)]
pub struct RoleGrant {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[graphql(skip)]
    pub permissions: Vec<Permission>,
}

#[ComplexObject]
impl RoleGrant {
    /// Granted scopes as `action:resource`.
    async fn permissions(&self) -> Vec<String> {
        self.scopes()
    }
}

impl RoleGrant {
    pub fn scopes(&self) -> Vec<String> {
        self.permissions.iter().map(Permission::scope).collect()
    }
}
