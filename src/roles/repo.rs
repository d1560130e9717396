use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Permission, Role, RoleGrant};

async fn with_permissions(db: &PgPool, roles: Vec<Role>) -> anyhow::Result<Vec<RoleGrant>> {
    let ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
    let permissions = sqlx::query_as::<_, Permission>(
        r#"
        SELECT id, role_id, action, resource
          FROM permissions
         WHERE role_id = ANY($1)
         ORDER BY action, resource
        "#,
    )
    .bind(&ids)
    .fetch_all(db)
    .await
    .context("load permissions")?;

    Ok(roles
        .into_iter()
        .map(|role| RoleGrant {
            permissions: permissions
                .iter()
                .filter(|p| p.role_id == role.id)
                .cloned()
                .collect(),
            id: role.id,
            name: role.name,
            description: role.description,
        })
        .collect())
}

impl RoleGrant {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<RoleGrant>> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT id, name, description FROM roles ORDER BY name",
        )
        .fetch_all(db)
        .await
        .context("list roles")?;
        with_permissions(db, roles).await
    }

    pub async fn for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<RoleGrant>> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name, r.description
              FROM roles r
              JOIN user_roles ur ON ur.role_id = r.id
             WHERE ur.user_id = $1
             ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
        .context("list user roles")?;
        with_permissions(db, roles).await
    }

    /// Links existing roles to a user; unknown ids and existing links are skipped.
    pub async fn attach(db: &PgPool, user_id: Uuid, role_ids: &[Uuid]) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            SELECT $1, id FROM roles WHERE id = ANY($2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_ids)
        .execute(db)
        .await
        .context("attach roles")?;
        Ok(res.rows_affected())
    }

    pub async fn detach_all(db: &PgPool, user_id: Uuid) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(db)
            .await
            .context("detach roles")?;
        Ok(res.rows_affected())
    }
}
