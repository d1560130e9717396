use async_graphql::{Context, Json, Object, Result, ID};

use super::context::{load_permissions, ContextExt};
use super::guards::{AuthGuard, PermissionGuard};
use super::types::{parse_id, UserConnection, UserObject};
use crate::error::AppError;
use crate::pagination::PageInput;
use crate::roles::RoleGrant;
use crate::users::User;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The signed-in user, or null.
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<UserObject>> {
        let Some(user_id) = ctx.current_user_id() else {
            return Ok(None);
        };
        let user = User::find_by_id(&ctx.app().db, user_id)
            .await
            .map_err(|e| AppError::Internal(e).into_graphql(&ctx.locale()))?;
        Ok(user.map(UserObject))
    }

    /// Any user for holders of `read:users`; otherwise only oneself.
    #[graphql(guard = "AuthGuard")]
    async fn user(&self, ctx: &Context<'_>, id: ID) -> Result<Option<UserObject>> {
        let locale = ctx.locale();
        let Ok(user_id) = parse_id(&id) else {
            return Ok(None);
        };
        if ctx.current_user_id() != Some(user_id) && !load_permissions(ctx).await?.has_permission(&["read:users"]) {
            return Err(AppError::Forbidden.into_graphql(&locale));
        }
        let user = User::find_by_id(&ctx.app().db, user_id)
            .await
            .map_err(|e| AppError::Internal(e).into_graphql(&locale))?;
        Ok(user.map(UserObject))
    }

    /// Cursor-paginated users matching `filter`.
    #[graphql(guard = "PermissionGuard::any(&[\"read:users\"])")]
    async fn users(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] page: PageInput,
        filter: Option<Json<serde_json::Value>>,
    ) -> Result<UserConnection> {
        let page = User::page(&ctx.app().db, &page, filter.as_ref().map(|f| &f.0))
            .await
            .map_err(|e| e.into_graphql(&ctx.locale()))?;
        Ok(page.into())
    }

    #[graphql(guard = "PermissionGuard::any(&[\"read:roles\"])")]
    async fn roles(&self, ctx: &Context<'_>) -> Result<Vec<RoleGrant>> {
        RoleGrant::list(&ctx.app().db)
            .await
            .map_err(|e| AppError::Internal(e).into_graphql(&ctx.locale()))
    }
}
