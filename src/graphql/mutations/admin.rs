//! User administration. Role changes drop the cached permissions of the user.

use async_graphql::{Context, Object, Result, ID};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::session;
use crate::error::{AppError, AppResult};
use crate::graphql::context::ContextExt;
use crate::graphql::guards::{PermissionGuard, RoleGuard};
use crate::graphql::types::{parse_id, settle, Outcome, RegisterInput, UserPayload};
use crate::i18n;
use crate::roles::{RoleGrant, UserPermissions, ADMIN_ROLE};
use crate::state::AppState;
use crate::users::{NewUser, User};

#[derive(Default)]
pub struct AdminMutations;

async fn invalidate_permissions(state: &AppState, user_id: Uuid) {
    if let Err(e) = UserPermissions::invalidate(&*state.store, user_id).await {
        warn!(error = ?e, %user_id, "failed to invalidate permissions");
    }
}

async fn reload(state: &AppState, user_id: Uuid) -> AppResult<User> {
    User::find_by_id(&state.db, user_id).await?.ok_or(AppError::NotFound)
}

#[Object]
impl AdminMutations {
    #[graphql(guard = "PermissionGuard::any(&[\"create:users\"])")]
    async fn create_user(&self, ctx: &Context<'_>, input: RegisterInput) -> Result<UserPayload> {
        let req = ctx.request();
        let result = async {
            let new = NewUser::from(input).validate()?;
            let user = User::create(&ctx.app().db, new, false).await?;
            info!(user_id = %user.id, "user created by admin");
            Ok::<_, AppError>(UserPayload::new(Outcome::ok(i18n::USER_CREATED, &req.locale), user))
        }
        .await;
        settle(result, &req.locale)
    }

    #[graphql(guard = "PermissionGuard::any(&[\"delete:users\"])")]
    async fn delete_user(&self, ctx: &Context<'_>, id: ID) -> Result<UserPayload> {
        let req = ctx.request();
        let state = ctx.app();
        let result = async {
            let user_id = parse_id(&id)?;
            let user = User::delete(&state.db, &*state.storage, user_id)
                .await?
                .ok_or(AppError::NotFound)?;
            session::end(&*state.store, &state.keys, user_id, "", true).await?;
            invalidate_permissions(state, user_id).await;
            info!(%user_id, "user deleted");
            Ok::<_, AppError>(UserPayload::new(Outcome::ok(i18n::USER_DELETED, &req.locale), user))
        }
        .await;
        settle(result, &req.locale)
    }

    #[graphql(guard = "RoleGuard::any(&[ADMIN_ROLE])")]
    async fn attach_roles_to_user(&self, ctx: &Context<'_>, user_id: ID, role_ids: Vec<ID>) -> Result<UserPayload> {
        let req = ctx.request();
        let state = ctx.app();
        let result = async {
            let user_id = parse_id(&user_id)?;
            let role_ids = role_ids.iter().map(parse_id).collect::<AppResult<Vec<_>>>()?;
            let user = reload(state, user_id).await?;
            let attached = RoleGrant::attach(&state.db, user.id, &role_ids).await?;
            invalidate_permissions(state, user_id).await;
            info!(%user_id, attached, "roles attached");
            Ok::<_, AppError>(UserPayload::new(Outcome::ok(i18n::ROLES_ATTACHED, &req.locale), user))
        }
        .await;
        settle(result, &req.locale)
    }

    #[graphql(guard = "RoleGuard::any(&[ADMIN_ROLE])")]
    async fn detach_all_roles_from_user(&self, ctx: &Context<'_>, user_id: ID) -> Result<UserPayload> {
        let req = ctx.request();
        let state = ctx.app();
        let result = async {
            let user_id = parse_id(&user_id)?;
            let user = reload(state, user_id).await?;
            let detached = RoleGrant::detach_all(&state.db, user_id).await?;
            invalidate_permissions(state, user_id).await;
            info!(%user_id, detached, "roles detached");
            Ok::<_, AppError>(UserPayload::new(Outcome::ok(i18n::ROLES_DETACHED, &req.locale), user))
        }
        .await;
        settle(result, &req.locale)
    }
}
