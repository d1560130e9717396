use async_graphql::{Context, Object, Result};
use tracing::info;

use crate::error::AppError;
use crate::graphql::context::ContextExt;
use crate::graphql::guards::AuthGuard;
use crate::graphql::types::{settle, Outcome, UpdateMeInput, UserPayload};
use crate::i18n;
use crate::users::{User, UserChanges};

#[derive(Default)]
pub struct AccountMutations;

#[Object]
impl AccountMutations {
    #[graphql(guard = "AuthGuard")]
    async fn update_me(&self, ctx: &Context<'_>, input: UpdateMeInput) -> Result<UserPayload> {
        let req = ctx.request();
        let user_id = ctx.require_user()?;
        let result = async {
            let changes = UserChanges::from(input).validate()?;
            let user = User::update(&ctx.app().db, user_id, changes).await?;
            info!(%user_id, "profile updated");
            Ok::<_, AppError>(UserPayload::new(Outcome::ok(i18n::PROFILE_UPDATED, &req.locale), user))
        }
        .await;
        settle(result, &req.locale)
    }

    #[graphql(guard = "AuthGuard")]
    async fn delete_avatar(&self, ctx: &Context<'_>) -> Result<UserPayload> {
        let req = ctx.request();
        let user_id = ctx.require_user()?;
        let state = ctx.app();
        let result = User::delete_avatar(&state.db, &*state.storage, user_id)
            .await
            .map(|user| UserPayload::new(Outcome::ok(i18n::AVATAR_DELETED, &req.locale), user));
        settle(result, &req.locale)
    }
}
