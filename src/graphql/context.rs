use async_graphql::Context;
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::error::AppError;
use crate::i18n::Locale;
use crate::roles::UserPermissions;
use crate::state::AppState;

/// Per-request data resolved from the HTTP headers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Claims of a valid access token.
    pub claims: Option<Claims>,
    /// Raw bearer token, even when it failed verification.
    pub access_token: Option<String>,
    pub client_id: String,
    pub locale: Locale,
}

pub trait ContextExt {
    fn app(&self) -> &AppState;
    fn request(&self) -> &RequestContext;
    fn locale(&self) -> Locale;
    fn current_user_id(&self) -> Option<Uuid>;
    /// The caller's id, or an `Unauthenticated` error.
    fn require_user(&self) -> async_graphql::Result<Uuid>;
}

impl<'a> ContextExt for Context<'a> {
    fn app(&self) -> &AppState {
        self.data_unchecked::<AppState>()
    }

    fn request(&self) -> &RequestContext {
        self.data_unchecked::<RequestContext>()
    }

    fn locale(&self) -> Locale {
        self.data_opt::<RequestContext>()
            .map(|r| r.locale.clone())
            .unwrap_or_default()
    }

    fn current_user_id(&self) -> Option<Uuid> {
        self.data_opt::<RequestContext>()
            .and_then(|r| r.claims.as_ref())
            .map(|c| c.sub)
    }

    fn require_user(&self) -> async_graphql::Result<Uuid> {
        self.current_user_id()
            .ok_or_else(|| AppError::Unauthenticated.into_graphql(&self.locale()))
    }
}

/// Loads the caller's roles through the permission cache.
pub async fn load_permissions(ctx: &Context<'_>) -> async_graphql::Result<UserPermissions> {
    let user_id = ctx.require_user()?;
    let state = ctx.app();
    UserPermissions::load(&state.db, &*state.store, user_id)
        .await
        .map_err(|e| AppError::Internal(e).into_graphql(&ctx.locale()))
}
