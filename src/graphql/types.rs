use async_graphql::{Context, InputObject, Object, SimpleObject, ID};
use time::OffsetDateTime;
use uuid::Uuid;

use super::context::ContextExt;
use crate::auth::jwt::AuthTokens;
use crate::auth::social::SocialProvider;
use crate::error::{AppError, AppResult};
use crate::files::links::{avatar_picture, ImageResize, Picture};
use crate::i18n::Locale;
use crate::pagination::{Page, PageInfo};
use crate::roles::RoleGrant;
use crate::users::{NewUser, User, UserChanges};

/// GraphQL view of a user.
pub struct UserObject(pub User);

impl From<User> for UserObject {
    fn from(user: User) -> Self {
        Self(user)
    }
}

#[Object(name = "User")]
impl UserObject {
    async fn id(&self) -> ID {
        ID(self.0.id.to_string())
    }

    async fn first_name(&self) -> &str {
        &self.0.first_name
    }

    async fn last_name(&self) -> &str {
        &self.0.last_name
    }

    async fn full_name(&self) -> String {
        self.0.full_name()
    }

    async fn user_name(&self) -> Option<&str> {
        self.0.user_name.as_deref()
    }

    async fn email(&self) -> &str {
        &self.0.email
    }

    async fn email_verified(&self) -> bool {
        self.0.email_verified
    }

    async fn phone_number(&self) -> Option<&str> {
        self.0.phone_number.as_deref()
    }

    async fn phone_number_verified(&self) -> bool {
        self.0.phone_number_verified
    }

    async fn language(&self) -> &str {
        &self.0.language
    }

    #[graphql(name = "socialAvatarURL")]
    async fn social_avatar_url(&self) -> Option<&str> {
        self.0.social_avatar_url.as_deref()
    }

    /// Uploaded avatar through the image handler, else the social avatar.
    async fn picture(&self, ctx: &Context<'_>, resize: Option<ImageResize>) -> async_graphql::Result<Option<Picture>> {
        let state = ctx.app();
        let avatar = self
            .0
            .avatar(&state.db)
            .await
            .map_err(|e| AppError::Internal(e).into_graphql(&ctx.locale()))?;
        if let Some(file) = avatar {
            return Ok(Some(avatar_picture(
                &state.config.storage.image_cdn_url,
                &file,
                resize.as_ref(),
            )));
        }
        Ok(self.0.social_avatar_url.as_ref().map(|url| Picture {
            url: url.clone(),
            thumbnail: url.clone(),
        }))
    }

    /// Whether this is the caller's own account.
    async fn is_owner(&self, ctx: &Context<'_>) -> bool {
        ctx.current_user_id() == Some(self.0.id)
    }

    async fn roles(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<RoleGrant>> {
        RoleGrant::for_user(&ctx.app().db, self.0.id)
            .await
            .map_err(|e| AppError::Internal(e).into_graphql(&ctx.locale()))
    }

    async fn created_at(&self) -> OffsetDateTime {
        self.0.created_at
    }

    async fn updated_at(&self) -> OffsetDateTime {
        self.0.updated_at
    }
}

#[derive(SimpleObject)]
#[graphql(name = "UserConnection")]
pub struct UserConnection {
    pub items: Vec<UserObject>,
    pub page_info: PageInfo,
    pub total_count: i64,
}

impl From<Page<User>> for UserConnection {
    fn from(page: Page<User>) -> Self {
        Self {
            items: page.items.into_iter().map(UserObject).collect(),
            page_info: page.page_info,
            total_count: page.total_count,
        }
    }
}

// ---- payloads ----

#[derive(SimpleObject, Debug, Clone, PartialEq, Eq)]
#[graphql(name = "FieldError")]
pub struct FieldErrorObject {
    pub field: String,
    pub message: String,
}

/// Fields shared by every mutation payload.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub errors: Vec<FieldErrorObject>,
}

impl Outcome {
    pub fn ok(key: &str, locale: &Locale) -> Self {
        Self::ok_with(key, locale, &[])
    }

    pub fn ok_with(key: &str, locale: &Locale, args: &[(&str, &str)]) -> Self {
        Self {
            success: true,
            code: key.to_string(),
            message: locale.t_with(key, args),
            errors: Vec::new(),
        }
    }

    pub fn fail(error: &AppError, locale: &Locale) -> Self {
        Self {
            success: false,
            code: error.code().to_string(),
            message: error.message(locale),
            errors: error
                .field_errors()
                .iter()
                .map(|fe| FieldErrorObject {
                    field: fe.field.to_string(),
                    message: locale.t(fe.message),
                })
                .collect(),
        }
    }
}

pub trait Payload: Sized {
    fn from_outcome(outcome: Outcome) -> Self;
}

/// Expected failures become `success: false` payloads; authentication,
/// authorization and internal failures stay GraphQL errors.
pub fn settle<P: Payload>(result: AppResult<P>, locale: &Locale) -> async_graphql::Result<P> {
    match result {
        Ok(payload) => Ok(payload),
        Err(e @ (AppError::Unauthenticated | AppError::Forbidden | AppError::Internal(_))) => {
            Err(e.into_graphql(locale))
        }
        Err(e) => Ok(P::from_outcome(Outcome::fail(&e, locale))),
    }
}

#[derive(SimpleObject, Debug, Clone)]
#[graphql(name = "Response")]
pub struct MessagePayload {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub errors: Vec<FieldErrorObject>,
}

impl Payload for MessagePayload {
    fn from_outcome(o: Outcome) -> Self {
        Self {
            success: o.success,
            code: o.code,
            message: o.message,
            errors: o.errors,
        }
    }
}

#[derive(SimpleObject)]
pub struct UserPayload {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub errors: Vec<FieldErrorObject>,
    pub user: Option<UserObject>,
}

impl Payload for UserPayload {
    fn from_outcome(o: Outcome) -> Self {
        Self {
            success: o.success,
            code: o.code,
            message: o.message,
            errors: o.errors,
            user: None,
        }
    }
}

impl UserPayload {
    pub fn new(outcome: Outcome, user: User) -> Self {
        Self {
            user: Some(UserObject(user)),
            ..Self::from_outcome(outcome)
        }
    }
}

#[derive(SimpleObject)]
pub struct AuthPayload {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub errors: Vec<FieldErrorObject>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserObject>,
}

impl Payload for AuthPayload {
    fn from_outcome(o: Outcome) -> Self {
        Self {
            success: o.success,
            code: o.code,
            message: o.message,
            errors: o.errors,
            access_token: None,
            refresh_token: None,
            user: None,
        }
    }
}

impl AuthPayload {
    pub fn new(outcome: Outcome, tokens: AuthTokens, user: Option<User>) -> Self {
        Self {
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            user: user.map(UserObject),
            ..Self::from_outcome(outcome)
        }
    }
}

// ---- inputs ----

#[derive(InputObject, Debug)]
pub struct RegisterInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub user_name: Option<String>,
    pub phone_number: Option<String>,
    pub language: Option<String>,
}

impl From<RegisterInput> for NewUser {
    fn from(input: RegisterInput) -> Self {
        NewUser {
            first_name: input.first_name,
            last_name: input.last_name,
            user_name: input.user_name,
            email: input.email,
            phone_number: input.phone_number,
            password: input.password,
            language: input.language,
            social_avatar_url: None,
        }
    }
}

#[derive(InputObject, Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(InputObject, Debug)]
pub struct SocialLoginInput {
    pub provider: SocialProvider,
    pub token: String,
}

#[derive(InputObject, Debug)]
pub struct ResetPasswordInput {
    pub email: String,
    pub token: String,
    pub password: String,
}

#[derive(InputObject, Debug, Default)]
pub struct UpdateMeInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_name: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
    pub language: Option<String>,
    #[graphql(name = "socialAvatarURL")]
    pub social_avatar_url: Option<String>,
}

impl From<UpdateMeInput> for UserChanges {
    fn from(input: UpdateMeInput) -> Self {
        UserChanges {
            first_name: input.first_name,
            last_name: input.last_name,
            user_name: input.user_name,
            phone_number: input.phone_number,
            password: input.password,
            language: input.language,
            social_avatar_url: input.social_avatar_url,
        }
    }
}

/// Parses a GraphQL ID into a UUID, reporting `NotFound` for garbage.
pub fn parse_id(id: &ID) -> AppResult<Uuid> {
    Uuid::parse_str(id.as_str()).map_err(|_| AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use crate::i18n;

    #[test]
    fn settle_turns_expected_errors_into_payloads() {
        let locale = Locale::default();
        let err = AppError::Validation(vec![FieldError::new("email", i18n::INVALID_EMAIL)]);
        let payload = settle::<MessagePayload>(Err(err), &locale).unwrap();
        assert!(!payload.success);
        assert_eq!(payload.code, "ValidationFailed");
        assert_eq!(
            payload.errors,
            vec![FieldErrorObject {
                field: "email".into(),
                message: "Invalid email address.".into()
            }]
        );
    }

    #[test]
    fn settle_keeps_auth_errors_as_graphql_errors() {
        let locale = Locale::default();
        assert!(settle::<MessagePayload>(Err(AppError::Forbidden), &locale).is_err());
        assert!(settle::<MessagePayload>(Err(AppError::Unauthenticated), &locale).is_err());
    }

    #[test]
    fn success_outcome_carries_key_and_message() {
        let o = Outcome::ok_with(i18n::WELCOME_BACK, &Locale::new("fr"), &[("firstName", "Léa")]);
        assert!(o.success);
        assert_eq!(o.code, "WelcomeBack");
        assert_eq!(o.message, "Bon retour, Léa !");
    }
}
