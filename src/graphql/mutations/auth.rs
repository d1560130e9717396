//! Sign-up, sign-in, sessions and one-time codes.

use async_graphql::{Context, Object, Result};

use crate::auth::services;
use crate::graphql::context::ContextExt;
use crate::graphql::guards::AuthGuard;
use crate::graphql::types::{
    settle, AuthPayload, LoginInput, MessagePayload, Outcome, Payload, RegisterInput, ResetPasswordInput,
    SocialLoginInput, UserPayload,
};
use crate::i18n;

#[derive(Default)]
pub struct AuthMutations;

#[Object]
impl AuthMutations {
    async fn register_with_email(&self, ctx: &Context<'_>, input: RegisterInput) -> Result<AuthPayload> {
        let req = ctx.request();
        let result = services::register_with_email(ctx.app(), &req.client_id, input.into())
            .await
            .map(|signed| AuthPayload::new(Outcome::ok(i18n::ACCOUNT_CREATED, &req.locale), signed.tokens, Some(signed.user)));
        settle(result, &req.locale)
    }

    async fn login_with_email(&self, ctx: &Context<'_>, input: LoginInput) -> Result<AuthPayload> {
        let req = ctx.request();
        let result = services::login_with_email(ctx.app(), &req.client_id, &input.email, &input.password)
            .await
            .map(|signed| {
                let outcome = Outcome::ok_with(
                    i18n::WELCOME_BACK,
                    &req.locale,
                    &[("firstName", signed.user.first_name.as_str())],
                );
                AuthPayload::new(outcome, signed.tokens, Some(signed.user))
            });
        settle(result, &req.locale)
    }

    async fn login_with_social_provider(&self, ctx: &Context<'_>, input: SocialLoginInput) -> Result<AuthPayload> {
        let req = ctx.request();
        let result = services::login_with_social(ctx.app(), &req.client_id, &req.locale, input.provider, &input.token)
            .await
            .map(|signed| {
                let key = if signed.created {
                    i18n::WELCOME_NEW_USER
                } else {
                    i18n::WELCOME_BACK
                };
                let outcome = Outcome::ok_with(key, &req.locale, &[("firstName", signed.user.first_name.as_str())]);
                AuthPayload::new(outcome, signed.tokens, Some(signed.user))
            });
        settle(result, &req.locale)
    }

    async fn refresh_token(&self, ctx: &Context<'_>, token: String) -> Result<AuthPayload> {
        let req = ctx.request();
        let result = services::refresh(ctx.app(), &token)
            .await
            .map(|tokens| AuthPayload::new(Outcome::ok(i18n::TOKEN_REFRESHED, &req.locale), tokens, None));
        settle(result, &req.locale)
    }

    /// Always succeeds; `all` signs out every client application.
    async fn logout(&self, ctx: &Context<'_>, #[graphql(default)] all: bool) -> Result<MessagePayload> {
        let req = ctx.request();
        let result = services::logout(ctx.app(), req.access_token.as_deref(), &req.client_id, all)
            .await
            .map(|_| MessagePayload::from_outcome(Outcome::ok(i18n::LOGGED_OUT, &req.locale)));
        settle(result, &req.locale)
    }

    #[graphql(name = "requestEmailOTP")]
    async fn request_email_otp(&self, ctx: &Context<'_>) -> Result<MessagePayload> {
        let req = ctx.request();
        let result = services::request_email_otp(ctx.app(), ctx.current_user_id())
            .await
            .map(|_| MessagePayload::from_outcome(Outcome::ok(i18n::SENT_EMAIL_OTP, &req.locale)));
        settle(result, &req.locale)
    }

    #[graphql(guard = "AuthGuard")]
    async fn verify_email(&self, ctx: &Context<'_>, token: String) -> Result<UserPayload> {
        let req = ctx.request();
        let user_id = ctx.require_user()?;
        let result = services::verify_email(ctx.app(), user_id, &token)
            .await
            .map(|user| UserPayload::new(Outcome::ok(i18n::EMAIL_VERIFIED, &req.locale), user));
        settle(result, &req.locale)
    }

    #[graphql(name = "requestPhoneOTP", guard = "AuthGuard")]
    async fn request_phone_otp(&self, ctx: &Context<'_>) -> Result<MessagePayload> {
        let req = ctx.request();
        let user_id = ctx.require_user()?;
        let result = services::request_phone_otp(ctx.app(), user_id)
            .await
            .map(|_| MessagePayload::from_outcome(Outcome::ok(i18n::SENT_PHONE_OTP, &req.locale)));
        settle(result, &req.locale)
    }

    #[graphql(guard = "AuthGuard")]
    async fn verify_phone_number(&self, ctx: &Context<'_>, token: String) -> Result<UserPayload> {
        let req = ctx.request();
        let user_id = ctx.require_user()?;
        let result = services::verify_phone_number(ctx.app(), user_id, &token)
            .await
            .map(|user| UserPayload::new(Outcome::ok(i18n::PHONE_NUMBER_VERIFIED, &req.locale), user));
        settle(result, &req.locale)
    }

    async fn request_password_reset(&self, ctx: &Context<'_>, email: String) -> Result<MessagePayload> {
        let req = ctx.request();
        let result = services::request_password_reset(ctx.app(), &email)
            .await
            .map(|_| MessagePayload::from_outcome(Outcome::ok(i18n::PASSWORD_RESET_REQUESTED, &req.locale)));
        settle(result, &req.locale)
    }

    async fn reset_password(&self, ctx: &Context<'_>, input: ResetPasswordInput) -> Result<MessagePayload> {
        let req = ctx.request();
        let result = services::reset_password(ctx.app(), &input.email, &input.token, &input.password)
            .await
            .map(|_| MessagePayload::from_outcome(Outcome::ok(i18n::PASSWORD_UPDATED, &req.locale)));
        settle(result, &req.locale)
    }
}
