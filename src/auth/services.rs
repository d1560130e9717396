//! Account flows shared by the GraphQL mutations.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::jwt::AuthTokens;
use super::otp::{self, OtpPurpose};
use super::password::verify_password;
use super::session;
use super::social::SocialProvider;
use crate::error::{AppError, AppResult};
use crate::i18n::Locale;
use crate::notify::{send_templated_email, EmailTemplate, SmsMessage, TemplateLocals};
use crate::state::AppState;
use crate::users::{NewUser, User, UserChanges};

/// A signed-in user with a fresh token pair.
#[derive(Debug)]
pub struct SignedIn {
    pub user: User,
    pub tokens: AuthTokens,
    pub created: bool,
}

async fn send_email_otp(state: &AppState, user: &User) -> AppResult<()> {
    let code = otp::issue(&*state.store, OtpPurpose::Email, user.id, state.config.otp_ttl_seconds).await?;
    send_templated_email(
        &*state.notifier,
        &state.config.notify.mail_from,
        &user.email,
        EmailTemplate::Otp,
        &Locale::new(&user.language),
        TemplateLocals {
            name: &user.first_name,
            token: &code,
        },
    )
    .await;
    Ok(())
}

/// Stores a fresh session for `user` on `client_id`.
async fn sign_in(state: &AppState, client_id: &str, user: User, created: bool) -> AppResult<SignedIn> {
    let tokens = session::start(&*state.store, &state.keys, user.id, client_id, &user.language).await?;
    Ok(SignedIn { user, tokens, created })
}

/// The account behind an email/password pair; unknown emails and wrong
/// passwords are indistinguishable.
fn check_credentials(user: Option<User>, password: &str) -> AppResult<User> {
    let user = user.ok_or(AppError::InvalidCredentials)?;
    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "wrong password");
        return Err(AppError::InvalidCredentials);
    }
    Ok(user)
}

#[instrument(skip(state, new))]
pub async fn register_with_email(state: &AppState, client_id: &str, new: NewUser) -> AppResult<SignedIn> {
    let new = new.validate()?;
    let user = User::create_with_email(&state.db, &*state.storage, new).await?;
    send_email_otp(state, &user).await?;
    sign_in(state, client_id, user, true).await
}

#[instrument(skip(state, password))]
pub async fn login_with_email(state: &AppState, client_id: &str, email: &str, password: &str) -> AppResult<SignedIn> {
    let user = check_credentials(User::find_by_email(&state.db, email).await?, password)?;
    sign_in(state, client_id, user, false).await
}

#[instrument(skip(state, token))]
pub async fn login_with_social(
    state: &AppState,
    client_id: &str,
    locale: &Locale,
    provider: SocialProvider,
    token: &str,
) -> AppResult<SignedIn> {
    let profile = state.social.verify(provider, token).await?;
    let (user, created) = User::find_or_create_social(&state.db, &profile, locale.as_str()).await?;
    info!(user_id = %user.id, created, ?provider, "social login");
    sign_in(state, client_id, user, created).await
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<AuthTokens> {
    let (_, tokens) = session::rotate(&*state.store, &state.keys, refresh_token).await?;
    Ok(tokens)
}

/// Idempotent: a missing or invalid access token is not an error.
#[instrument(skip(state, access_token))]
pub async fn logout(state: &AppState, access_token: Option<&str>, client_id: &str, all: bool) -> AppResult<()> {
    let Some(claims) = access_token.and_then(|t| state.keys.decode_allow_expired(t).ok()) else {
        return Ok(());
    };
    session::end(&*state.store, &state.keys, claims.sub, client_id, all).await
}

/// Mails an email OTP to the user, if there is one.
pub async fn request_email_otp(state: &AppState, user_id: Option<Uuid>) -> AppResult<()> {
    let Some(user_id) = user_id else {
        return Ok(());
    };
    if let Some(user) = User::find_by_id(&state.db, user_id).await? {
        send_email_otp(state, &user).await?;
    }
    Ok(())
}

#[instrument(skip(state, token))]
pub async fn verify_email(state: &AppState, user_id: Uuid, token: &str) -> AppResult<User> {
    otp::consume(&*state.store, OtpPurpose::Email, user_id, token).await?;
    let user = User::verify_email(&state.db, user_id).await?;
    send_templated_email(
        &*state.notifier,
        &state.config.notify.mail_from,
        &user.email,
        EmailTemplate::Welcome,
        &Locale::new(&user.language),
        TemplateLocals {
            name: &user.first_name,
            token: "",
        },
    )
    .await;
    Ok(user)
}

pub async fn request_phone_otp(state: &AppState, user_id: Uuid) -> AppResult<()> {
    let user = User::find_by_id(&state.db, user_id).await?.ok_or(AppError::NotFound)?;
    let phone = user.phone_number.as_deref().ok_or(AppError::PhoneNumberRequired)?;
    let code = otp::issue(&*state.store, OtpPurpose::Phone, user.id, state.config.otp_ttl_seconds).await?;
    let text = Locale::new(&user.language).t_with(crate::i18n::SMS_OTP_BODY, &[("token", &code)]);
    if let Err(e) = state
        .notifier
        .send_sms(SmsMessage {
            to: phone.to_string(),
            text,
        })
        .await
    {
        warn!(error = %e, user_id = %user.id, "sms delivery failed");
    }
    Ok(())
}

#[instrument(skip(state, token))]
pub async fn verify_phone_number(state: &AppState, user_id: Uuid, token: &str) -> AppResult<User> {
    otp::consume(&*state.store, OtpPurpose::Phone, user_id, token).await?;
    User::verify_phone_number(&state.db, user_id).await
}

/// Mails a reset code when the account exists; callers always report success.
#[instrument(skip(state))]
pub async fn request_password_reset(state: &AppState, email: &str) -> AppResult<()> {
    let Some(user) = User::find_by_email(&state.db, email).await? else {
        info!("password reset for unknown email");
        return Ok(());
    };
    let code = otp::issue(
        &*state.store,
        OtpPurpose::PasswordReset,
        user.id,
        state.config.otp_ttl_seconds,
    )
    .await?;
    send_templated_email(
        &*state.notifier,
        &state.config.notify.mail_from,
        &user.email,
        EmailTemplate::PasswordReset,
        &Locale::new(&user.language),
        TemplateLocals {
            name: &user.first_name,
            token: &code,
        },
    )
    .await;
    Ok(())
}

/// Consumes the reset code, sets the password and signs out every client.
#[instrument(skip(state, token, password))]
pub async fn reset_password(state: &AppState, email: &str, token: &str, password: &str) -> AppResult<User> {
    UserChanges {
        password: Some(password.to_string()),
        ..Default::default()
    }
    .validate()?;
    let user = User::find_by_email(&state.db, email)
        .await?
        .ok_or(AppError::TokenInvalid)?;
    otp::consume(&*state.store, OtpPurpose::PasswordReset, user.id, token).await?;
    let user = User::update_password(&state.db, user.id, password).await?;
    session::end(&*state.store, &state.keys, user.id, "", true).await?;
    Ok(user)
}
