use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use super::claims::Claims;
use crate::error::{AppError, LocalizedError};
use crate::i18n::Locale;
use crate::state::AppState;

pub const CLIENT_ID_HEADER: &str = "client_id";

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn request_locale(headers: &HeaderMap) -> Locale {
    headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|h| h.to_str().ok())
        .map(Locale::from_accept_language)
        .unwrap_or_default()
}

/// The calling application; defaults to the first configured client.
pub fn client_id(headers: &HeaderMap, state: &AppState) -> Result<String, AppError> {
    match headers.get(CLIENT_ID_HEADER).and_then(|h| h.to_str().ok()) {
        Some(id) if state.keys.is_known_client(id) => Ok(id.to_string()),
        Some(_) => Err(AppError::InvalidClient),
        None => Ok(state.config.default_client().to_string()),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Locale {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(request_locale(&parts.headers))
    }
}

/// Verified access-token claims of the caller.
pub struct AuthUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = LocalizedError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let locale = request_locale(&parts.headers);
        let token = bearer_token(&parts.headers).ok_or_else(|| AppError::Unauthenticated.localize(&locale))?;
        let claims = state
            .keys
            .verify_access(token)
            .map_err(|e| e.localize(&locale))?;
        Ok(AuthUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn resolves_client_id() {
        let state = AppState::fake();
        let mut headers = HeaderMap::new();
        assert_eq!(client_id(&headers, &state).unwrap(), "web");
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("mobile"));
        assert_eq!(client_id(&headers, &state).unwrap(), "mobile");
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("tv"));
        assert!(matches!(client_id(&headers, &state), Err(AppError::InvalidClient)));
    }

    #[test]
    fn locale_from_accept_language() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_locale(&headers).as_str(), "en");
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("fr-FR,fr;q=0.9"));
        assert_eq!(request_locale(&headers).as_str(), "fr");
    }
}
