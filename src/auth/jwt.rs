use std::time::Duration;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub issuer: String,
    pub audiences: Vec<String>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// Freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub sid: Uuid,
    /// Refresh token lifetime in seconds; also the session lifetime.
    pub exp: u64,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audiences: cfg.audiences.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes.max(1) as u64) * 60),
        }
    }

    pub fn is_known_client(&self, client_id: &str) -> bool {
        self.audiences.iter().any(|a| a == client_id)
    }

    fn sign_with_kind(
        &self,
        user_id: Uuid,
        aud: &str,
        lng: &str,
        sid: Uuid,
        kind: TokenKind,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            aud: aud.to_string(),
            lng: lng.to_string(),
            sid,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, aud, kind = ?kind, "jwt signed");
        Ok(token)
    }

    /// Issues an access/refresh pair sharing a new session ID.
    pub fn generate_auth_tokens(&self, user_id: Uuid, aud: &str, lng: &str) -> anyhow::Result<AuthTokens> {
        let sid = Uuid::new_v4();
        Ok(AuthTokens {
            access_token: self.sign_with_kind(user_id, aud, lng, sid, TokenKind::Access)?,
            refresh_token: self.sign_with_kind(user_id, aud, lng, sid, TokenKind::Refresh)?,
            sid,
            exp: self.refresh_ttl.as_secs(),
        })
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        let mut validation = Validation::default();
        validation.set_audience(&self.audiences);
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.validate_exp = validate_exp;
        validation
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation(true)).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            AppError::TokenInvalid
        })?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> AppResult<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Access {
            return Err(AppError::TokenInvalid);
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> AppResult<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AppError::TokenInvalid);
        }
        Ok(claims)
    }

    /// Checks signature, issuer and audience but accepts expired tokens.
    pub fn decode_allow_expired(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation(false))
            .map(|d| d.claims)
            .map_err(|_| AppError::TokenInvalid)
    }
}
