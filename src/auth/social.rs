//! Verification of tokens issued by social identity providers.

use anyhow::Context;
use async_graphql::Enum;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const FACEBOOK_ME_URL: &str = "https://graph.facebook.com/me";

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocialProvider {
    #[graphql(name = "GOOGLE")]
    Google,
    #[graphql(name = "FACEBOOK")]
    Facebook,
}

/// Profile returned by a provider once its token checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialProfile {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub picture: Option<String>,
}

#[async_trait]
pub trait SocialVerifier: Send + Sync {
    async fn verify(&self, provider: SocialProvider, token: &str) -> AppResult<SocialProfile>;
}

#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    aud: Option<String>,
    email: Option<String>,
    email_verified: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct FacebookMe {
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    picture: Option<FacebookPicture>,
}

pub struct HttpSocialVerifier {
    http: reqwest::Client,
    google_client_id: Option<String>,
}

impl HttpSocialVerifier {
    pub fn new(google_client_id: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            google_client_id,
        }
    }

    async fn google(&self, token: &str) -> AppResult<SocialProfile> {
        let res = self
            .http
            .get(GOOGLE_TOKENINFO_URL)
            .query(&[("id_token", token)])
            .send()
            .await
            .context("google tokeninfo request")?;
        if !res.status().is_success() {
            debug!(status = %res.status(), "google rejected id token");
            return Err(AppError::TokenInvalid);
        }
        let info: GoogleTokenInfo = res.json().await.context("decode google tokeninfo")?;

        if let Some(expected) = &self.google_client_id {
            if info.aud.as_deref() != Some(expected.as_str()) {
                warn!(aud = ?info.aud, "google id token issued for another client");
                return Err(AppError::TokenInvalid);
            }
        }
        if info.email_verified.as_deref() == Some("false") {
            return Err(AppError::SocialEmailMissing);
        }
        Ok(SocialProfile {
            email: info.email.ok_or(AppError::SocialEmailMissing)?,
            first_name: info.given_name.unwrap_or_default(),
            last_name: info.family_name.unwrap_or_default(),
            picture: info.picture,
        })
    }

    async fn facebook(&self, token: &str) -> AppResult<SocialProfile> {
        let res = self
            .http
            .get(FACEBOOK_ME_URL)
            .query(&[
                ("fields", "email,first_name,last_name,picture.type(large)"),
                ("access_token", token),
            ])
            .send()
            .await
            .context("facebook me request")?;
        if !res.status().is_success() {
            debug!(status = %res.status(), "facebook rejected access token");
            return Err(AppError::TokenInvalid);
        }
        let me: FacebookMe = res.json().await.context("decode facebook profile")?;
        Ok(SocialProfile {
            email: me.email.ok_or(AppError::SocialEmailMissing)?,
            first_name: me.first_name.unwrap_or_default(),
            last_name: me.last_name.unwrap_or_default(),
            picture: me.picture.map(|p| p.data.url),
        })
    }
}

#[async_trait]
impl SocialVerifier for HttpSocialVerifier {
    async fn verify(&self, provider: SocialProvider, token: &str) -> AppResult<SocialProfile> {
        match provider {
            SocialProvider::Google => self.google(token).await,
            SocialProvider::Facebook => self.facebook(token).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Accepts the token `"valid"` and returns a fixed profile.
    pub struct StaticSocialVerifier(pub SocialProfile);

    #[async_trait]
    impl SocialVerifier for StaticSocialVerifier {
        async fn verify(&self, _provider: SocialProvider, token: &str) -> AppResult<SocialProfile> {
            if token == "valid" {
                Ok(self.0.clone())
            } else {
                Err(AppError::TokenInvalid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_google_tokeninfo() {
        let info: GoogleTokenInfo = serde_json::from_str(
            r#"{"aud":"abc","email":"a@b.co","email_verified":"true","given_name":"Ada","family_name":"Lovelace","picture":"https://x/y.png","sub":"1"}"#,
        )
        .unwrap();
        assert_eq!(info.email.as_deref(), Some("a@b.co"));
        assert_eq!(info.given_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn parses_facebook_profile_picture() {
        let me: FacebookMe = serde_json::from_str(
            r#"{"id":"1","email":"a@b.co","first_name":"Ada","last_name":"L","picture":{"data":{"url":"https://fb/p.jpg","width":200}}}"#,
        )
        .unwrap();
        assert_eq!(me.picture.unwrap().data.url, "https://fb/p.jpg");
    }
}
