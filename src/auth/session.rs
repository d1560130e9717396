//! Refresh-token rotation: one live session ID per (client, user).

use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;

use super::claims::Claims;
use super::jwt::{AuthTokens, JwtKeys};
use crate::error::{AppError, AppResult};
use crate::store::Store;

pub fn session_key(client_id: &str, user_id: Uuid) -> String {
    format!("{}:{}", client_id, user_id)
}

/// Issues tokens for a login and records the new session.
pub async fn start(
    store: &dyn Store,
    keys: &JwtKeys,
    user_id: Uuid,
    client_id: &str,
    language: &str,
) -> AppResult<AuthTokens> {
    let tokens = keys.generate_auth_tokens(user_id, client_id, language)?;
    store
        .set(&session_key(client_id, user_id), &tokens.sid.to_string(), tokens.exp)
        .await
        .context("store session")?;
    info!(%user_id, client_id, "session started");
    Ok(tokens)
}

/// Exchanges a refresh token for a new pair. A refresh token from a
/// superseded session revokes the live one.
pub async fn rotate(store: &dyn Store, keys: &JwtKeys, refresh_token: &str) -> AppResult<(Claims, AuthTokens)> {
    let claims = keys.verify_refresh(refresh_token)?;
    let key = session_key(&claims.aud, claims.sub);
    let current = store.get(&key).await.context("load session")?;

    match current {
        Some(sid) if sid == claims.sid.to_string() => {}
        Some(_) => {
            warn!(user_id = %claims.sub, client_id = %claims.aud, "refresh token reuse detected; revoking session");
            store.remove(&key).await.context("revoke session")?;
            return Err(AppError::TokenInvalid);
        }
        None => return Err(AppError::TokenInvalid),
    }

    let tokens = keys.generate_auth_tokens(claims.sub, &claims.aud, &claims.lng)?;
    store
        .set(&key, &tokens.sid.to_string(), tokens.exp)
        .await
        .context("store rotated session")?;
    info!(user_id = %claims.sub, client_id = %claims.aud, "session rotated");
    Ok((claims, tokens))
}

/// Removes the session of one client, or of every known client when `all`.
pub async fn end(store: &dyn Store, keys: &JwtKeys, user_id: Uuid, client_id: &str, all: bool) -> AppResult<()> {
    if all {
        for aud in &keys.audiences {
            store
                .remove(&session_key(aud, user_id))
                .await
                .context("remove session")?;
        }
    } else {
        store
            .remove(&session_key(client_id, user_id))
            .await
            .context("remove session")?;
    }
    info!(%user_id, client_id, all, "session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::tests::test_jwt_config;
    use crate::store::MemoryStore;

    fn keys() -> JwtKeys {
        JwtKeys::new(&test_jwt_config())
    }

    #[tokio::test]
    async fn login_stores_session_id() {
        let store = MemoryStore::new();
        let keys = keys();
        let user = Uuid::new_v4();
        let tokens = start(&store, &keys, user, "web", "en").await.unwrap();
        let stored = store.get(&session_key("web", user)).await.unwrap();
        assert_eq!(stored, Some(tokens.sid.to_string()));
    }

    #[tokio::test]
    async fn refresh_rotates_session() {
        let store = MemoryStore::new();
        let keys = keys();
        let user = Uuid::new_v4();
        let first = start(&store, &keys, user, "web", "en").await.unwrap();

        let (claims, second) = rotate(&store, &keys, &first.refresh_token).await.unwrap();
        assert_eq!(claims.sub, user);
        assert_ne!(first.sid, second.sid);
        assert_eq!(
            store.get(&session_key("web", user)).await.unwrap(),
            Some(second.sid.to_string())
        );
    }

    #[tokio::test]
    async fn reused_refresh_token_revokes_session() {
        let store = MemoryStore::new();
        let keys = keys();
        let user = Uuid::new_v4();
        let first = start(&store, &keys, user, "web", "en").await.unwrap();
        let (_, second) = rotate(&store, &keys, &first.refresh_token).await.unwrap();

        let err = rotate(&store, &keys, &first.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid));
        assert_eq!(store.get(&session_key("web", user)).await.unwrap(), None);
        // the legitimate holder is logged out as well
        assert!(rotate(&store, &keys, &second.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn logout_removes_one_or_all_sessions() {
        let store = MemoryStore::new();
        let keys = keys();
        let user = Uuid::new_v4();
        start(&store, &keys, user, "web", "en").await.unwrap();
        start(&store, &keys, user, "mobile", "en").await.unwrap();

        end(&store, &keys, user, "web", false).await.unwrap();
        assert_eq!(store.get(&session_key("web", user)).await.unwrap(), None);
        assert!(store.get(&session_key("mobile", user)).await.unwrap().is_some());

        start(&store, &keys, user, "web", "en").await.unwrap();
        end(&store, &keys, user, "web", true).await.unwrap();
        assert_eq!(store.get(&session_key("web", user)).await.unwrap(), None);
        assert_eq!(store.get(&session_key("mobile", user)).await.unwrap(), None);
    }
}
