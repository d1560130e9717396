use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::model::User;
use crate::auth::extractors::AuthUser;
use crate::error::{AppError, AppResult, LocalizedError};
use crate::files::{File, NewFile};
use crate::i18n::Locale;
use crate::state::AppState;

pub const AVATAR_FIELD: &str = "avatar";

// room for multipart framing on top of the image itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/v1/users/me/avatar", post(upload_avatar))
        .layer(DefaultBodyLimit::max(max_bytes + MULTIPART_OVERHEAD))
}

/// File extension for an accepted image type.
pub fn image_extension(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// An avatar upload read from the request.
#[derive(Debug)]
pub struct AvatarUpload {
    pub name: String,
    pub mime_type: String,
    pub body: Bytes,
}

impl AvatarUpload {
    pub fn check(&self, max_bytes: usize) -> AppResult<&'static str> {
        if self.body.len() > max_bytes {
            return Err(AppError::ImageTooLarge { max_bytes });
        }
        image_extension(&self.mime_type).ok_or_else(|| AppError::UnsupportedFileType(self.mime_type.clone()))
    }
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub success: bool,
    pub avatar: File,
}

async fn read_avatar_field(mp: &mut Multipart, max_bytes: usize) -> AppResult<AvatarUpload> {
    loop {
        let field = match mp.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(AppError::NothingToUpload),
            // the body limit trips while streaming
            Err(e) if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(AppError::ImageTooLarge { max_bytes })
            }
            Err(e) => return Err(anyhow::Error::from(e).context("read multipart").into()),
        };
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or(AVATAR_FIELD).to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = field.bytes().await.map_err(|e| {
            if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
                AppError::ImageTooLarge { max_bytes }
            } else {
                AppError::Internal(anyhow::Error::from(e).context("read avatar body"))
            }
        })?;
        if body.is_empty() {
            return Err(AppError::NothingToUpload);
        }
        return Ok(AvatarUpload { name, mime_type, body });
    }
}

/// Stores the upload and links it as the user's avatar. The previous object
/// is removed; the new one is removed again if the database write fails.
#[instrument(skip(state, upload), fields(size = upload.body.len()))]
pub async fn save_avatar(state: &AppState, user_id: Uuid, upload: AvatarUpload) -> AppResult<File> {
    let ext = upload.check(state.config.storage.avatar_max_bytes)?;
    let user = User::find_by_id(&state.db, user_id).await?.ok_or(AppError::NotFound)?;

    let key = format!("avatars/{}/{}.{}", user_id, Uuid::new_v4(), ext);
    let file = NewFile {
        key: key.clone(),
        bucket: state.storage.bucket().to_string(),
        name: upload.name,
        mime_type: upload.mime_type.clone(),
        size: upload.body.len() as i64,
    };
    state
        .storage
        .put_object(&key, upload.body, &upload.mime_type)
        .await?;

    let previous = user.avatar(&state.db).await;
    let saved = match previous {
        Ok(Some(old)) => File::replace(&state.db, old.id, &file).await.map(|f| (f, Some(old.key))),
        Ok(None) => User::attach_avatar(&state.db, user_id, &file).await.map(|f| (f, None)),
        Err(e) => Err(e),
    };

    match saved {
        Ok((avatar, old_key)) => {
            if let Some(old_key) = old_key {
                if let Err(e) = state.storage.delete_object(&old_key).await {
                    warn!(error = ?e, key = %old_key, "failed to remove previous avatar");
                }
            }
            info!(%user_id, key = %avatar.key, "avatar saved");
            Ok(avatar)
        }
        Err(e) => {
            if let Err(cleanup) = state.storage.delete_object(&key).await {
                warn!(error = ?cleanup, %key, "failed to remove orphaned upload");
            }
            Err(e.into())
        }
    }
}

/// POST /v1/users/me/avatar (multipart, field `avatar`)
#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    locale: Locale,
    AuthUser(claims): AuthUser,
    mut mp: Multipart,
) -> Result<Json<AvatarResponse>, LocalizedError> {
    let max_bytes = state.config.storage.avatar_max_bytes;
    let result = async {
        let upload = read_avatar_field(&mut mp, max_bytes).await?;
        save_avatar(&state, claims.sub, upload).await
    }
    .await;

    match result {
        Ok(avatar) => Ok(Json(AvatarResponse { success: true, avatar })),
        Err(e) => Err(e.localize(&locale)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn upload(mime_type: &str, size: usize) -> AvatarUpload {
        AvatarUpload {
            name: "me".into(),
            mime_type: mime_type.into(),
            body: Bytes::from(vec![0u8; size]),
        }
    }

    #[test]
    fn maps_image_extensions() {
        assert_eq!(image_extension("image/jpeg"), Some("jpg"));
        assert_eq!(image_extension("image/png"), Some("png"));
        assert_eq!(image_extension("image/webp"), Some("webp"));
        assert_eq!(image_extension("image/gif"), Some("gif"));
        assert_eq!(image_extension("application/pdf"), None);
    }

    #[test]
    fn checks_size_then_type() {
        assert_eq!(upload("image/png", 10).check(100).unwrap(), "png");
        assert!(matches!(
            upload("image/png", 101).check(100),
            Err(AppError::ImageTooLarge { max_bytes: 100 })
        ));
        assert!(matches!(
            upload("text/plain", 10).check(100),
            Err(AppError::UnsupportedFileType(t)) if t == "text/plain"
        ));
    }

    #[tokio::test]
    async fn upload_requires_authentication() {
        let state = AppState::fake();
        let app = router(1024).with_state(state);
        let res = app
            .oneshot(
                Request::post("/v1/users/me/avatar")
                    .header(header::CONTENT_TYPE, "multipart/form-data; boundary=X")
                    .body(Body::from("--X--\r\n"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn empty_form_is_nothing_to_upload() {
        let state = AppState::fake();
        let tokens = state
            .keys
            .generate_auth_tokens(Uuid::new_v4(), "web", "en")
            .unwrap();
        let app = router(1024).with_state(state);
        let body = "--X\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--X--\r\n";
        let res = app
            .oneshot(
                Request::post("/v1/users/me/avatar")
                    .header(header::AUTHORIZATION, format!("Bearer {}", tokens.access_token))
                    .header(header::CONTENT_TYPE, "multipart/form-data; boundary=X")
                    .header(header::ACCEPT_LANGUAGE, "fr")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "NothingToUpload");
    }
}
