pub mod links;
mod repo;

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Stored object metadata; avatars are the only kind today.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: Uuid,
    pub key: String,
    pub bucket: String,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Metadata of a freshly uploaded object.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub key: String,
    pub bucket: String,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
}

/// Removes the row and then the stored object. A storage failure leaves an
/// orphaned object behind and is only logged.
pub async fn destroy(
    db: &sqlx::PgPool,
    storage: &dyn crate::storage::ObjectStorage,
    id: Uuid,
) -> anyhow::Result<Option<File>> {
    let file = File::delete(db, id).await?;
    if let Some(file) = &file {
        if let Err(e) = storage.delete_object(&file.key).await {
            tracing::warn!(error = ?e, key = %file.key, "failed to remove stored object");
        }
    }
    Ok(file)
}
