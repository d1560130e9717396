use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{File, NewFile};

const FILE_COLUMNS: &str = "id, key, bucket, name, mime_type, size, created_at, updated_at";

impl File {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<File>> {
        let file = sqlx::query_as::<_, File>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find file")?;
        Ok(file)
    }

    /// Insert a file row within a transaction.
    pub async fn create_tx(tx: &mut Transaction<'_, Postgres>, file: &NewFile) -> anyhow::Result<File> {
        let file = sqlx::query_as::<_, File>(&format!(
            r#"
            INSERT INTO files (key, bucket, name, mime_type, size)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {FILE_COLUMNS}
            "#
        ))
        .bind(&file.key)
        .bind(&file.bucket)
        .bind(&file.name)
        .bind(&file.mime_type)
        .bind(file.size)
        .fetch_one(&mut **tx)
        .await
        .context("insert file")?;
        Ok(file)
    }

    /// Point an existing row at a new object.
    pub async fn replace(db: &PgPool, id: Uuid, file: &NewFile) -> anyhow::Result<File> {
        let file = sqlx::query_as::<_, File>(&format!(
            r#"
            UPDATE files
               SET key = $2, bucket = $3, name = $4, mime_type = $5, size = $6, updated_at = now()
             WHERE id = $1
            RETURNING {FILE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&file.key)
        .bind(&file.bucket)
        .bind(&file.name)
        .bind(&file.mime_type)
        .bind(file.size)
        .fetch_one(db)
        .await
        .context("replace file")?;
        Ok(file)
    }

    /// Delete the row; `users.avatar_id` is cleared by the foreign key.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<File>> {
        let file = sqlx::query_as::<_, File>(&format!(
            "DELETE FROM files WHERE id = $1 RETURNING {FILE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("delete file")?;
        Ok(file)
    }
}
