use anyhow::Context;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, instrument};
use uuid::Uuid;

use super::model::{is_valid_url, normalize_email, NewUser, User, UserChanges};
use crate::auth::password::{hash_password, random_password};
use crate::auth::social::SocialProfile;
use crate::error::{AppError, AppResult};
use crate::files::{self, File, NewFile};
use crate::pagination::{fetch_page, Page, PageInput};
use crate::storage::ObjectStorage;

pub const USER_COLUMNS: &str = "id, first_name, last_name, user_name, email, email_verified, \
     phone_number, phone_number_verified, password_hash, language, social_avatar_url, \
     avatar_id, created_at, updated_at";

const DEFAULT_LANGUAGE: &str = "en";
const SOCIAL_PASSWORD_LEN: usize = 16;
const SOCIAL_NAME_PLACEHOLDER: &str = "User";
const MAX_NAME_LEN: usize = 100;

/// The unverified account to discard before registering its email again.
fn stale_account(existing: Option<&User>) -> AppResult<Option<Uuid>> {
    match existing {
        Some(user) if user.email_verified => Err(AppError::EmailUnavailable),
        Some(user) => Ok(Some(user.id)),
        None => Ok(None),
    }
}

/// Provider names rarely meet the 2..=100 rule on their own: a missing first
/// name falls back to the email local part, anything still too short becomes
/// the placeholder and long names are cut.
fn social_name(value: &str, fallback: &str) -> String {
    let value = match value.trim() {
        "" => fallback.trim(),
        v => v,
    };
    if value.chars().count() < 2 {
        return SOCIAL_NAME_PLACEHOLDER.to_string();
    }
    value.chars().take(MAX_NAME_LEN).collect::<String>().trim_end().to_string()
}

/// The account created for a first social login, validated like any other.
fn social_new_user(profile: &SocialProfile, language: &str, password: String) -> AppResult<NewUser> {
    let local_part = profile.email.split('@').next().unwrap_or_default();
    NewUser {
        first_name: social_name(&profile.first_name, local_part),
        last_name: social_name(&profile.last_name, ""),
        email: profile.email.clone(),
        password,
        language: Some(language.to_string()),
        social_avatar_url: profile.picture.clone().filter(|url| is_valid_url(url)),
        ..Default::default()
    }
    .validate()
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    /// Find a user by (normalized) email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(normalize_email(email))
            .fetch_optional(db)
            .await
            .context("find user by email")?;
        Ok(user)
    }

    /// Insert a validated user, hashing its password.
    pub async fn create(db: &PgPool, new: NewUser, email_verified: bool) -> AppResult<User> {
        let password_hash = hash_password(&new.password)?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (first_name, last_name, user_name, email, email_verified,
                               phone_number, password_hash, language, social_avatar_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.user_name)
        .bind(normalize_email(&new.email))
        .bind(email_verified)
        .bind(&new.phone_number)
        .bind(password_hash)
        .bind(new.language.as_deref().unwrap_or(DEFAULT_LANGUAGE))
        .bind(&new.social_avatar_url)
        .fetch_one(db)
        .await?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Registration: an unverified holder of the email is discarded first,
    /// a verified one makes the email unavailable.
    #[instrument(skip(db, storage, new), fields(email = %new.email))]
    pub async fn create_with_email(db: &PgPool, storage: &dyn ObjectStorage, new: NewUser) -> AppResult<User> {
        let existing = User::find_by_email(db, &new.email).await?;
        if let Some(stale) = stale_account(existing.as_ref())? {
            info!(user_id = %stale, "discarding unverified account");
            User::delete(db, storage, stale).await?;
        }
        User::create(db, new, false).await
    }

    /// Returns the user owning the provider's email, creating one if needed.
    /// The boolean is true when the account was just created.
    pub async fn find_or_create_social(
        db: &PgPool,
        profile: &SocialProfile,
        language: &str,
    ) -> AppResult<(User, bool)> {
        if let Some(user) = User::find_by_email(db, &profile.email).await? {
            let user = if user.email_verified {
                user
            } else {
                User::verify_email(db, user.id).await?
            };
            return Ok((user, false));
        }

        let new = social_new_user(profile, language, random_password(SOCIAL_PASSWORD_LEN))?;
        let user = User::create(db, new, true).await?;
        Ok((user, true))
    }

    /// Applies validated changes. A new phone number drops its verified flag.
    pub async fn update(db: &PgPool, id: Uuid, changes: UserChanges) -> AppResult<User> {
        if changes.is_empty() {
            return User::find_by_id(db, id).await?.ok_or(AppError::NotFound);
        }
        let password_hash = changes.password.as_deref().map(hash_password).transpose()?;

        let mut qb = build_update(id, &changes, password_hash);
        let user = qb.build_query_as::<User>().fetch_optional(db).await?;
        user.ok_or(AppError::NotFound)
    }

    /// Setting a password through a reset proves ownership of the email.
    pub async fn update_password(db: &PgPool, id: Uuid, password: &str) -> AppResult<User> {
        let password_hash = hash_password(password)?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET password_hash = $2, email_verified = TRUE, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn verify_email(db: &PgPool, id: Uuid) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email_verified = TRUE, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn verify_phone_number(db: &PgPool, id: Uuid) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET phone_number_verified = TRUE, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Deletes the user and its avatar file.
    pub async fn delete(db: &PgPool, storage: &dyn ObjectStorage, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"))
            .bind(id)
            .fetch_optional(db)
            .await
            .context("delete user")?;
        if let Some(avatar_id) = user.as_ref().and_then(|u| u.avatar_id) {
            files::destroy(db, storage, avatar_id).await?;
        }
        Ok(user)
    }

    pub async fn avatar(&self, db: &PgPool) -> anyhow::Result<Option<File>> {
        match self.avatar_id {
            Some(id) => File::find_by_id(db, id).await,
            None => Ok(None),
        }
    }

    /// Creates an avatar row and links it to the user in one transaction.
    pub async fn attach_avatar(db: &PgPool, id: Uuid, file: &NewFile) -> anyhow::Result<File> {
        let mut tx = db.begin().await.context("begin tx")?;
        let avatar = File::create_tx(&mut tx, file).await?;
        sqlx::query("UPDATE users SET avatar_id = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(avatar.id)
            .execute(&mut *tx)
            .await
            .context("link avatar")?;
        tx.commit().await.context("commit tx")?;
        Ok(avatar)
    }

    /// Removes the avatar file; the foreign key clears `avatar_id`.
    pub async fn delete_avatar(db: &PgPool, storage: &dyn ObjectStorage, id: Uuid) -> AppResult<User> {
        let user = User::find_by_id(db, id).await?.ok_or(AppError::NotFound)?;
        match user.avatar_id {
            Some(avatar_id) => {
                files::destroy(db, storage, avatar_id).await?;
                User::find_by_id(db, id).await?.ok_or(AppError::NotFound)
            }
            None => Ok(user),
        }
    }

    pub async fn page(db: &PgPool, page: &PageInput, filter: Option<&serde_json::Value>) -> AppResult<Page<User>> {
        fetch_page::<User>(db, page, filter).await
    }
}

fn build_update(id: Uuid, changes: &UserChanges, password_hash: Option<String>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE users SET updated_at = now()");
    let text_fields = [
        ("first_name", &changes.first_name),
        ("last_name", &changes.last_name),
        ("user_name", &changes.user_name),
        ("language", &changes.language),
        ("social_avatar_url", &changes.social_avatar_url),
    ];
    for (column, value) in text_fields {
        if let Some(value) = value {
            qb.push(", ").push(column).push(" = ").push_bind(value.clone());
        }
    }
    if let Some(phone) = &changes.phone_number {
        qb.push(", phone_number_verified = phone_number_verified AND phone_number IS NOT DISTINCT FROM ")
            .push_bind(phone.clone());
        qb.push(", phone_number = ").push_bind(phone.clone());
    }
    if let Some(hash) = password_hash {
        qb.push(", password_hash = ").push_bind(hash);
    }
    qb.push(" WHERE id = ").push_bind(id);
    qb.push(" RETURNING ").push(USER_COLUMNS);
    qb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::tests::sample_user;

    fn profile(first_name: &str, last_name: &str, email: &str) -> SocialProfile {
        SocialProfile {
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            picture: Some("https://cdn.example.com/p.jpg".into()),
        }
    }

    #[test]
    fn unverified_holder_of_the_email_is_replaced() {
        let user = sample_user();
        assert_eq!(stale_account(Some(&user)).unwrap(), Some(user.id));
        assert_eq!(stale_account(None).unwrap(), None);
    }

    #[test]
    fn verified_holder_makes_the_email_unavailable() {
        let user = User {
            email_verified: true,
            ..sample_user()
        };
        assert!(matches!(stale_account(Some(&user)), Err(AppError::EmailUnavailable)));
    }

    #[test]
    fn social_profile_without_last_name_still_validates() {
        let new = social_new_user(&profile("Grace", "  ", "grace@example.com"), "en", "s3cret-pass".into()).unwrap();
        assert_eq!(new.first_name, "Grace");
        assert_eq!(new.last_name, SOCIAL_NAME_PLACEHOLDER);
        assert_eq!(new.social_avatar_url.as_deref(), Some("https://cdn.example.com/p.jpg"));
    }

    #[test]
    fn social_first_name_falls_back_to_email_local_part() {
        let new = social_new_user(&profile("", "Hopper", "grace.h@example.com"), "fr", "s3cret-pass".into()).unwrap();
        assert_eq!(new.first_name, "grace.h");
        // a one-letter local part is too short to be a name
        let new = social_new_user(&profile(" ", "Hopper", "g@example.com"), "en", "s3cret-pass".into()).unwrap();
        assert_eq!(new.first_name, SOCIAL_NAME_PLACEHOLDER);
    }

    #[test]
    fn long_social_names_are_cut_and_bad_pictures_dropped() {
        let mut p = profile(&"A".repeat(150), "Hopper", "grace@example.com");
        p.picture = Some("not a url".into());
        let new = social_new_user(&p, "en", "s3cret-pass".into()).unwrap();
        assert_eq!(new.first_name.chars().count(), MAX_NAME_LEN);
        assert_eq!(new.social_avatar_url, None);
    }

    #[test]
    fn update_only_sets_present_fields() {
        let changes = UserChanges {
            first_name: Some("Ada".into()),
            language: Some("fr".into()),
            ..Default::default()
        };
        let qb = build_update(Uuid::nil(), &changes, None);
        assert_eq!(
            qb.sql(),
            format!(
                "UPDATE users SET updated_at = now(), first_name = $1, language = $2 WHERE id = $3 RETURNING {USER_COLUMNS}"
            )
        );
    }

    #[test]
    fn new_phone_number_resets_verification() {
        let changes = UserChanges {
            phone_number: Some("+1 555 0100".into()),
            ..Default::default()
        };
        let sql = build_update(Uuid::nil(), &changes, Some("hash".into())).sql().to_string();
        assert!(sql.contains(
            "phone_number_verified = phone_number_verified AND phone_number IS NOT DISTINCT FROM $1"
        ));
        assert!(sql.contains("phone_number = $2"));
        assert!(sql.contains("password_hash = $3"));
    }
}
