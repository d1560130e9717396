use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldError};
use crate::i18n;
use crate::pagination::{Column, Paginated};

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub user_name: Option<String>,
    pub email: String,
    pub email_verified: bool,
    pub phone_number: Option<String>,
    pub phone_number_verified: bool,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, never exposed
    pub language: String,
    pub social_avatar_url: Option<String>,
    pub avatar_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn full_name(&self) -> String {
        [self.first_name.as_str(), self.last_name.as_str()].join(" ")
    }
}

impl Paginated for User {
    const TABLE: &'static str = "users";
    const SELECT: &'static str = super::repo::USER_COLUMNS;
    const COLUMNS: &'static [Column] = &[
        Column::new("id", "id", "uuid").unique(),
        Column::new("firstName", "first_name", "text"),
        Column::new("lastName", "last_name", "text"),
        Column::new("userName", "user_name", "text").nullable(),
        Column::new("email", "email", "text").unique(),
        Column::new("emailVerified", "email_verified", "boolean"),
        Column::new("phoneNumber", "phone_number", "text").nullable(),
        Column::new("phoneNumberVerified", "phone_number_verified", "boolean"),
        Column::new("language", "language", "text"),
        Column::new("createdAt", "created_at", "timestamptz").unique(),
        Column::new("updatedAt", "updated_at", "timestamptz"),
    ];
}

/// Fields of a new account; `password` is plain text until stored.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub user_name: Option<String>,
    pub email: String,
    pub phone_number: Option<String>,
    pub password: String,
    pub language: Option<String>,
    pub social_avatar_url: Option<String>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_name: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
    pub language: Option<String>,
    pub social_avatar_url: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.user_name.is_none()
            && self.phone_number.is_none()
            && self.password.is_none()
            && self.language.is_none()
            && self.social_avatar_url.is_none()
    }
}

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9 ()\-]{6,20}$").unwrap();
    static ref LANGUAGE_RE: Regex = Regex::new(r"^[A-Za-z]+$").unwrap();
    static ref URL_RE: Regex = Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap();
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_url(url: &str) -> bool {
    URL_RE.is_match(url)
}

fn check_name(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: &str,
    empty_msg: &'static str,
    len_msg: &'static str,
) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(FieldError::new(field, empty_msg));
    } else if !(2..=100).contains(&trimmed.chars().count()) {
        errors.push(FieldError::new(field, len_msg));
    }
}

fn check_optional(errors: &mut Vec<FieldError>, changes: &UserChanges) {
    if let Some(user_name) = &changes.user_name {
        if !(2..=100).contains(&user_name.trim().chars().count()) {
            errors.push(FieldError::new("userName", i18n::USER_NAME_LEN));
        }
    }
    if let Some(phone) = &changes.phone_number {
        if !PHONE_RE.is_match(phone.trim()) {
            errors.push(FieldError::new("phoneNumber", i18n::INVALID_PHONE_NUMBER));
        }
    }
    if let Some(password) = &changes.password {
        if !(6..=64).contains(&password.chars().count()) {
            errors.push(FieldError::new("password", i18n::PASSWORD_LEN));
        }
    }
    if let Some(language) = &changes.language {
        if !LANGUAGE_RE.is_match(language) {
            errors.push(FieldError::new("language", i18n::INVALID_LOCALE));
        }
    }
    if let Some(url) = &changes.social_avatar_url {
        if !is_valid_url(url) {
            errors.push(FieldError::new("socialAvatarURL", i18n::INVALID_URL));
        }
    }
}

impl NewUser {
    /// Trims fields, lowercases the email and checks every rule.
    pub fn validate(mut self) -> AppResult<Self> {
        self.email = normalize_email(&self.email);
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();

        let mut errors = Vec::new();
        check_name(&mut errors, "firstName", &self.first_name, i18n::FIRST_NAME_EMPTY, i18n::FIRST_NAME_LEN);
        check_name(&mut errors, "lastName", &self.last_name, i18n::LAST_NAME_EMPTY, i18n::LAST_NAME_LEN);
        if !is_valid_email(&self.email) {
            errors.push(FieldError::new("email", i18n::INVALID_EMAIL));
        }
        check_optional(
            &mut errors,
            &UserChanges {
                user_name: self.user_name.clone(),
                phone_number: self.phone_number.clone(),
                password: Some(self.password.clone()),
                language: self.language.clone(),
                social_avatar_url: self.social_avatar_url.clone(),
                ..Default::default()
            },
        );

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

impl UserChanges {
    pub fn validate(mut self) -> AppResult<Self> {
        let mut errors = Vec::new();
        if let Some(first) = self.first_name.as_mut() {
            *first = first.trim().to_string();
            check_name(&mut errors, "firstName", first, i18n::FIRST_NAME_EMPTY, i18n::FIRST_NAME_LEN);
        }
        if let Some(last) = self.last_name.as_mut() {
            *last = last.trim().to_string();
            check_name(&mut errors, "lastName", last, i18n::LAST_NAME_EMPTY, i18n::LAST_NAME_LEN);
        }
        if let Some(phone) = self.phone_number.as_mut() {
            *phone = phone.trim().to_string();
        }
        check_optional(&mut errors, &self);

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_new_user() -> NewUser {
        NewUser {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            user_name: None,
            email: "  Ada@Example.com ".into(),
            phone_number: Some("+44 20 7946 0958".into()),
            password: "secret1".into(),
            language: Some("en".into()),
            social_avatar_url: None,
        }
    }

    fn fields(err: AppError) -> Vec<&'static str> {
        err.field_errors().iter().map(|f| f.field).collect()
    }

    #[test]
    fn accepts_valid_user_and_normalizes_email() {
        let user = valid_new_user().validate().expect("valid");
        assert_eq!(user.email, "ada@example.com");
    }

    #[test]
    fn rejects_blank_and_short_names() {
        let mut u = valid_new_user();
        u.first_name = " ".into();
        u.last_name = "L".into();
        let err = u.validate().unwrap_err();
        assert_eq!(
            err.field_errors(),
            &[
                FieldError::new("firstName", i18n::FIRST_NAME_EMPTY),
                FieldError::new("lastName", i18n::LAST_NAME_LEN),
            ]
        );
    }

    #[test]
    fn rejects_invalid_email() {
        let mut u = valid_new_user();
        u.email = "siuuuuu".into();
        assert_eq!(fields(u.validate().unwrap_err()), vec!["email"]);
    }

    #[test]
    fn rejects_invalid_phone_number() {
        let mut u = valid_new_user();
        u.phone_number = Some(" ".into());
        assert_eq!(fields(u.validate().unwrap_err()), vec!["phoneNumber"]);
    }

    #[test]
    fn rejects_invalid_locale() {
        let mut u = valid_new_user();
        u.language = Some("1234".into());
        assert_eq!(fields(u.validate().unwrap_err()), vec!["language"]);
    }

    #[test]
    fn rejects_password_outside_bounds() {
        let mut u = valid_new_user();
        u.password = "abc".into();
        assert_eq!(fields(u.validate().unwrap_err()), vec!["password"]);
        let mut u = valid_new_user();
        u.password = "x".repeat(65);
        assert_eq!(fields(u.validate().unwrap_err()), vec!["password"]);
    }

    #[test]
    fn rejects_invalid_social_avatar_url() {
        let changes = UserChanges {
            social_avatar_url: Some("not a url".into()),
            ..Default::default()
        };
        assert_eq!(fields(changes.validate().unwrap_err()), vec!["socialAvatarURL"]);
    }

    #[test]
    fn partial_changes_only_check_present_fields() {
        let changes = UserChanges {
            language: Some("fr".into()),
            ..Default::default()
        };
        assert!(changes.validate().is_ok());
        assert!(UserChanges::default().is_empty());
    }

    pub(crate) fn sample_user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            user_name: None,
            email: "ada@example.com".into(),
            email_verified: false,
            phone_number: None,
            phone_number_verified: false,
            password_hash: "hash".into(),
            language: "en".into(),
            social_avatar_url: None,
            avatar_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn full_name_joins_names() {
        let user = sample_user();
        assert_eq!(user.full_name(), "Ada Lovelace");
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["firstName"], "Ada");
    }

    #[test]
    fn user_name_ordering_gets_an_id_tiebreaker() {
        use crate::pagination::cursor::ensure_deterministic_order;
        use crate::pagination::{OrderItem, SortDirection};

        let order = ensure_deterministic_order::<User>(vec![OrderItem::new("userName", SortDirection::Asc)]);
        assert_eq!(
            order,
            vec![
                OrderItem::new("userName", SortDirection::Asc),
                OrderItem::new("id", SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn paging_past_a_null_phone_number_keeps_other_nulls() {
        use crate::pagination::cursor::create_cursor;
        use crate::pagination::{build_page_query, OrderItem, PageInput, SortDirection};

        let order = vec![
            OrderItem::new("phoneNumber", SortDirection::Asc),
            OrderItem::new("id", SortDirection::Asc),
        ];
        let after = create_cursor(
            &order,
            &serde_json::json!({"phoneNumber": null, "id": Uuid::nil().to_string()}),
        );
        let page = PageInput {
            first: Some(5),
            after: Some(after),
            order_by: Some(vec![OrderItem::new("phoneNumber", SortDirection::Asc)]),
            ..Default::default()
        };
        let (qb, _) = build_page_query::<User>(&page, None).unwrap();
        let sql = qb.sql();
        assert!(
            sql.contains("AND (FALSE OR (phone_number IS NULL AND id > $1::uuid)) ORDER BY phone_number ASC, id ASC"),
            "{sql}"
        );
        assert!(!sql.contains("= NULL"));
    }
}
