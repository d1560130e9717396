use async_graphql::ErrorExtensions;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::i18n::Locale;

/// A field-level validation failure; `message` is an i18n key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldError {
    pub fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token invalid")]
    TokenInvalid,
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("email unavailable")]
    EmailUnavailable,
    #[error("phone number unavailable")]
    PhoneNumberUnavailable,
    #[error("phone number required")]
    PhoneNumberRequired,
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),
    #[error("invalid cursor")]
    InvalidCursor,
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid filter field {0}")]
    InvalidFilterField(String),
    #[error("invalid order field {0}")]
    InvalidOrderField(String),
    #[error("invalid client")]
    InvalidClient,
    #[error("social account has no email")]
    SocialEmailMissing,
    #[error("image too large (max {max_bytes} bytes)")]
    ImageTooLarge { max_bytes: usize },
    #[error("nothing to upload")]
    NothingToUpload,
    #[error("unsupported file type {0}")]
    UnsupportedFileType(String),
    #[error("rate limited")]
    RateLimited,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Stable code exposed to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "InvalidCredentials",
            AppError::TokenInvalid => "TokenInvalid",
            AppError::Unauthenticated => "Unauthenticated",
            AppError::Forbidden => "Forbidden",
            AppError::NotFound => "NotFound",
            AppError::EmailUnavailable => "EmailUnavailable",
            AppError::PhoneNumberUnavailable => "PhoneNumberUnavailable",
            AppError::PhoneNumberRequired => "PhoneNumberRequired",
            AppError::Validation(_) => "ValidationFailed",
            AppError::InvalidCursor => "InvalidCursor",
            AppError::InvalidFilter(_) => "InvalidFilter",
            AppError::InvalidFilterField(_) => "InvalidFilterField",
            AppError::InvalidOrderField(_) => "InvalidOrderField",
            AppError::InvalidClient => "InvalidClient",
            AppError::SocialEmailMissing => "SocialEmailMissing",
            AppError::ImageTooLarge { .. } => "ImageTooLarge",
            AppError::NothingToUpload => "NothingToUpload",
            AppError::UnsupportedFileType(_) => "UnsupportedFileType",
            AppError::RateLimited => "RateLimited",
            AppError::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials | AppError::TokenInvalid | AppError::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::EmailUnavailable | AppError::PhoneNumberUnavailable => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            AppError::Validation(errors) => errors,
            _ => &[],
        }
    }

    pub fn message(&self, locale: &Locale) -> String {
        match self {
            AppError::ImageTooLarge { max_bytes } => {
                locale.t_with(self.code(), &[("size", &format_bytes(*max_bytes))])
            }
            AppError::InvalidFilterField(field) | AppError::InvalidOrderField(field) => {
                locale.t_with(self.code(), &[("field", field)])
            }
            _ => locale.t(self.code()),
        }
    }

    fn log(&self) {
        if let AppError::Internal(e) = self {
            error!(error = ?e, "internal error");
        }
    }

    pub fn localize(self, locale: &Locale) -> LocalizedError {
        LocalizedError {
            error: self,
            locale: locale.clone(),
        }
    }

    /// GraphQL error carrying `extensions.code`.
    pub fn into_graphql(self, locale: &Locale) -> async_graphql::Error {
        self.log();
        let code = self.code();
        async_graphql::Error::new(self.message(locale)).extend_with(|_, e| e.set("code", code))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                match db.constraint().unwrap_or_default() {
                    c if c.contains("email") => AppError::EmailUnavailable,
                    c if c.contains("phone") => AppError::PhoneNumberUnavailable,
                    _ => AppError::Internal(e.into()),
                }
            }
            _ => AppError::Internal(e.into()),
        }
    }
}

/// Human readable byte size, e.g. `5MB` or `512KB`.
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value.fract() == 0.0 {
        format!("{}{}", value as u64, UNITS[unit])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

#[derive(Debug, Serialize)]
struct LocalizedFieldError {
    field: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<LocalizedFieldError>,
}

/// An error paired with the language of the request that produced it.
#[derive(Debug)]
pub struct LocalizedError {
    pub error: AppError,
    pub locale: Locale,
}

impl IntoResponse for LocalizedError {
    fn into_response(self) -> Response {
        self.error.log();
        let body = ErrorBody {
            success: false,
            code: self.error.code(),
            message: self.error.message(&self.locale),
            errors: self
                .error
                .field_errors()
                .iter()
                .map(|fe| LocalizedFieldError {
                    field: fe.field,
                    message: self.locale.t(fe.message),
                })
                .collect(),
        };
        (self.error.status(), Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.localize(&Locale::default()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_byte_sizes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5MB");
        assert_eq!(format_bytes(1536), "1.5KB");
    }

    #[test]
    fn image_too_large_message_carries_limit() {
        let msg = AppError::ImageTooLarge { max_bytes: 2 * 1024 * 1024 }.message(&Locale::default());
        assert_eq!(msg, "Image is too large. The maximum size is 2MB.");
    }

    #[test]
    fn maps_status_codes() {
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::EmailUnavailable.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::NothingToUpload.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn graphql_error_has_code_extension() {
        let err = AppError::Unauthenticated.into_graphql(&Locale::default());
        assert_eq!(err.message, "You need to sign in to continue.");
        let ext = err.extensions.expect("extensions");
        assert_eq!(
            ext.get("code"),
            Some(&async_graphql::Value::from("Unauthenticated"))
        );
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::NotFound));
    }
}
