//! Localized user-facing messages.
//!
//! Messages are looked up by key for a supported language and fall back to
//! English, then to the key itself. Placeholders use `{{name}}` syntax.

use std::collections::HashMap;

use lazy_static::lazy_static;

pub const DEFAULT_LANGUAGE: &str = "en";
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "fr"];

// Keys shared between errors, responses and notification templates.
pub const WELCOME_NEW_USER: &str = "WelcomeNewUser";
pub const WELCOME_BACK: &str = "WelcomeBack";
pub const ACCOUNT_CREATED: &str = "AccountCreated";
pub const LOGGED_OUT: &str = "LoggedOut";
pub const TOKEN_REFRESHED: &str = "TokenRefreshed";
pub const SENT_EMAIL_OTP: &str = "SentEmailOTP";
pub const SENT_PHONE_OTP: &str = "SentPhoneOTP";
pub const EMAIL_VERIFIED: &str = "EmailVerified";
pub const PHONE_NUMBER_VERIFIED: &str = "PhoneNumberVerified";
pub const PASSWORD_RESET_REQUESTED: &str = "PasswordResetRequested";
pub const PASSWORD_UPDATED: &str = "PasswordUpdated";
pub const PROFILE_UPDATED: &str = "ProfileUpdated";
pub const AVATAR_DELETED: &str = "AvatarDeleted";
pub const USER_CREATED: &str = "UserCreated";
pub const USER_DELETED: &str = "UserDeleted";
pub const ROLES_ATTACHED: &str = "RolesAttached";
pub const ROLES_DETACHED: &str = "RolesDetached";

pub const FIRST_NAME_LEN: &str = "FirstNameLen";
pub const FIRST_NAME_EMPTY: &str = "FirstNameEmpty";
pub const LAST_NAME_LEN: &str = "LastNameLen";
pub const LAST_NAME_EMPTY: &str = "LastNameEmpty";
pub const USER_NAME_LEN: &str = "UserNameLen";
pub const INVALID_EMAIL: &str = "InvalidEmail";
pub const INVALID_PHONE_NUMBER: &str = "InvalidPhoneNumber";
pub const PASSWORD_LEN: &str = "PasswordLen";
pub const INVALID_LOCALE: &str = "InvalidLocale";
pub const INVALID_URL: &str = "InvalidUrl";

pub const EMAIL_OTP_SUBJECT: &str = "EmailOtpSubject";
pub const EMAIL_OTP_BODY: &str = "EmailOtpBody";
pub const WELCOME_SUBJECT: &str = "WelcomeSubject";
pub const WELCOME_BODY: &str = "WelcomeBody";
pub const PASSWORD_RESET_SUBJECT: &str = "PasswordResetSubject";
pub const PASSWORD_RESET_BODY: &str = "PasswordResetBody";
pub const SMS_OTP_BODY: &str = "SmsOtpBody";

lazy_static! {
    static ref MESSAGES: HashMap<(&'static str, &'static str), &'static str> = {
        let en: &[(&str, &str)] = &[
            ("InvalidCredentials", "Incorrect email or password."),
            ("TokenInvalid", "The token is invalid or has expired."),
            ("Unauthenticated", "You need to sign in to continue."),
            ("Forbidden", "You are not allowed to do this."),
            ("NotFound", "The requested item was not found."),
            ("EmailUnavailable", "This email address is already in use."),
            ("PhoneNumberUnavailable", "This phone number is already in use."),
            ("PhoneNumberRequired", "Add a phone number to your account first."),
            ("ValidationFailed", "Some fields are invalid."),
            ("InvalidCursor", "The pagination cursor is invalid."),
            ("InvalidFilter", "The filter is invalid."),
            ("InvalidFilterField", "Cannot filter by \"{{field}}\"."),
            ("InvalidOrderField", "Cannot sort by \"{{field}}\"."),
            ("InvalidClient", "Unknown client application."),
            ("SocialEmailMissing", "Your social account did not share an email address."),
            ("ImageTooLarge", "Image is too large. The maximum size is {{size}}."),
            ("NothingToUpload", "Nothing to upload."),
            ("UnsupportedFileType", "This file type is not supported."),
            ("RateLimited", "Too many requests. Try again later."),
            ("InternalError", "Something went wrong. Please try again."),
            (WELCOME_NEW_USER, "Welcome, {{firstName}}!"),
            (WELCOME_BACK, "Welcome back, {{firstName}}!"),
            (ACCOUNT_CREATED, "Account created. Check your email to verify it."),
            (LOGGED_OUT, "You have been logged out."),
            (TOKEN_REFRESHED, "Session refreshed."),
            (SENT_EMAIL_OTP, "If your account exists, a code was sent to your email."),
            (SENT_PHONE_OTP, "A code was sent to your phone."),
            (EMAIL_VERIFIED, "Your email address is verified."),
            (PHONE_NUMBER_VERIFIED, "Your phone number is verified."),
            (PASSWORD_RESET_REQUESTED, "If your account exists, a reset code was sent to your email."),
            (PASSWORD_UPDATED, "Your password has been updated."),
            (PROFILE_UPDATED, "Your profile has been updated."),
            (AVATAR_DELETED, "Your profile picture has been removed."),
            (USER_CREATED, "User created."),
            (USER_DELETED, "User deleted."),
            (ROLES_ATTACHED, "Roles attached."),
            (ROLES_DETACHED, "Roles detached."),
            (FIRST_NAME_LEN, "First name must be between 2 and 100 characters."),
            (FIRST_NAME_EMPTY, "First name cannot be empty."),
            (LAST_NAME_LEN, "Last name must be between 2 and 100 characters."),
            (LAST_NAME_EMPTY, "Last name cannot be empty."),
            (USER_NAME_LEN, "Username must be between 2 and 100 characters."),
            (INVALID_EMAIL, "Invalid email address."),
            (INVALID_PHONE_NUMBER, "Invalid phone number."),
            (PASSWORD_LEN, "Password must be between 6 and 64 characters."),
            (INVALID_LOCALE, "Invalid language."),
            (INVALID_URL, "Invalid URL."),
            (EMAIL_OTP_SUBJECT, "Your verification code"),
            (EMAIL_OTP_BODY, "Hi {{name}}, your verification code is {{token}}. It expires in 5 minutes."),
            (WELCOME_SUBJECT, "Welcome aboard"),
            (WELCOME_BODY, "Hi {{name}}, your email address is now verified."),
            (PASSWORD_RESET_SUBJECT, "Reset your password"),
            (PASSWORD_RESET_BODY, "Hi {{name}}, use {{token}} to reset your password."),
            (SMS_OTP_BODY, "Your verification code is {{token}}"),
        ];
        let fr: &[(&str, &str)] = &[
            ("InvalidCredentials", "Adresse e-mail ou mot de passe incorrect."),
            ("TokenInvalid", "Le jeton est invalide ou a expiré."),
            ("Unauthenticated", "Connectez-vous pour continuer."),
            ("Forbidden", "Vous n'êtes pas autorisé à faire cela."),
            ("NotFound", "Élément introuvable."),
            ("EmailUnavailable", "Cette adresse e-mail est déjà utilisée."),
            ("PhoneNumberUnavailable", "Ce numéro de téléphone est déjà utilisé."),
            ("PhoneNumberRequired", "Ajoutez d'abord un numéro de téléphone."),
            ("ValidationFailed", "Certains champs sont invalides."),
            ("ImageTooLarge", "Image trop volumineuse. La taille maximale est {{size}}."),
            ("NothingToUpload", "Rien à envoyer."),
            ("RateLimited", "Trop de requêtes. Réessayez plus tard."),
            ("InternalError", "Une erreur est survenue. Veuillez réessayer."),
            (WELCOME_NEW_USER, "Bienvenue, {{firstName}} !"),
            (WELCOME_BACK, "Bon retour, {{firstName}} !"),
            (LOGGED_OUT, "Vous êtes déconnecté."),
            (SENT_EMAIL_OTP, "Si votre compte existe, un code a été envoyé par e-mail."),
            (SENT_PHONE_OTP, "Un code a été envoyé sur votre téléphone."),
            (EMAIL_VERIFIED, "Votre adresse e-mail est vérifiée."),
            (PHONE_NUMBER_VERIFIED, "Votre numéro de téléphone est vérifié."),
            (PASSWORD_UPDATED, "Votre mot de passe a été mis à jour."),
            (EMAIL_OTP_SUBJECT, "Votre code de vérification"),
            (EMAIL_OTP_BODY, "Bonjour {{name}}, votre code de vérification est {{token}}. Il expire dans 5 minutes."),
            (SMS_OTP_BODY, "Votre code de vérification est {{token}}"),
        ];

        let mut m = HashMap::new();
        for (k, v) in en {
            m.insert(("en", *k), *v);
        }
        for (k, v) in fr {
            m.insert(("fr", *k), *v);
        }
        m
    };
}

/// Resolved language for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale(String);

impl Default for Locale {
    fn default() -> Self {
        Self(DEFAULT_LANGUAGE.into())
    }
}

impl Locale {
    /// Supported language, or the default one.
    pub fn new(lang: &str) -> Self {
        let lang = lang.trim().to_lowercase();
        let primary = lang.split(['-', '_']).next().unwrap_or_default();
        if SUPPORTED_LANGUAGES.contains(&primary) {
            Self(primary.to_string())
        } else {
            Self::default()
        }
    }

    /// Picks the first supported language of an `Accept-Language` header,
    /// ignoring quality weights ordering beyond header order.
    pub fn from_accept_language(header: &str) -> Self {
        header
            .split(',')
            .filter_map(|part| part.split(';').next())
            .map(|tag| tag.trim().to_lowercase())
            .find_map(|tag| {
                let primary = tag.split(['-', '_']).next().unwrap_or_default().to_string();
                SUPPORTED_LANGUAGES
                    .contains(&primary.as_str())
                    .then_some(primary)
            })
            .map(Self)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn t(&self, key: &str) -> String {
        self.t_with(key, &[])
    }

    pub fn t_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        let template = MESSAGES
            .get(&(self.0.as_str(), key))
            .or_else(|| MESSAGES.get(&(DEFAULT_LANGUAGE, key)))
            .copied()
            .unwrap_or(key);
        let mut out = template.to_string();
        for (name, value) in args {
            out = out.replace(&format!("{{{{{}}}}}", name), value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_supported_language() {
        assert_eq!(Locale::from_accept_language("de-DE,fr;q=0.8,en;q=0.5").as_str(), "fr");
        assert_eq!(Locale::from_accept_language("en-US").as_str(), "en");
        assert_eq!(Locale::from_accept_language("zz").as_str(), "en");
        assert_eq!(Locale::from_accept_language("").as_str(), "en");
    }

    #[test]
    fn interpolates_placeholders() {
        let msg = Locale::new("en").t_with(WELCOME_BACK, &[("firstName", "Ada")]);
        assert_eq!(msg, "Welcome back, Ada!");
    }

    #[test]
    fn falls_back_to_english_then_key() {
        let fr = Locale::new("fr-CA");
        assert_eq!(fr.as_str(), "fr");
        assert_eq!(fr.t(USER_DELETED), "User deleted.");
        assert_eq!(fr.t("NoSuchKey"), "NoSuchKey");
    }
}
