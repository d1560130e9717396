//! Mail and SMS delivery through an HTTP provider.

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{config::NotifyConfig, i18n, i18n::Locale};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    Otp,
    Welcome,
    PasswordReset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsMessage {
    pub to: String,
    pub text: String,
}

/// Values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateLocals<'a> {
    pub name: &'a str,
    pub token: &'a str,
}

impl EmailTemplate {
    pub fn render(self, locale: &Locale, locals: &TemplateLocals<'_>) -> (String, String) {
        let (subject, body) = match self {
            EmailTemplate::Otp => (i18n::EMAIL_OTP_SUBJECT, i18n::EMAIL_OTP_BODY),
            EmailTemplate::Welcome => (i18n::WELCOME_SUBJECT, i18n::WELCOME_BODY),
            EmailTemplate::PasswordReset => (i18n::PASSWORD_RESET_SUBJECT, i18n::PASSWORD_RESET_BODY),
        };
        let args = [("name", locals.name), ("token", locals.token)];
        (locale.t(subject), locale.t_with(body, &args))
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, message: EmailMessage) -> anyhow::Result<()>;
    async fn send_sms(&self, message: SmsMessage) -> anyhow::Result<()>;
}

/// Renders and sends a templated email. Delivery failures are logged, not returned.
pub async fn send_templated_email(
    notifier: &dyn Notifier,
    from: &str,
    to: &str,
    template: EmailTemplate,
    locale: &Locale,
    locals: TemplateLocals<'_>,
) {
    let (subject, text) = template.render(locale, &locals);
    let message = EmailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject,
        text,
    };
    if let Err(e) = notifier.send_email(message).await {
        warn!(error = %e, ?template, "email delivery failed");
    }
}

pub struct HttpNotifier {
    http: reqwest::Client,
    cfg: NotifyConfig,
}

impl HttpNotifier {
    pub fn new(cfg: NotifyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> anyhow::Result<()> {
        self.http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?
            .error_for_status()
            .with_context(|| format!("provider rejected POST {}", url))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_email(&self, message: EmailMessage) -> anyhow::Result<()> {
        self.post(&self.cfg.mail_api_url, &message).await?;
        debug!(to = %message.to, "email sent");
        Ok(())
    }

    async fn send_sms(&self, message: SmsMessage) -> anyhow::Result<()> {
        self.post(&self.cfg.sms_api_url, &message).await?;
        debug!(to = %message.to, "sms sent");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records messages instead of sending them.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub emails: Mutex<Vec<EmailMessage>>,
        pub sms: Mutex<Vec<SmsMessage>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_email(&self, message: EmailMessage) -> anyhow::Result<()> {
            self.emails.lock().unwrap().push(message);
            Ok(())
        }

        async fn send_sms(&self, message: SmsMessage) -> anyhow::Result<()> {
            self.sms.lock().unwrap().push(message);
            Ok(())
        }
    }
}
