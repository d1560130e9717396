use anyhow::Context;
use rand::{rngs::OsRng, Rng};
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::Store;

pub const OTP_LENGTH: usize = 6;
/// Wrong guesses tolerated before the pending code is discarded.
pub const MAX_ATTEMPTS: i64 = 5;
// outlives any code ttl; reset whenever a code is issued
const ATTEMPT_WINDOW_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Email,
    Phone,
    PasswordReset,
}

impl OtpPurpose {
    fn prefix(self) -> &'static str {
        match self {
            OtpPurpose::Email => "email_otp",
            OtpPurpose::Phone => "phone_otp",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }

    pub fn key(self, user_id: Uuid) -> String {
        format!("{}:{}", self.prefix(), user_id)
    }

    fn attempts_key(self, user_id: Uuid) -> String {
        format!("{}:attempts", self.key(user_id))
    }
}

/// Zero-padded numeric code.
pub fn generate() -> String {
    let n: u32 = OsRng.gen_range(0..10u32.pow(OTP_LENGTH as u32));
    format!("{:0width$}", n, width = OTP_LENGTH)
}

/// Generates and stores a fresh code, replacing any pending one.
pub async fn issue(store: &dyn Store, purpose: OtpPurpose, user_id: Uuid, ttl_secs: u64) -> anyhow::Result<String> {
    let code = generate();
    store
        .remove(&purpose.attempts_key(user_id))
        .await
        .context("reset otp attempts")?;
    store
        .set(&purpose.key(user_id), &code, ttl_secs)
        .await
        .context("store otp")?;
    Ok(code)
}

/// Checks and consumes a pending code. After `MAX_ATTEMPTS` wrong guesses the
/// code is discarded and a new one has to be requested.
pub async fn consume(store: &dyn Store, purpose: OtpPurpose, user_id: Uuid, code: &str) -> AppResult<()> {
    let key = purpose.key(user_id);
    let attempts_key = purpose.attempts_key(user_id);
    let Some(expected) = store.get(&key).await.context("load otp")? else {
        return Err(AppError::TokenInvalid);
    };
    if expected == code.trim() {
        store.remove(&key).await.context("remove otp")?;
        store.remove(&attempts_key).await.context("reset otp attempts")?;
        return Ok(());
    }

    let attempts = store
        .increment(&attempts_key, ATTEMPT_WINDOW_SECS)
        .await
        .context("count otp attempts")?;
    if attempts >= MAX_ATTEMPTS {
        warn!(%user_id, ?purpose, attempts, "too many wrong codes; discarding");
        store.remove(&key).await.context("remove otp")?;
        store.remove(&attempts_key).await.context("reset otp attempts")?;
    }
    Err(AppError::TokenInvalid)
}
