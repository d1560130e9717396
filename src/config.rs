use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    /// Client IDs accepted as token audiences. The first one is the default client.
    pub audiences: Vec<String>,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub avatar_max_bytes: usize,
    pub image_cdn_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    pub mail_api_url: String,
    pub sms_api_url: String,
    pub api_key: String,
    pub mail_from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: i64,
    pub window_seconds: u64,
    /// Reverse proxies in front of the service. Zero ignores `X-Forwarded-For`.
    pub trusted_proxy_hops: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub jwt: JwtConfig,
    pub otp_ttl_seconds: u64,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
    pub google_client_id: Option<String>,
    pub rate_limit: RateLimitConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = env_or("REDIS_URL", "redis://127.0.0.1:6379");

        let audiences: Vec<String> = env_or("JWT_AUDIENCE", "userbase-web")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        anyhow::ensure!(!audiences.is_empty(), "JWT_AUDIENCE must name at least one client");

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is required")?,
            issuer: env_or("JWT_ISSUER", "userbase"),
            audiences,
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 15),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };

        let storage = StorageConfig {
            endpoint: env_or("MINIO_ENDPOINT", "http://127.0.0.1:9000"),
            bucket: env_or("MINIO_BUCKET", "userbase"),
            access_key: std::env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY is required")?,
            secret_key: std::env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY is required")?,
            region: env_or("S3_REGION", "us-east-1"),
            avatar_max_bytes: env_parse("AVATAR_MAX_BYTES", 5 * 1024 * 1024),
            image_cdn_url: env_or("IMAGE_CDN_URL", "http://127.0.0.1:9000"),
        };

        let notify = NotifyConfig {
            mail_api_url: env_or("MAIL_API_URL", "http://127.0.0.1:8025/api/send"),
            sms_api_url: env_or("SMS_API_URL", "http://127.0.0.1:8025/api/sms"),
            api_key: env_or("NOTIFY_API_KEY", ""),
            mail_from: env_or("MAIL_FROM", "no-reply@userbase.local"),
        };

        let rate_limit = RateLimitConfig {
            max_requests: env_parse("RATE_LIMIT_MAX", 100),
            window_seconds: env_parse("RATE_LIMIT_WINDOW_SECONDS", 60),
            trusted_proxy_hops: env_parse("TRUSTED_PROXY_HOPS", 0),
        };

        Ok(Self {
            database_url,
            redis_url,
            jwt,
            otp_ttl_seconds: env_parse("OTP_TTL_SECONDS", 5 * 60),
            storage,
            notify,
            google_client_id: std::env::var("GOOGLE_CLIENT_ID").ok().filter(|v| !v.is_empty()),
            rate_limit,
        })
    }

    pub fn default_client(&self) -> &str {
        // from_env guarantees at least one audience
        self.jwt.audiences.first().map(String::as_str).unwrap_or_default()
    }
}
