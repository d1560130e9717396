use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

/// Expiring key-value store for sessions, OTPs and cached permissions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn set(&self, key: &str, value: &str, expires_in_secs: u64) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
    /// Increments a counter, starting its expiry window on first increment.
    async fn increment(&self, key: &str, window_secs: u64) -> anyhow::Result<i64>;
}

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("parse redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("connect to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn set(&self, key: &str, value: &str, expires_in_secs: u64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, expires_in_secs)
            .await
            .with_context(|| format!("redis set {}", key))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .with_context(|| format!("redis get {}", key))?;
        Ok(value)
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(key)
            .await
            .with_context(|| format!("redis del {}", key))?;
        Ok(())
    }

    async fn increment(&self, key: &str, window_secs: u64) -> anyhow::Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = conn
            .incr(key, 1)
            .await
            .with_context(|| format!("redis incr {}", key))?;
        if count == 1 {
            let _: () = conn
                .expire(key, window_secs as i64)
                .await
                .with_context(|| format!("redis expire {}", key))?;
        }
        Ok(count)
    }
}

/// Process-local store used in tests and single-node development.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((_, exp)) if *exp <= Instant::now() => {
                entries.remove(key);
                None
            }
            Some((v, _)) => Some(v.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set(&self, key: &str, value: &str, expires_in_secs: u64) -> anyhow::Result<()> {
        let exp = Instant::now() + Duration::from_secs(expires_in_secs);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), (value.to_string(), exp));
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.live(key))
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, window_secs: u64) -> anyhow::Result<i64> {
        let current = self.live(key);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let (count, exp) = match current {
            Some(v) => {
                let exp = entries
                    .get(key)
                    .map(|(_, exp)| *exp)
                    .unwrap_or_else(|| Instant::now() + Duration::from_secs(window_secs));
                (v.parse::<i64>().unwrap_or(0) + 1, exp)
            }
            None => (1, Instant::now() + Duration::from_secs(window_secs)),
        };
        entries.insert(key.to_string(), (count.to_string(), exp));
        Ok(count)
    }
}
