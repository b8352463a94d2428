//! Two-layer result cache: an in-process moka front over Redis SETEX keys.
//!
//! Keys follow `wa_cache:{e164}` / `tg_cache:{e164}`. Cache failures are
//! absorbed and logged; a broken cache only costs extra checker calls.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use numwatch_core::limits::CACHE_TTL_SECS;
use numwatch_core::{CachedStatus, Platform, ResultCache};
use redis::AsyncCommands;
use telemetry::metrics;
use tracing::warn;

use crate::client::RedisClient;

const LOCAL_CAPACITY: u64 = 100_000;

pub fn cache_key(platform: Platform, e164: &str) -> String {
    match platform {
        Platform::Whatsapp => format!("wa_cache:{e164}"),
        Platform::Telegram => format!("tg_cache:{e164}"),
    }
}

pub struct RedisCache {
    client: RedisClient,
    local: Cache<String, CachedStatus>,
}

impl RedisCache {
    pub fn new(client: RedisClient) -> Self {
        let local = Cache::builder()
            .max_capacity(LOCAL_CAPACITY)
            .time_to_live(Duration::from_secs(CACHE_TTL_SECS))
            .build();
        Self { client, local }
    }

    async fn get_remote(&self, key: &str) -> Option<CachedStatus> {
        let mut conn = self.client.connection();
        let raw: Option<String> = match conn.get(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                return None;
            }
        };
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn get(&self, platform: Platform, e164: &str) -> Option<CachedStatus> {
        let key = cache_key(platform, e164);

        if let Some(hit) = self.local.get(&key).await {
            metrics().cache_hits.inc();
            return Some(hit);
        }

        match self.get_remote(&key).await {
            Some(entry) => {
                metrics().cache_hits.inc();
                self.local.insert(key, entry.clone()).await;
                Some(entry)
            }
            None => {
                metrics().cache_misses.inc();
                None
            }
        }
    }

    async fn set(&self, platform: Platform, e164: &str, entry: CachedStatus, ttl_secs: u64) {
        let key = cache_key(platform, e164);
        self.local.insert(key.clone(), entry.clone()).await;

        let payload = match serde_json::to_string(&entry) {
            Ok(p) => p,
            Err(e) => {
                warn!(key, error = %e, "Cache entry serialization failed");
                return;
            }
        };

        let mut conn = self.client.connection();
        let written: std::result::Result<(), redis::RedisError> =
            conn.set_ex(&key, payload, ttl_secs).await;
        if let Err(e) = written {
            warn!(key, error = %e, "Cache write failed");
        }
    }
}
