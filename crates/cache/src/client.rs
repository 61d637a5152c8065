//! Redis-backed profile store with an in-process L1 in front.

use crate::local::LocalCache;
use crate::store::ProfileStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use steamid_core::config::RedisConfig;
use steamid_core::ProfileData;
use tracing::{debug, info};

const L1_CAPACITY: usize = 100_000;

pub struct RedisCache {
    redis: ConnectionManager,
    l1: LocalCache,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisCache {
    /// Opens a managed connection to the first configured node and PINGs it,
    /// so an unreachable server fails here rather than on the first lookup.
    pub async fn new(config: &RedisConfig) -> anyhow::Result<Self> {
        let node = config
            .urls
            .first()
            .map(String::as_str)
            .unwrap_or("redis://localhost:6379");
        info!(node = node, "Opening Redis profile store");

        let mut redis = ConnectionManager::new(redis::Client::open(node)?).await?;
        let _: String = redis::cmd("PING").query_async(&mut redis).await?;
        debug!(node = node, "Redis answered PING");

        // L1 entries expire at half the Redis TTL.
        let l1 = LocalCache::new(Duration::from_secs(config.ttl_secs / 2), L1_CAPACITY);

        Ok(Self {
            redis,
            l1,
            key_prefix: config.key_prefix.clone(),
            ttl_secs: config.ttl_secs,
        })
    }

    fn key(&self, steam_id: &str) -> String {
        format!("{}{}", self.key_prefix, steam_id)
    }
}

#[async_trait]
impl ProfileStore for RedisCache {
    async fn get_profile(&self, steam_id: &str) -> anyhow::Result<Option<ProfileData>> {
        if let Some(profile) = self.l1.get(steam_id) {
            metrics::counter!("profile_cache.hit", "tier" => "l1").increment(1);
            return Ok(Some(profile));
        }

        let mut redis = self.redis.clone();
        let stored: Option<String> = redis.get(self.key(steam_id)).await?;
        let Some(blob) = stored else {
            metrics::counter!("profile_cache.miss").increment(1);
            return Ok(None);
        };

        let profile: ProfileData = serde_json::from_str(&blob)?;
        self.l1.put(steam_id.to_string(), profile.clone());
        metrics::counter!("profile_cache.hit", "tier" => "redis").increment(1);
        Ok(Some(profile))
    }

    async fn put_profile(&self, steam_id: &str, profile: &ProfileData) -> anyhow::Result<()> {
        let blob = serde_json::to_string(profile)?;
        let mut redis = self.redis.clone();
        redis
            .set_ex::<_, _, ()>(self.key(steam_id), blob, self.ttl_secs)
            .await?;
        self.l1.put(steam_id.to_string(), profile.clone());
        Ok(())
    }
}
