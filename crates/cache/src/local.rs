//! Process-local profile cache with a fixed time-to-live.
//! Sits in front of Redis as L1, and stands in for it when Redis is down.

use crate::store::ProfileStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use steamid_core::ProfileData;

struct CacheEntry {
    profile: ProfileData,
    stored: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored.elapsed() <= ttl
    }
}

pub struct LocalCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl LocalCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::with_capacity(capacity.min(4096))),
            ttl,
            capacity,
        }
    }

    /// Fresh copy of the cached profile, if any. Stale entries are dropped on read.
    pub fn get(&self, steam_id: &str) -> Option<ProfileData> {
        match self.entries.get(steam_id) {
            Some(entry) if entry.is_fresh(self.ttl) => return Some(entry.profile.clone()),
            Some(_) => {}
            None => return None,
        }
        self.drop_if_stale(steam_id);
        None
    }

    /// Removal re-checks freshness under the shard lock, so a profile written
    /// after the stale read survives.
    fn drop_if_stale(&self, steam_id: &str) {
        self.entries
            .remove_if(steam_id, |_, entry| !entry.is_fresh(self.ttl));
    }

    /// Store a profile. A full cache sweeps stale entries first and gives up
    /// on new keys if that frees nothing; existing keys are always refreshed.
    pub fn put(&self, steam_id: String, profile: ProfileData) {
        let is_new = !self.entries.contains_key(&steam_id);
        if is_new && self.entries.len() >= self.capacity {
            self.evict_expired();
            if self.entries.len() >= self.capacity {
                metrics::counter!("cache.l1.skipped").increment(1);
                return;
            }
        }
        let entry = CacheEntry {
            profile,
            stored: Instant::now(),
        };
        self.entries.insert(steam_id, entry);
    }

    /// Sweep stale entries; returns the number removed.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(ttl));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ProfileStore for LocalCache {
    async fn get_profile(&self, steam_id: &str) -> anyhow::Result<Option<ProfileData>> {
        Ok(self.get(steam_id))
    }

    async fn put_profile(&self, steam_id: &str, profile: &ProfileData) -> anyhow::Result<()> {
        self.put(steam_id.to_string(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(steam_id: &str, username: &str) -> ProfileData {
        let mut profile = ProfileData::missing(steam_id, Utc::now());
        profile.username = username.to_string();
        profile
    }

    #[test]
    fn test_put_then_get() {
        let cache = LocalCache::new(Duration::from_secs(60), 10);
        cache.put("76561197960435530".into(), profile("76561197960435530", "Robin"));

        let hit = cache.get("76561197960435530").unwrap();
        assert_eq!(hit.username, "Robin");
        assert!(cache.get("76561197960287930").is_none());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = LocalCache::new(Duration::ZERO, 10);
        cache.put("a".into(), profile("a", "A"));
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_cache_sweeps_expired_before_skipping() {
        let cache = LocalCache::new(Duration::ZERO, 1);
        cache.put("a".into(), profile("a", "A"));
        std::thread::sleep(Duration::from_millis(5));

        cache.put("b".into(), profile("b", "B"));
        assert_eq!(cache.len(), 1);
        assert!(cache.entries.contains_key("b"));
    }

    #[test]
    fn test_full_cache_skips_new_keys_but_updates_existing() {
        let cache = LocalCache::new(Duration::from_secs(60), 1);
        cache.put("a".into(), profile("a", "A"));
        cache.put("b".into(), profile("b", "B"));
        assert!(cache.get("b").is_none());

        cache.put("a".into(), profile("a", "A2"));
        assert_eq!(cache.get("a").unwrap().username, "A2");
    }

    #[tokio::test]
    async fn test_profile_store_roundtrip() {
        let cache = LocalCache::new(Duration::from_secs(60), 10);
        let store: &dyn ProfileStore = &cache;

        store.put_profile("a", &profile("a", "A")).await.unwrap();
        assert_eq!(store.get_profile("a").await.unwrap().unwrap().username, "A");
        assert!(store.get_profile("b").await.unwrap().is_none());
    }

    #[test]
    fn test_stale_removal_keeps_concurrent_refresh() {
        let cache = LocalCache::new(Duration::from_millis(20), 10);
        cache.put("a".into(), profile("a", "A"));
        std::thread::sleep(Duration::from_millis(30));

        // A reader saw the stale entry; a writer refreshes it before the reader removes it.
        assert!(!cache.entries.get("a").unwrap().is_fresh(cache.ttl));
        cache.put("a".into(), profile("a", "A2"));
        cache.drop_if_stale("a");

        assert_eq!(cache.get("a").unwrap().username, "A2");
    }
}
