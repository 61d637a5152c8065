//! Cache-first profile lookup.
//!
//! Cached profiles are served directly. Misses go through the summary
//! batcher so concurrent lookups share one Steam call, and the result is
//! written back to the cache. A "no such profile" answer is cached as well,
//! but only trusted for `negative_ttl`.
//!
//! Queries that are not a SteamID64 are treated as custom profile names and
//! resolved through `ResolveVanityURL` before the lookup.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use steamid_cache::ProfileStore;
use steamid_core::{AppConfig, LookupError, LookupResult, ProfileData};
use steamid_steam_api::{SummaryBatcher, VanityResolver};
use tracing::{debug, info, warn};

const STEAM_ID64_LEN: usize = 17;

pub struct ProfileService {
    batcher: Arc<SummaryBatcher>,
    resolver: Arc<dyn VanityResolver>,
    store: Arc<dyn ProfileStore>,
    fetch_timeout: Duration,
    negative_ttl: Duration,
}

impl ProfileService {
    pub fn new(
        batcher: Arc<SummaryBatcher>,
        resolver: Arc<dyn VanityResolver>,
        store: Arc<dyn ProfileStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            batcher,
            resolver,
            store,
            fetch_timeout: config.batcher.fetch_timeout(),
            negative_ttl: Duration::from_secs(config.redis.negative_ttl_secs),
        }
    }

    /// Look up a profile by SteamID64 or custom profile name.
    pub async fn lookup(&self, query: &str) -> LookupResult<ProfileData> {
        let steam_id64 = self.resolve_steam_id(query.trim()).await?;
        self.get_profile(&steam_id64).await
    }

    /// Map a query to a SteamID64. Seventeen-digit queries pass through untouched.
    pub async fn resolve_steam_id(&self, query: &str) -> LookupResult<String> {
        if is_steam_id64(query) {
            return Ok(query.to_string());
        }
        if query.is_empty() {
            return Err(LookupError::NotFound(query.to_string()));
        }

        let resolve = self.resolver.resolve_vanity(query);
        let resolved = tokio::time::timeout(self.fetch_timeout, resolve)
            .await
            .map_err(|_| LookupError::DeadlineExceeded)
            .and_then(|result| result.map_err(|e| LookupError::Upstream(e.to_string())));

        let resolution = match resolved {
            Ok(resolution) => resolution,
            Err(e) => {
                record_failure(query, &e);
                return Err(e);
            }
        };

        match resolution.steam_id() {
            Some(steam_id64) => {
                debug!(vanity = query, steam_id = steam_id64, "Resolved custom profile name");
                Ok(steam_id64.to_string())
            }
            None => {
                debug!(
                    vanity = query,
                    success = resolution.success,
                    "Custom profile name did not resolve"
                );
                Err(LookupError::NotFound(query.to_string()))
            }
        }
    }

    pub async fn get_profile(&self, steam_id64: &str) -> LookupResult<ProfileData> {
        match self.store.get_profile(steam_id64).await {
            Ok(Some(cached)) if !cached.is_missing() => {
                metrics::counter!("profiles.cache_hit").increment(1);
                debug!(steam_id = steam_id64, "Serving cached profile");
                return Ok(cached);
            }
            Ok(Some(cached)) => {
                if cached.age_secs(Utc::now()) < self.negative_ttl.as_secs() {
                    return Err(LookupError::NotFound(steam_id64.to_string()));
                }
                info!(steam_id = steam_id64, "Cached missing profile is stale, refetching");
            }
            Ok(None) => {
                metrics::counter!("profiles.cache_miss").increment(1);
            }
            Err(e) => {
                warn!(steam_id = steam_id64, error = %e, "Profile cache read failed");
            }
        }

        let fetched = self
            .batcher
            .fetch_one_within(steam_id64, self.fetch_timeout)
            .await;

        let now = Utc::now();
        let (profile, outcome) = match fetched {
            Ok(summary) => {
                let profile = ProfileData::from_summary(&summary, now);
                (profile.clone(), Ok(profile))
            }
            Err(LookupError::NotFound(id)) => {
                (ProfileData::missing(steam_id64, now), Err(LookupError::NotFound(id)))
            }
            Err(e) => {
                record_failure(steam_id64, &e);
                return Err(e);
            }
        };

        if let Err(e) = self.store.put_profile(steam_id64, &profile).await {
            warn!(steam_id = steam_id64, error = %e, "Profile cache write failed");
        }

        outcome
    }
}

fn is_steam_id64(query: &str) -> bool {
    query.len() == STEAM_ID64_LEN && query.bytes().all(|b| b.is_ascii_digit())
}

fn record_failure(query: &str, error: &LookupError) {
    if error.is_cancellation() {
        metrics::counter!("profiles.abandoned").increment(1);
        debug!(query = query, error = %error, "Lookup abandoned before completion");
    } else {
        metrics::counter!("profiles.failed").increment(1);
        warn!(query = query, error = %error, "Lookup failed");
    }
}
