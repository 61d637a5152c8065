//! steamid-lookup — resolve Steam profiles for SteamID64s or custom profile names.
//!
//! Every id is looked up concurrently through one profile service, so the
//! misses are coalesced into as few Steam API calls as the batch size allows.

use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use steamid_cache::{LocalCache, ProfileStore, RedisCache};
use steamid_core::config::AppConfig;
use steamid_core::ProfileData;
use steamid_profiles::ProfileService;
use steamid_steam_api::{SteamApiClient, SummaryBatcher};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str =
    "steamid_lookup=info,steamid_steam_api=info,steamid_cache=info,steamid_profiles=info";

#[derive(Parser, Debug)]
#[command(name = "steamid-lookup")]
#[command(about = "Look up Steam profile data by SteamID64 or custom profile name")]
#[command(version)]
struct Cli {
    /// SteamID64s or custom profile names to look up
    #[arg(required = true)]
    queries: Vec<String>,

    /// Steam Web API key (overrides config)
    #[arg(long, env = "STEAM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Maximum ids per Steam API call (overrides config)
    #[arg(long, env = "STEAMID__BATCHER__MAX_BATCH_SIZE")]
    max_batch_size: Option<usize>,

    /// Flush interval for partial batches in milliseconds (overrides config)
    #[arg(long, env = "STEAMID__BATCHER__FLUSH_INTERVAL_MS")]
    flush_interval_ms: Option<u64>,

    /// Skip Redis and cache in-process only
    #[arg(long, default_value_t = false)]
    no_cache: bool,
}

#[derive(Serialize)]
struct LookupLine<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<&'a ProfileData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(api_key) = cli.api_key {
        config.steam.api_key = api_key;
    }
    if let Some(size) = cli.max_batch_size {
        config.batcher.max_batch_size = size;
    }
    if let Some(interval) = cli.flush_interval_ms {
        config.batcher.flush_interval_ms = interval;
    }
    config.validate()?;

    if config.steam.api_key.is_empty() {
        warn!("No Steam API key configured, requests will likely be rejected");
    }

    info!(
        ids = cli.queries.len(),
        max_batch_size = config.batcher.max_batch_size,
        flush_interval_ms = config.batcher.flush_interval_ms,
        "Configuration loaded"
    );

    let client = Arc::new(SteamApiClient::new(&config.steam)?);
    let batcher = Arc::new(SummaryBatcher::new(client.clone(), &config.batcher)?);
    let store = open_store(&config, cli.no_cache).await;
    let service = Arc::new(ProfileService::new(batcher.clone(), client, store, &config));

    let mut lookups = JoinSet::new();
    for (index, query) in cli.queries.iter().enumerate() {
        let service = service.clone();
        let query = query.clone();
        lookups.spawn(async move { (index, service.lookup(&query).await) });
    }

    let mut results = vec![None; cli.queries.len()];
    while let Some(joined) = lookups.join_next().await {
        match joined {
            Ok((index, outcome)) => results[index] = Some(outcome),
            Err(e) => error!(error = %e, "Lookup task failed"),
        }
    }

    let mut failures = 0usize;
    for (query, outcome) in cli.queries.iter().zip(&results) {
        let line = match outcome {
            Some(Ok(profile)) => LookupLine {
                query,
                profile_url: Some(profile.profile_url()),
                profile: Some(profile),
                error: None,
            },
            Some(Err(e)) => {
                failures += 1;
                LookupLine {
                    query,
                    profile_url: None,
                    profile: None,
                    error: Some(e.to_string()),
                }
            }
            None => {
                failures += 1;
                LookupLine {
                    query,
                    profile_url: None,
                    profile: None,
                    error: Some("lookup task did not complete".to_string()),
                }
            }
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    drop(service);
    match Arc::try_unwrap(batcher) {
        Ok(batcher) => batcher.shutdown().await,
        Err(batcher) => batcher.close(),
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} lookups failed", cli.queries.len());
    }
    Ok(())
}

async fn open_store(config: &AppConfig, no_cache: bool) -> Arc<dyn ProfileStore> {
    let fallback = || -> Arc<dyn ProfileStore> {
        Arc::new(LocalCache::new(Duration::from_secs(config.redis.ttl_secs), 10_000))
    };

    if no_cache {
        info!("Redis disabled, using in-process cache");
        return fallback();
    }

    match RedisCache::new(&config.redis).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!(error = %e, "Failed to connect to Redis, using in-process cache");
            fallback()
        }
    }
}
