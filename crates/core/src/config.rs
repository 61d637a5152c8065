use serde::Deserialize;
use std::time::Duration;

use crate::error::{LookupError, LookupResult};

/// Steam's GetPlayerSummaries endpoint accepts at most this many ids per call.
pub const STEAM_MAX_SUMMARY_IDS: usize = 100;

/// Root application configuration. Loaded from an optional `steamid.toml`
/// file and environment variables with the prefix `STEAMID__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub steam: SteamApiConfig,
    #[serde(default)]
    pub batcher: BatcherConfig,
    #[serde(default)]
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SteamApiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatcherConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Deadline applied to a single lookup waiting on the batcher.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// How long a cached "no such profile" entry is trusted before refetching.
    #[serde(default = "default_negative_ttl_secs")]
    pub negative_ttl_secs: u64,
}

// Default functions
fn default_base_url() -> String {
    "http://api.steampowered.com/".to_string()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_max_batch_size() -> usize {
    STEAM_MAX_SUMMARY_IDS
}
fn default_flush_interval_ms() -> u64 {
    100
}
fn default_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_redis_urls() -> Vec<String> {
    vec!["redis://localhost:6379".to_string()]
}
fn default_ttl_secs() -> u64 {
    60 * 60 * 24 * 7
}
fn default_key_prefix() -> String {
    "steamid:".to_string()
}
fn default_negative_ttl_secs() -> u64 {
    60
}

impl Default for SteamApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: default_redis_urls(),
            ttl_secs: default_ttl_secs(),
            key_prefix: default_key_prefix(),
            negative_ttl_secs: default_negative_ttl_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            steam: SteamApiConfig::default(),
            batcher: BatcherConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

impl BatcherConfig {
    /// The flush interval is kept in whole milliseconds; sub-millisecond
    /// remainders round up so a nonzero interval never collapses to zero.
    pub fn new(max_batch_size: usize, flush_interval: Duration) -> Self {
        let flush_interval_ms = flush_interval.as_micros().div_ceil(1000);
        Self {
            max_batch_size,
            flush_interval_ms: u64::try_from(flush_interval_ms).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Inbound queue capacity; callers wait once this many requests are queued.
    pub fn channel_capacity(&self) -> usize {
        self.max_batch_size * 2
    }

    pub fn validate(&self) -> LookupResult<()> {
        if self.max_batch_size == 0 {
            return Err(LookupError::Config(
                "batcher.max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_batch_size > STEAM_MAX_SUMMARY_IDS {
            return Err(LookupError::Config(format!(
                "batcher.max_batch_size {} exceeds the Steam limit of {}",
                self.max_batch_size, STEAM_MAX_SUMMARY_IDS
            )));
        }
        if self.flush_interval_ms == 0 {
            return Err(LookupError::Config(
                "batcher.flush_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl SteamApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from an optional config file and environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("steamid").required(false))
            .add_source(
                config::Environment::with_prefix("STEAMID")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("redis.urls"),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn validate(&self) -> LookupResult<()> {
        self.batcher.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_steam_limits() {
        let config = AppConfig::default();
        assert_eq!(config.batcher.max_batch_size, 100);
        assert_eq!(config.batcher.flush_interval(), Duration::from_millis(100));
        assert_eq!(config.batcher.channel_capacity(), 200);
        assert_eq!(config.redis.ttl_secs, 604_800);
        assert_eq!(config.redis.key_prefix, "steamid:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_batch_settings() {
        let mut batcher = BatcherConfig::new(0, Duration::from_millis(100));
        assert!(matches!(batcher.validate(), Err(LookupError::Config(_))));

        batcher.max_batch_size = 101;
        assert!(matches!(batcher.validate(), Err(LookupError::Config(_))));

        batcher.max_batch_size = 10;
        batcher.flush_interval_ms = 0;
        assert!(matches!(batcher.validate(), Err(LookupError::Config(_))));
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[batcher]\nmax_batch_size = 25\n\n[steam]\napi_key = \"abc\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.batcher.max_batch_size, 25);
        assert_eq!(config.batcher.flush_interval_ms, 100);
        assert_eq!(config.steam.api_key, "abc");
        assert_eq!(config.steam.base_url, "http://api.steampowered.com/");
        assert_eq!(config.redis.negative_ttl_secs, 60);
    }

    #[test]
    fn test_sub_millisecond_flush_interval_rounds_up() {
        let batcher = BatcherConfig::new(1, Duration::from_micros(300));
        assert_eq!(batcher.flush_interval_ms, 1);
        assert!(batcher.validate().is_ok());

        let batcher = BatcherConfig::new(1, Duration::from_micros(2_500));
        assert_eq!(batcher.flush_interval(), Duration::from_millis(3));

        let batcher = BatcherConfig::new(1, Duration::from_millis(40));
        assert_eq!(batcher.flush_interval_ms, 40);
    }
}
