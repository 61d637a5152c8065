//! Steam Web API client.
//! Only the two `ISteamUser` endpoints the lookup flow needs are wrapped.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use steamid_core::config::SteamApiConfig;
use steamid_core::PlayerSummary;
use tracing::debug;

/// `ResolveVanityURL` success code.
pub const VANITY_URL_SUCCESS: u8 = 1;
/// `ResolveVanityURL` code for an unknown vanity name.
pub const VANITY_URL_NOT_FOUND: u8 = 42;

/// Source of player summaries for a set of SteamID64s.
///
/// Ids the source cannot resolve are left out of the returned map; an `Err`
/// means the whole call failed and nothing in it can be trusted.
#[async_trait]
pub trait SummaryFetcher: Send + Sync {
    async fn fetch_summaries(
        &self,
        steam_ids: &[String],
    ) -> anyhow::Result<HashMap<String, PlayerSummary>>;
}

/// Maps a custom profile name (`steamcommunity.com/id/<name>`) to a SteamID64.
#[async_trait]
pub trait VanityResolver: Send + Sync {
    async fn resolve_vanity(&self, vanity_name: &str) -> anyhow::Result<VanityUrlResolution>;
}

/// Every Steam Web API response wraps its payload in `{"response": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Default, Deserialize)]
struct PlayerList {
    #[serde(default)]
    players: Vec<PlayerSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VanityUrlResolution {
    #[serde(default)]
    pub steamid: Option<String>,
    pub success: u8,
    #[serde(default)]
    pub message: Option<String>,
}

impl VanityUrlResolution {
    /// The resolved SteamID64, if Steam reported success.
    pub fn steam_id(&self) -> Option<&str> {
        if self.success == VANITY_URL_SUCCESS {
            self.steamid.as_deref()
        } else {
            None
        }
    }
}

pub struct SteamApiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SteamApiClient {
    pub fn new(config: &SteamApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> anyhow::Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Doing GET request");

        let response = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("steam api returned {}", status.as_u16());
        }

        Ok(response.json::<T>().await?)
    }

    /// Fetch summaries for up to 100 SteamID64s in one call.
    pub async fn get_player_summaries(
        &self,
        steam_ids: &[String],
    ) -> anyhow::Result<HashMap<String, PlayerSummary>> {
        let joined = steam_ids.join(",");
        let envelope: Envelope<PlayerList> = self
            .get("ISteamUser/GetPlayerSummaries/v0002/", &[("steamids", joined.as_str())])
            .await?;

        Ok(index_players(envelope.response.players))
    }

    pub async fn resolve_vanity_url(
        &self,
        vanity_name: &str,
    ) -> anyhow::Result<VanityUrlResolution> {
        let envelope: Envelope<VanityUrlResolution> = self
            .get("ISteamUser/ResolveVanityURL/v0001", &[("vanityurl", vanity_name)])
            .await?;

        Ok(envelope.response)
    }
}

#[async_trait]
impl SummaryFetcher for SteamApiClient {
    async fn fetch_summaries(
        &self,
        steam_ids: &[String],
    ) -> anyhow::Result<HashMap<String, PlayerSummary>> {
        self.get_player_summaries(steam_ids).await
    }
}

#[async_trait]
impl VanityResolver for SteamApiClient {
    async fn resolve_vanity(&self, vanity_name: &str) -> anyhow::Result<VanityUrlResolution> {
        self.resolve_vanity_url(vanity_name).await
    }
}

fn index_players(players: Vec<PlayerSummary>) -> HashMap<String, PlayerSummary> {
    players
        .into_iter()
        .map(|player| (player.steamid.clone(), player))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_list_indexed_by_steamid() {
        let body = r#"{"response":{"players":[
            {"steamid":"76561197960435530","personaname":"Robin","timecreated":1063407589},
            {"steamid":"76561197960287930","personaname":"Rabscuttle"}
        ]}}"#;
        let envelope: Envelope<PlayerList> = serde_json::from_str(body).unwrap();
        let players = index_players(envelope.response.players);

        assert_eq!(players.len(), 2);
        assert_eq!(players["76561197960435530"].personaname, "Robin");
        assert_eq!(players["76561197960287930"].timecreated, None);
    }

    #[test]
    fn test_empty_response_yields_empty_map() {
        let envelope: Envelope<PlayerList> = serde_json::from_str(r#"{"response":{}}"#).unwrap();
        assert!(index_players(envelope.response.players).is_empty());
    }

    #[test]
    fn test_vanity_resolution_codes() {
        let found: Envelope<VanityUrlResolution> =
            serde_json::from_str(r#"{"response":{"steamid":"76561197960435530","success":1}}"#)
                .unwrap();
        assert_eq!(found.response.steam_id(), Some("76561197960435530"));

        let missing: Envelope<VanityUrlResolution> =
            serde_json::from_str(r#"{"response":{"success":42,"message":"No match"}}"#).unwrap();
        assert_eq!(missing.response.success, VANITY_URL_NOT_FOUND);
        assert_eq!(missing.response.steam_id(), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = SteamApiClient::new(&SteamApiConfig::default()).unwrap();
        assert_eq!(client.base_url, "http://api.steampowered.com");
    }
}
