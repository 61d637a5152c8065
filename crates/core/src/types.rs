use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One player as returned by `ISteamUser/GetPlayerSummaries`.
///
/// Steam omits fields the profile keeps private, so everything except the
/// id falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub steamid: String,
    #[serde(default)]
    pub personaname: String,
    #[serde(default)]
    pub profileurl: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub avatarmedium: String,
    #[serde(default)]
    pub avatarfull: String,
    #[serde(default)]
    pub avatarhash: String,
    #[serde(default)]
    pub realname: String,
    #[serde(default)]
    pub loccountrycode: String,
    #[serde(default)]
    pub locstatecode: String,
    #[serde(default)]
    pub loccityid: Option<u64>,
    #[serde(default)]
    pub primaryclanid: String,
    #[serde(default)]
    pub communityvisibilitystate: u8,
    #[serde(default)]
    pub profilestate: u8,
    #[serde(default)]
    pub personastate: u8,
    #[serde(default)]
    pub personastateflags: u32,
    /// Unix timestamp of account creation; absent for private profiles.
    #[serde(default)]
    pub timecreated: Option<i64>,
}

/// Profile blob kept in the cache, keyed by SteamID64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub username: String,
    pub avatar: String,
    pub custom_url: String,
    pub real_name: String,
    pub steam_id64: String,
    pub location: String,
    pub created_at: i64,
    pub last_updated: i64,
}

impl ProfileData {
    pub fn from_summary(summary: &PlayerSummary, fetched_at: DateTime<Utc>) -> Self {
        Self {
            username: summary.personaname.clone(),
            avatar: summary.avatarfull.clone(),
            custom_url: summary.profileurl.clone(),
            real_name: summary.realname.clone(),
            steam_id64: summary.steamid.clone(),
            location: summary.loccountrycode.clone(),
            created_at: summary.timecreated.unwrap_or_default(),
            last_updated: fetched_at.timestamp(),
        }
    }

    /// Placeholder stored when Steam has no profile for the id.
    pub fn missing(steam_id64: &str, checked_at: DateTime<Utc>) -> Self {
        Self {
            username: String::new(),
            avatar: String::new(),
            custom_url: String::new(),
            real_name: String::new(),
            steam_id64: steam_id64.to_string(),
            location: String::new(),
            created_at: 0,
            last_updated: checked_at.timestamp(),
        }
    }

    pub fn is_missing(&self) -> bool {
        self.username.is_empty()
    }

    pub fn profile_url(&self) -> String {
        format!("https://steamcommunity.com/profiles/{}", self.steam_id64)
    }

    /// Seconds since this entry was fetched, clamped at zero.
    pub fn age_secs(&self, now: DateTime<Utc>) -> u64 {
        (now.timestamp() - self.last_updated).max(0) as u64
    }
}
