use async_trait::async_trait;
use steamid_core::ProfileData;

/// Keyed profile storage with expiry handled by the implementation.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, steam_id: &str) -> anyhow::Result<Option<ProfileData>>;

    async fn put_profile(&self, steam_id: &str, profile: &ProfileData) -> anyhow::Result<()>;
}
