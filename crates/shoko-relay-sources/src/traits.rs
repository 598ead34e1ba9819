use crate::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shoko_relay_models::{PlexUserKind, PlexWatchedItem, Series, ShokoEpisodeInfo, ShokoUser};

/// Read access to the Shoko collection
#[async_trait]
pub trait ShokoLibrary: Send + Sync {
    fn source_name(&self) -> &str;

    async fn list_series_ids(&self) -> Result<Vec<u64>, SourceError>;

    /// Full series graph: episodes, videos with cross-references and TMDB links
    async fn series(&self, series_id: u64) -> Result<Series, SourceError>;

    /// `None` when the episode does not exist
    async fn episode_info(&self, episode_id: u64) -> Result<Option<ShokoEpisodeInfo>, SourceError>;
}

/// Per-user watch state in Shoko
#[async_trait]
pub trait ShokoUserData: Send + Sync {
    async fn list_users(&self) -> Result<Vec<ShokoUser>, SourceError>;

    async fn is_watched(&self, user_id: u64, episode_id: u64) -> Result<bool, SourceError>;

    async fn set_watched(
        &self,
        user_id: u64,
        episode_id: u64,
        watched_at: Option<DateTime<Utc>>,
    ) -> Result<(), SourceError>;
}

/// Watched episodes of one Plex user
#[async_trait]
pub trait PlexWatchedSource: Send + Sync {
    /// Name used in reports: "admin" or the configured extra user name
    fn user_label(&self) -> &str;

    fn user_kind(&self) -> PlexUserKind;

    /// Watched episode items of a library section. `since` limits to items last
    /// viewed at or after that instant.
    async fn watched_episodes(
        &self,
        library_section: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlexWatchedItem>, SourceError>;
}
