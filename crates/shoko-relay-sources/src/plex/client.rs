use crate::plex::api::PlexHttpClient;
use crate::traits::PlexWatchedSource;
use crate::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shoko_relay_models::{PlexUserKind, PlexWatchedItem};
use tracing::debug;

pub const ADMIN_LABEL: &str = "admin";

/// One Plex account on the configured server
pub struct PlexSource {
    label: String,
    kind: PlexUserKind,
    api: PlexHttpClient,
}

impl PlexSource {
    pub fn admin(server_url: &str, token: &str) -> Result<Self, SourceError> {
        Ok(Self {
            label: ADMIN_LABEL.to_string(),
            kind: PlexUserKind::Admin,
            api: PlexHttpClient::new(token, server_url)?,
        })
    }

    pub fn extra_user(name: &str, server_url: &str, token: &str) -> Result<Self, SourceError> {
        Ok(Self {
            label: name.to_string(),
            kind: PlexUserKind::Extra,
            api: PlexHttpClient::new(token, server_url)?,
        })
    }

    pub fn api(&self) -> &PlexHttpClient {
        &self.api
    }
}

/// Items last viewed before `since` are dropped; items with no view time are kept
pub(crate) fn viewed_since(items: Vec<PlexWatchedItem>, since: Option<DateTime<Utc>>) -> Vec<PlexWatchedItem> {
    match since {
        Some(since) => items
            .into_iter()
            .filter(|item| item.last_viewed_at.map(|t| t >= since).unwrap_or(true))
            .collect(),
        None => items,
    }
}

#[async_trait]
impl PlexWatchedSource for PlexSource {
    fn user_label(&self) -> &str {
        &self.label
    }

    fn user_kind(&self) -> PlexUserKind {
        self.kind.clone()
    }

    async fn watched_episodes(
        &self,
        library_section: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlexWatchedItem>, SourceError> {
        let items = self.api.get_watched_episodes(library_section).await?;
        let items = viewed_since(items, since);
        debug!("Plex user {} has {} watched episodes in section {}", self.label, items.len(), library_section);
        Ok(items)
    }
}
