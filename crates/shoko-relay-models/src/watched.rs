use crate::episode::EpisodeType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which Plex account reported an item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PlexUserKind {
    Admin,
    Extra,
}

/// A watched episode as reported by Plex for one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlexWatchedItem {
    pub rating_key: String,
    pub guid: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Show title (`grandparentTitle` in Plex)
    #[serde(default)]
    pub show_title: Option<String>,
    #[serde(default)]
    pub library_section_id: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub view_count: u32,
    #[serde(default)]
    pub last_viewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShokoUser {
    pub id: u64,
    pub username: String,
}

/// Episode details needed by the watched sync, resolved from a Shoko episode id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShokoEpisodeInfo {
    pub episode_id: u64,
    pub series_id: u64,
    pub series_title: String,
    pub episode_title: String,
    pub episode_number: i32,
    pub episode_type: EpisodeType,
    pub video_count: usize,
}

/// Result of a successful watched-state write
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchRecord {
    pub user_id: u64,
    pub episode_id: u64,
    pub watched_at: DateTime<Utc>,
}

/// Why a Plex watched item was not applied to Shoko
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotInSection,
    NoShokoGuid,
    Duplicate,
    AlreadyWatched,
    NoFiles,
    ApplyFailed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotInSection => "not_in_section",
            SkipReason::NoShokoGuid => "no_shoko_guid",
            SkipReason::Duplicate => "duplicate",
            SkipReason::AlreadyWatched => "already_watched",
            SkipReason::NoFiles => "no_files",
            SkipReason::ApplyFailed => "apply_failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the watched-sync audit trail, produced for every examined item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchedAuditRecord {
    pub plex_user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shoko_episode_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<i32>,
    pub rating_key: String,
    pub guid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub would_mark: bool,
    pub already_watched_in_shoko: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
}
