use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed season numbers used for Plex season buckets.
///
/// These values end up inside season rating keys (`{seriesId}s{season}`), so
/// Plex clients cache them. They must never change.
pub struct PlexSeason;

impl PlexSeason {
    pub const SPECIALS: i32 = 0;
    pub const STANDARD: i32 = 1;
    pub const CREDITS: i32 = -1;
    pub const TRAILERS: i32 = -2;
    pub const PARODY: i32 = -3;
    pub const OTHER: i32 = -4;
    pub const UNKNOWN: i32 = -9;

    /// True for the negative "extras" buckets (credits, trailers, parodies, featurettes, unknown)
    pub fn is_extras(season: i32) -> bool {
        season < 0
    }

    /// Human readable season title as shown in Plex
    pub fn title(season: i32) -> String {
        match season {
            Self::SPECIALS => "Specials".to_string(),
            Self::CREDITS => "Credits".to_string(),
            Self::TRAILERS => "Trailers".to_string(),
            Self::PARODY => "Parodies".to_string(),
            Self::OTHER => "Featurettes".to_string(),
            Self::UNKNOWN => "Unknown".to_string(),
            n => format!("Season {}", n),
        }
    }

    /// Folder name used by the virtual file system.
    ///
    /// Negative buckets use the local extras folder names Plex understands.
    pub fn folder_name(season: i32) -> String {
        match season {
            Self::SPECIALS => "Specials".to_string(),
            Self::CREDITS => "Shorts".to_string(),
            Self::TRAILERS => "Trailers".to_string(),
            Self::PARODY => "Scenes".to_string(),
            Self::OTHER => "Featurettes".to_string(),
            Self::UNKNOWN => "Other".to_string(),
            n if n < 0 => "Other".to_string(),
            n => format!("Season {:02}", n),
        }
    }
}

/// Plex season/episode coordinate for a single file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PlexCoords {
    pub season: i32,
    pub episode: i32,
    /// Last episode of a contiguous range inside `season`, only for multi-episode files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_episode: Option<i32>,
}

impl PlexCoords {
    pub fn new(season: i32, episode: i32) -> Self {
        Self {
            season,
            episode,
            end_episode: None,
        }
    }

    pub fn with_end(season: i32, episode: i32, end_episode: Option<i32>) -> Self {
        Self {
            season,
            episode,
            end_episode,
        }
    }

    /// `(season, episode)` key used for sorting and de-duplication
    pub fn key(&self) -> (i32, i32) {
        (self.season, self.episode)
    }

    pub fn is_range(&self) -> bool {
        self.end_episode.is_some()
    }
}

impl Default for PlexCoords {
    fn default() -> Self {
        Self::new(PlexSeason::STANDARD, 1)
    }
}

impl fmt::Display for PlexCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.episode)?;
        if let Some(end) = self.end_episode {
            write!(f, "-E{:02}", end)?;
        }
        Ok(())
    }
}
