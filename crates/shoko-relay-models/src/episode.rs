use crate::coords::PlexSeason;
use crate::tmdb::TmdbEpisode;
use serde::{Deserialize, Serialize};

/// AniDB episode type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EpisodeType {
    Normal,
    Special,
    Credits,
    Trailer,
    Parody,
    Other,
    #[serde(other)]
    Unknown,
}

impl EpisodeType {
    /// Season bucket used when an episode has no explicit season number
    pub fn season_bucket(&self) -> i32 {
        match self {
            EpisodeType::Normal => PlexSeason::STANDARD,
            EpisodeType::Special => PlexSeason::SPECIALS,
            EpisodeType::Credits => PlexSeason::CREDITS,
            EpisodeType::Trailer => PlexSeason::TRAILERS,
            EpisodeType::Parody => PlexSeason::PARODY,
            EpisodeType::Other => PlexSeason::OTHER,
            EpisodeType::Unknown => PlexSeason::UNKNOWN,
        }
    }
}

/// Narrow view of an episode used by filters that only care about visibility and type
pub trait TypedEpisode {
    fn episode_type(&self) -> EpisodeType;
    fn is_hidden(&self) -> bool;
}

/// Shoko episode as seen by the mapping engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Episode {
    pub id: u64,
    #[serde(rename = "type")]
    pub episode_type: EpisodeType,
    pub episode_number: i32,
    #[serde(default)]
    pub season_number: Option<i32>,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tmdb_episodes: Vec<TmdbEpisode>,
    /// Ids of the videos attached to this episode, in host order
    #[serde(default)]
    pub video_ids: Vec<u64>,
}

impl Episode {
    pub fn new(id: u64, episode_type: EpisodeType, episode_number: i32) -> Self {
        Self {
            id,
            episode_type,
            episode_number,
            season_number: None,
            is_hidden: false,
            title: None,
            summary: None,
            tmdb_episodes: Vec::new(),
            video_ids: Vec::new(),
        }
    }

    pub fn with_videos(mut self, video_ids: Vec<u64>) -> Self {
        self.video_ids = video_ids;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("Episode {}", self.episode_number))
    }
}

impl TypedEpisode for Episode {
    fn episode_type(&self) -> EpisodeType {
        self.episode_type
    }

    fn is_hidden(&self) -> bool {
        self.is_hidden
    }
}
