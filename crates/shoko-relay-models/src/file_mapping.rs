use crate::coords::PlexCoords;
use crate::episode::Episode;
use crate::tmdb::TmdbEpisode;
use crate::video::Video;
use serde::{Deserialize, Serialize};

/// Final placement of one video inside the Plex season/episode layout.
///
/// The primary episode decides the rating key and title; further episodes covered by
/// the same file follow in coordinate order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMapping {
    pub video: Video,
    pub primary_episode: Episode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_episodes: Vec<Episode>,
    pub coords: PlexCoords,
    pub file_name: String,
    /// 1-based part number when the primary episode is split over several files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_count: Option<u32>,
    /// TMDB episode whose title/summary should be shown for this part
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_episode: Option<TmdbEpisode>,
}

impl FileMapping {
    pub fn primary_episode(&self) -> &Episode {
        &self.primary_episode
    }

    /// Primary episode first, then the additional ones
    pub fn episodes(&self) -> impl Iterator<Item = &Episode> {
        std::iter::once(&self.primary_episode).chain(self.additional_episodes.iter())
    }

    pub fn episode_count(&self) -> usize {
        1 + self.additional_episodes.len()
    }

    pub fn episode_ids(&self) -> Vec<u64> {
        self.episodes().map(|e| e.id).collect()
    }

    pub fn is_multi_part(&self) -> bool {
        self.part_count.map(|c| c > 1).unwrap_or(false)
    }

    /// Title to present: TMDB override first, then the primary episode title
    pub fn display_title(&self) -> String {
        self.tmdb_episode
            .as_ref()
            .and_then(|t| t.title.clone())
            .unwrap_or_else(|| self.primary_episode().display_title())
    }

    pub fn display_summary(&self) -> Option<String> {
        self.tmdb_episode
            .as_ref()
            .and_then(|t| t.overview.clone())
            .or_else(|| self.primary_episode().summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::EpisodeType;

    fn mapping() -> FileMapping {
        FileMapping {
            video: Video::new(1, "/anime/Show/Show - 05-06.mkv"),
            primary_episode: Episode::new(10, EpisodeType::Normal, 5),
            additional_episodes: vec![Episode::new(11, EpisodeType::Normal, 6)],
            coords: PlexCoords::with_end(1, 5, Some(6)),
            file_name: "Show - 05-06.mkv".to_string(),
            part_index: None,
            part_count: None,
            tmdb_episode: None,
        }
    }

    #[test]
    fn test_primary_episode_comes_first() {
        let mapping = mapping();
        assert_eq!(mapping.episode_ids(), vec![10, 11]);
        assert_eq!(mapping.episode_count(), 2);
        assert_eq!(mapping.primary_episode().id, 10);
    }

    #[test]
    fn test_mapping_without_primary_episode_is_rejected() {
        let mut value = serde_json::to_value(mapping()).unwrap();
        value.as_object_mut().unwrap().remove("primary_episode");
        assert!(serde_json::from_value::<FileMapping>(value).is_err());

        let mut value = serde_json::to_value(mapping()).unwrap();
        value.as_object_mut().unwrap().remove("additional_episodes");
        let single: FileMapping = serde_json::from_value(value).unwrap();
        assert_eq!(single.episode_ids(), vec![10]);
    }
}
