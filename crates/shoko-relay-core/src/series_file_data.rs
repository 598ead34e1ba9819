use serde::Serialize;
use shoko_relay_models::FileMapping;

/// All file mappings of one series, queryable by Plex season
#[derive(Debug, Clone, Serialize)]
pub struct SeriesFileData {
    pub series_id: u64,
    pub mappings: Vec<FileMapping>,
    /// Distinct seasons present, ascending
    pub seasons: Vec<i32>,
}

impl SeriesFileData {
    pub fn from_mappings(series_id: u64, mappings: Vec<FileMapping>) -> Self {
        let mut seasons: Vec<i32> = mappings.iter().map(|m| m.coords.season).collect();
        seasons.sort_unstable();
        seasons.dedup();
        Self {
            series_id,
            mappings,
            seasons,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Mappings of one season ordered by episode, then part, then file name
    pub fn for_season(&self, season: i32) -> Vec<&FileMapping> {
        let mut mappings: Vec<&FileMapping> = self.mappings.iter().filter(|m| m.coords.season == season).collect();
        mappings.sort_by(|a, b| {
            a.coords
                .episode
                .cmp(&b.coords.episode)
                .then_with(|| a.part_index.unwrap_or(0).cmp(&b.part_index.unwrap_or(0)))
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        mappings
    }

    /// Mapping whose primary episode is `episode_id`, optionally a specific part
    pub fn find_episode(&self, episode_id: u64, part: Option<u32>) -> Option<&FileMapping> {
        self.mappings
            .iter()
            .find(|m| m.primary_episode().id == episode_id && (part.is_none() || m.part_index == part))
    }

    /// Every mapping that covers `episode_id`, primary or not
    pub fn mappings_for_episode(&self, episode_id: u64) -> Vec<&FileMapping> {
        self.mappings
            .iter()
            .filter(|m| m.episodes().any(|e| e.id == episode_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoko_relay_models::{Episode, EpisodeType, PlexCoords, Video};

    fn mapping(video_id: u64, episode_id: u64, coords: PlexCoords, name: &str, part: Option<u32>) -> FileMapping {
        FileMapping {
            video: Video::new(video_id, format!("/a/{}", name)),
            primary_episode: Episode::new(episode_id, EpisodeType::Normal, coords.episode),
            additional_episodes: Vec::new(),
            coords,
            file_name: name.to_string(),
            part_index: part,
            part_count: part.map(|_| 2),
            tmdb_episode: None,
        }
    }

    #[test]
    fn test_seasons_are_distinct_and_sorted() {
        let data = SeriesFileData::from_mappings(
            1,
            vec![
                mapping(1, 10, PlexCoords::new(1, 2), "b.mkv", None),
                mapping(2, 11, PlexCoords::new(0, 1), "s.mkv", None),
                mapping(3, 12, PlexCoords::new(1, 1), "a.mkv", None),
                mapping(4, 13, PlexCoords::new(-2, 1), "t.mkv", None),
            ],
        );
        assert_eq!(data.seasons, vec![-2, 0, 1]);
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn test_for_season_ordering() {
        let data = SeriesFileData::from_mappings(
            1,
            vec![
                mapping(1, 10, PlexCoords::new(1, 3), "z.mkv", Some(2)),
                mapping(2, 11, PlexCoords::new(1, 1), "y.mkv", None),
                mapping(3, 10, PlexCoords::new(1, 3), "x.mkv", Some(1)),
                mapping(4, 12, PlexCoords::new(1, 2), "w [720p].mkv", None),
                mapping(5, 12, PlexCoords::new(1, 2), "v [1080p].mkv", None),
                mapping(6, 13, PlexCoords::new(0, 1), "s.mkv", None),
            ],
        );

        let names: Vec<_> = data.for_season(1).iter().map(|m| m.file_name.as_str()).collect();
        assert_eq!(names, vec!["y.mkv", "v [1080p].mkv", "w [720p].mkv", "x.mkv", "z.mkv"]);
        assert!(data.for_season(5).is_empty());
    }

    #[test]
    fn test_find_episode_by_part() {
        let data = SeriesFileData::from_mappings(
            1,
            vec![
                mapping(1, 10, PlexCoords::new(1, 3), "a.mkv", Some(1)),
                mapping(2, 10, PlexCoords::new(1, 3), "b.mkv", Some(2)),
            ],
        );
        assert_eq!(data.find_episode(10, Some(2)).map(|m| m.video.id), Some(2));
        assert_eq!(data.find_episode(10, None).map(|m| m.video.id), Some(1));
        assert!(data.find_episode(99, None).is_none());
        assert_eq!(data.mappings_for_episode(10).len(), 2);
    }
}
