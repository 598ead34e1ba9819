// Coordinate resolution: Shoko episodes -> Plex (season, episode[, end]) coordinates

use crate::ordering_cache::OrderingCache;
use shoko_relay_config::MappingConfig;
use shoko_relay_models::{Episode, PlexCoords, TmdbEpisode};
use std::collections::HashSet;
use tracing::trace;

/// Resolves Plex coordinates for episodes and files.
///
/// Owns the ordering cache so that every series mapped with the same resolver
/// shares memoized TMDB ordering lookups. Create a fresh resolver (or call
/// [`CoordinateResolver::reset_cache`]) to start cold.
#[derive(Debug, Default)]
pub struct CoordinateResolver {
    tmdb_numbering: bool,
    cache: OrderingCache,
}

impl CoordinateResolver {
    pub fn new(config: &MappingConfig) -> Self {
        Self::with_tmdb_numbering(config.tmdb_episode_numbering)
    }

    pub fn with_tmdb_numbering(enabled: bool) -> Self {
        Self {
            tmdb_numbering: enabled,
            cache: OrderingCache::new(),
        }
    }

    pub fn tmdb_numbering(&self) -> bool {
        self.tmdb_numbering
    }

    pub fn cache(&self) -> &OrderingCache {
        &self.cache
    }

    pub fn reset_cache(&self) {
        self.cache.clear();
    }

    /// Coordinates of a single episode.
    ///
    /// A missing episode maps to `S01E01` so callers always get a usable value.
    pub fn plex_coordinates(&self, episode: Option<&Episode>, preferred_ordering: Option<&str>) -> PlexCoords {
        let Some(episode) = episode else {
            return PlexCoords::default();
        };

        if self.tmdb_numbering && !episode.tmdb_episodes.is_empty() {
            let ordered = self.select_preferred_tmdb_ordering(&episode.tmdb_episodes, preferred_ordering);
            if let Some(coords) = self.tmdb_range_coords(&ordered, preferred_ordering) {
                return coords;
            }
        }

        native_coordinates(episode)
    }

    /// Orders TMDB entries so the ones belonging to the preferred ordering come first.
    ///
    /// Three partitions, each sorted by `(season ?? 0, episode)`:
    /// entries whose own ordering matches, entries listing the ordering among their
    /// alternates, then everything else.
    pub fn select_preferred_tmdb_ordering<'a, I>(&self, entries: I, preferred_ordering: Option<&str>) -> Vec<&'a TmdbEpisode>
    where
        I: IntoIterator<Item = &'a TmdbEpisode>,
    {
        let entries: Vec<&TmdbEpisode> = entries.into_iter().collect();

        let Some(preferred) = preferred_ordering else {
            let mut sorted = entries;
            sorted.sort_by_key(|e| (e.season_number.unwrap_or(0), e.episode_number));
            return sorted;
        };

        let mut own_match = Vec::new();
        let mut alternate_match = Vec::new();
        let mut rest = Vec::new();

        for entry in entries {
            if entry.own_ordering_id() == preferred {
                own_match.push(entry);
            } else if self.in_ordering(entry, preferred) {
                alternate_match.push(entry);
            } else {
                rest.push(entry);
            }
        }

        let sort_key = |e: &&TmdbEpisode| {
            let (season, episode) = self.ordering_coords(e, Some(preferred));
            (season.unwrap_or(0), episode)
        };
        own_match.sort_by_key(sort_key);
        alternate_match.sort_by_key(sort_key);
        rest.sort_by_key(sort_key);

        own_match.extend(alternate_match);
        own_match.extend(rest);
        own_match
    }

    /// Season/episode of a TMDB entry inside the preferred ordering, or its own numbering
    pub fn ordering_coords(&self, tmdb_episode: &TmdbEpisode, preferred_ordering: Option<&str>) -> (Option<i32>, i32) {
        let own = (tmdb_episode.season_number, tmdb_episode.episode_number);
        let Some(preferred) = preferred_ordering else {
            return own;
        };
        if tmdb_episode.own_ordering_id() == preferred {
            return own;
        }

        self.cache.coords_or_insert_with(tmdb_episode.id, preferred, || {
            tmdb_episode
                .find_ordering(preferred)
                .map(|o| (o.season_number, o.episode_number))
                .unwrap_or(own)
        })
    }

    /// TMDB entries of an episode in preferred-ordering order
    pub fn ordered_tmdb_episodes<'a>(&self, episode: &'a Episode, preferred_ordering: Option<&str>) -> Vec<&'a TmdbEpisode> {
        self.select_preferred_tmdb_ordering(&episode.tmdb_episodes, preferred_ordering)
    }

    /// Coordinates for a file linked to `episodes` (already filtered and de-duplicated).
    ///
    /// `file_index` is the file's 0-based position among the primary episode's files;
    /// with TMDB numbering each part can then land on its own TMDB episode.
    pub fn plex_coordinates_for_file(
        &self,
        episodes: &[&Episode],
        file_index: Option<usize>,
        preferred_ordering: Option<&str>,
    ) -> PlexCoords {
        let (Some(first), Some(last)) = (episodes.first(), episodes.last()) else {
            return PlexCoords::default();
        };

        if self.tmdb_numbering && share_single_type(episodes) {
            let mut seen = HashSet::new();
            let gathered: Vec<&TmdbEpisode> = episodes
                .iter()
                .flat_map(|e| e.tmdb_episodes.iter())
                .filter(|t| seen.insert(t.id))
                .collect();

            if !gathered.is_empty() {
                let ordered = self.select_preferred_tmdb_ordering(gathered, preferred_ordering);

                if let Some(entry) = file_index.and_then(|index| ordered.get(index)) {
                    if let (Some(season), episode) = self.ordering_coords(entry, preferred_ordering) {
                        trace!(
                            operation = "coords_for_file",
                            tmdb_episode = entry.id,
                            season,
                            episode,
                            "Using per-part TMDB entry"
                        );
                        return PlexCoords::new(season, episode);
                    }
                }

                if let Some(coords) = self.tmdb_range_coords(&ordered, preferred_ordering) {
                    return coords;
                }
            }
        }

        if episodes.len() == 1 {
            return self.plex_coordinates(Some(*first), preferred_ordering);
        }

        let start = self.plex_coordinates(Some(*first), preferred_ordering);
        let end = self.plex_coordinates(Some(*last), preferred_ordering);
        let end_episode = end.end_episode.unwrap_or(end.episode);
        if start.season == end.season && end_episode > start.episode {
            PlexCoords::with_end(start.season, start.episode, Some(end_episode))
        } else {
            PlexCoords::new(start.season, start.episode)
        }
    }

    /// First entry's coordinates, with a range end when the last entry shares its season
    fn tmdb_range_coords(&self, ordered: &[&TmdbEpisode], preferred_ordering: Option<&str>) -> Option<PlexCoords> {
        let first = ordered.first()?;
        let (season, episode) = self.ordering_coords(first, preferred_ordering);
        let season = season?;

        let mut end_episode = None;
        if ordered.len() > 1 {
            if let Some(last) = ordered.last() {
                let (last_season, last_episode) = self.ordering_coords(last, preferred_ordering);
                if last_season == Some(season) && last_episode > episode {
                    end_episode = Some(last_episode);
                }
            }
        }

        Some(PlexCoords::with_end(season, episode, end_episode))
    }

    fn in_ordering(&self, entry: &TmdbEpisode, ordering_id: &str) -> bool {
        self.cache
            .membership_or_insert_with(entry.id, ordering_id, || entry.find_ordering(ordering_id).is_some())
    }
}

/// AniDB numbering: explicit season when present, otherwise the type bucket
pub fn native_coordinates(episode: &Episode) -> PlexCoords {
    let season = episode
        .season_number
        .unwrap_or_else(|| episode.episode_type.season_bucket());
    PlexCoords::new(season, episode.episode_number)
}

fn share_single_type(episodes: &[&Episode]) -> bool {
    match episodes.split_first() {
        Some((first, rest)) => rest.iter().all(|e| e.episode_type == first.episode_type),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoko_relay_models::{EpisodeType, TmdbOrdering};

    fn tmdb(id: u64, season: i32, episode: i32) -> TmdbEpisode {
        TmdbEpisode {
            id,
            show_id: 100,
            season_number: Some(season),
            episode_number: episode,
            title: Some(format!("TMDB {}", id)),
            overview: None,
            ordering_id: None,
            orderings: Vec::new(),
        }
    }

    fn with_ordering(mut entry: TmdbEpisode, ordering_id: &str, season: i32, episode: i32) -> TmdbEpisode {
        entry.orderings.push(TmdbOrdering {
            ordering_id: ordering_id.to_string(),
            season_number: Some(season),
            episode_number: episode,
        });
        entry
    }

    #[test]
    fn test_normal_episode_native_numbering() {
        let resolver = CoordinateResolver::with_tmdb_numbering(false);
        let episode = Episode::new(1, EpisodeType::Normal, 5);
        assert_eq!(resolver.plex_coordinates(Some(&episode), None), PlexCoords::new(1, 5));
    }

    #[test]
    fn test_special_episode_native_numbering() {
        let resolver = CoordinateResolver::with_tmdb_numbering(false);
        let episode = Episode::new(1, EpisodeType::Special, 5);
        assert_eq!(resolver.plex_coordinates(Some(&episode), None), PlexCoords::new(0, 5));
    }

    #[test]
    fn test_missing_episode_defaults() {
        let resolver = CoordinateResolver::default();
        assert_eq!(resolver.plex_coordinates(None, None), PlexCoords::new(1, 1));
        assert_eq!(resolver.plex_coordinates_for_file(&[], None, None), PlexCoords::new(1, 1));
    }

    #[test]
    fn test_explicit_season_wins_over_type() {
        let resolver = CoordinateResolver::default();
        let mut episode = Episode::new(1, EpisodeType::Normal, 3);
        episode.season_number = Some(2);
        assert_eq!(resolver.plex_coordinates(Some(&episode), None), PlexCoords::new(2, 3));
    }

    #[test]
    fn test_extras_buckets() {
        let resolver = CoordinateResolver::default();
        let credits = Episode::new(1, EpisodeType::Credits, 2);
        let other = Episode::new(2, EpisodeType::Other, 1);
        let unknown = Episode::new(3, EpisodeType::Unknown, 1);
        assert_eq!(resolver.plex_coordinates(Some(&credits), None).season, -1);
        assert_eq!(resolver.plex_coordinates(Some(&other), None).season, -4);
        assert_eq!(resolver.plex_coordinates(Some(&unknown), None).season, -9);
    }

    #[test]
    fn test_tmdb_disabled_ignores_links() {
        let resolver = CoordinateResolver::with_tmdb_numbering(false);
        let mut episode = Episode::new(1, EpisodeType::Normal, 14);
        episode.tmdb_episodes = vec![tmdb(10, 2, 1)];
        assert_eq!(resolver.plex_coordinates(Some(&episode), None), PlexCoords::new(1, 14));
    }

    #[test]
    fn test_tmdb_numbering_single_and_range() {
        let resolver = CoordinateResolver::with_tmdb_numbering(true);
        let mut episode = Episode::new(1, EpisodeType::Normal, 14);
        episode.tmdb_episodes = vec![tmdb(10, 2, 1)];
        assert_eq!(resolver.plex_coordinates(Some(&episode), None), PlexCoords::new(2, 1));

        // Double-length AniDB episode split into two TMDB episodes
        episode.tmdb_episodes = vec![tmdb(12, 2, 3), tmdb(11, 2, 2)];
        assert_eq!(
            resolver.plex_coordinates(Some(&episode), None),
            PlexCoords::with_end(2, 2, Some(3))
        );

        // Range across seasons is not a range
        episode.tmdb_episodes = vec![tmdb(13, 2, 12), tmdb(14, 3, 1)];
        assert_eq!(resolver.plex_coordinates(Some(&episode), None), PlexCoords::new(2, 12));
    }

    #[test]
    fn test_tmdb_entry_without_season_falls_back_to_native() {
        let resolver = CoordinateResolver::with_tmdb_numbering(true);
        let mut episode = Episode::new(1, EpisodeType::Normal, 7);
        let mut entry = tmdb(10, 1, 1);
        entry.season_number = None;
        episode.tmdb_episodes = vec![entry];
        assert_eq!(resolver.plex_coordinates(Some(&episode), None), PlexCoords::new(1, 7));
    }

    #[test]
    fn test_ordering_selection_partitions() {
        let resolver = CoordinateResolver::with_tmdb_numbering(true);

        let mut own = tmdb(1, 1, 9);
        own.ordering_id = Some("arc".to_string());
        let alternate = with_ordering(tmdb(2, 3, 4), "arc", 1, 2);
        let unrelated = tmdb(3, 1, 1);

        let entries = vec![unrelated.clone(), alternate.clone(), own.clone()];
        let ordered = resolver.select_preferred_tmdb_ordering(&entries, Some("arc"));
        let ids: Vec<u64> = ordered.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        // No preference: plain (season, episode) sort on own numbering
        let ordered = resolver.select_preferred_tmdb_ordering(&entries, None);
        let ids: Vec<u64> = ordered.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_ordering_coords_use_alternate_numbering() {
        let resolver = CoordinateResolver::with_tmdb_numbering(true);
        let entry = with_ordering(tmdb(5, 3, 4), "arc", 1, 2);

        assert_eq!(resolver.ordering_coords(&entry, None), (Some(3), 4));
        assert_eq!(resolver.ordering_coords(&entry, Some("arc")), (Some(1), 2));
        assert_eq!(resolver.ordering_coords(&entry, Some("missing")), (Some(3), 4));

        let mut episode = Episode::new(1, EpisodeType::Normal, 30);
        episode.tmdb_episodes = vec![entry];
        assert_eq!(resolver.plex_coordinates(Some(&episode), Some("arc")), PlexCoords::new(1, 2));
    }

    #[test]
    fn test_ordering_lookups_are_cached() {
        let resolver = CoordinateResolver::with_tmdb_numbering(true);
        let entries = vec![with_ordering(tmdb(5, 3, 4), "arc", 1, 2), tmdb(6, 1, 1)];

        resolver.select_preferred_tmdb_ordering(&entries, Some("arc"));
        let cached = resolver.cache().len();
        assert!(cached > 0);

        resolver.select_preferred_tmdb_ordering(&entries, Some("arc"));
        assert_eq!(resolver.cache().len(), cached);

        resolver.reset_cache();
        assert!(resolver.cache().is_empty());
    }

    #[test]
    fn test_file_spanning_two_episodes() {
        let resolver = CoordinateResolver::with_tmdb_numbering(false);
        let first = Episode::new(1, EpisodeType::Normal, 5);
        let second = Episode::new(2, EpisodeType::Normal, 6);
        assert_eq!(
            resolver.plex_coordinates_for_file(&[&first, &second], None, None),
            PlexCoords::with_end(1, 5, Some(6))
        );
    }

    #[test]
    fn test_file_spanning_two_seasons_has_no_range() {
        let resolver = CoordinateResolver::with_tmdb_numbering(false);
        let normal = Episode::new(1, EpisodeType::Normal, 5);
        let special = Episode::new(2, EpisodeType::Special, 1);
        assert_eq!(
            resolver.plex_coordinates_for_file(&[&normal, &special], None, None),
            PlexCoords::new(1, 5)
        );
    }

    #[test]
    fn test_file_range_requires_increasing_end() {
        let resolver = CoordinateResolver::with_tmdb_numbering(false);
        let later = Episode::new(1, EpisodeType::Normal, 6);
        let earlier = Episode::new(2, EpisodeType::Normal, 5);
        assert_eq!(
            resolver.plex_coordinates_for_file(&[&later, &earlier], None, None),
            PlexCoords::new(1, 6)
        );
    }

    #[test]
    fn test_file_index_selects_tmdb_part() {
        let resolver = CoordinateResolver::with_tmdb_numbering(true);
        let mut episode = Episode::new(1, EpisodeType::Normal, 1);
        episode.tmdb_episodes = vec![tmdb(21, 1, 2), tmdb(20, 1, 1)];

        assert_eq!(resolver.plex_coordinates_for_file(&[&episode], Some(0), None), PlexCoords::new(1, 1));
        assert_eq!(resolver.plex_coordinates_for_file(&[&episode], Some(1), None), PlexCoords::new(1, 2));
        // Out of range index falls back to the whole range
        assert_eq!(
            resolver.plex_coordinates_for_file(&[&episode], Some(2), None),
            PlexCoords::with_end(1, 1, Some(2))
        );
    }

    #[test]
    fn test_file_with_mixed_types_skips_tmdb_gathering() {
        let resolver = CoordinateResolver::with_tmdb_numbering(true);
        let mut normal = Episode::new(1, EpisodeType::Normal, 12);
        normal.tmdb_episodes = vec![tmdb(30, 1, 12)];
        let mut special = Episode::new(2, EpisodeType::Special, 1);
        special.tmdb_episodes = vec![tmdb(31, 0, 4)];

        // Falls back to per-episode coordinates: S01E12 and S00E04 differ in season
        assert_eq!(
            resolver.plex_coordinates_for_file(&[&normal, &special], None, None),
            PlexCoords::new(1, 12)
        );
    }

    #[test]
    fn test_shared_tmdb_entry_counted_once() {
        let resolver = CoordinateResolver::with_tmdb_numbering(true);
        let mut first = Episode::new(1, EpisodeType::Normal, 1);
        first.tmdb_episodes = vec![tmdb(40, 1, 1)];
        let mut second = Episode::new(2, EpisodeType::Normal, 2);
        second.tmdb_episodes = vec![tmdb(40, 1, 1)];

        assert_eq!(
            resolver.plex_coordinates_for_file(&[&first, &second], None, None),
            PlexCoords::new(1, 1)
        );
    }
}
