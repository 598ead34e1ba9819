// File mapping: one Plex placement per video of a series

use crate::plex_mapping::{native_coordinates, CoordinateResolver};
use crate::series_file_data::SeriesFileData;
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use shoko_relay_config::{AmbiguousTypePolicy, MappingConfig, OrderingSource};
use shoko_relay_models::{Episode, EpisodeType, FileMapping, PlexCoords, PlexSeason, Series, TypedEpisode, Video};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, trace};

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").unwrap());

// cd1, CD 2, disc3, disk_1, part2, Part.B, pt1, dvd2
static SPLIT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])(?:cd|dvd|disc|disk|part|pt)(?:[ ._-]*\d{1,2}|[ ._-]+[a-d])(?:[^a-z0-9]|$)").unwrap()
});

/// True when a file name carries a multi-file split marker outside of bracketed tags
pub fn has_split_marker(file_name: &str) -> bool {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let stripped = BRACKETED.replace_all(stem, " ");
    SPLIT_MARKER.is_match(&stripped)
}

/// Sort key giving a stable, human order for file names: "E03.mkv" before "E03-part2.mkv"
fn file_sort_key(video: &Video) -> (String, String, u64) {
    let name = video.file_name();
    let stem = Path::new(&name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&name)
        .to_lowercase();
    (stem, name, video.id)
}

/// Precedence of each episode in a video's cross-references: `Order` ascending, then
/// `Percentage` descending, then list position. Lower rank is more authoritative.
fn cross_reference_ranks(video: &Video) -> HashMap<u64, usize> {
    let mut refs: Vec<(usize, &shoko_relay_models::CrossReference)> = video.cross_references.iter().enumerate().collect();
    refs.sort_by_key(|(index, xref)| (xref.order, Reverse(xref.percentage), *index));

    let mut ranks = HashMap::new();
    for (_, xref) in refs {
        let next = ranks.len();
        ranks.entry(xref.episode_id).or_insert(next);
    }
    ranks
}

fn episode_ids(list: &[(&Episode, PlexCoords)]) -> Vec<u64> {
    list.iter().map(|(e, _)| e.id).collect()
}

fn outranks(candidate: Option<usize>, current: Option<usize>) -> bool {
    match (candidate, current) {
        (Some(a), Some(b)) => a < b,
        (Some(_), None) => true,
        _ => false,
    }
}

/// One candidate episode of a video as seen by the trace
#[derive(Debug, Clone, Serialize)]
pub struct CandidateTrace {
    pub episode_id: u64,
    pub episode_type: EpisodeType,
    pub coords: PlexCoords,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_reference_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipCause {
    /// Mixed episode types with no cross-reference to settle them, dropped by policy
    AmbiguousTypes,
    NoCandidates,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VideoOutcome {
    Mapped,
    Skipped { cause: SkipCause },
}

/// Every intermediate decision taken for one video
#[derive(Debug, Clone, Serialize)]
pub struct VideoTrace {
    pub video_id: u64,
    pub file_name: String,
    pub candidates: Vec<CandidateTrace>,
    /// Type picked from the cross-references when candidates had mixed types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authoritative_type: Option<EpisodeType>,
    pub after_type_filter: Vec<u64>,
    pub sorted: Vec<u64>,
    pub deduplicated: Vec<u64>,
    pub ranked: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    pub part_eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coords: Option<PlexCoords>,
    /// Season a featurette was moved to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featurettes_fallback: Option<i32>,
    pub outcome: VideoOutcome,
    #[serde(skip)]
    pub mapping: Option<FileMapping>,
}

/// Trace of a whole series build
#[derive(Debug, Clone, Serialize)]
pub struct SeriesTrace {
    pub series_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_ordering: Option<String>,
    pub standard_season_empty: bool,
    pub specials_season_empty: bool,
    pub videos: Vec<VideoTrace>,
}

impl SeriesTrace {
    pub fn mappings(&self) -> Vec<&FileMapping> {
        self.videos.iter().filter_map(|v| v.mapping.as_ref()).collect()
    }

    pub fn into_mappings(self) -> Vec<FileMapping> {
        self.videos.into_iter().filter_map(|v| v.mapping).collect()
    }

    pub fn video(&self, video_id: u64) -> Option<&VideoTrace> {
        self.videos.iter().find(|v| v.video_id == video_id)
    }
}

/// Builds [`FileMapping`]s for a series.
///
/// Pure with respect to its inputs: the same series graph and config always give the
/// same mappings in the same order.
#[derive(Debug)]
pub struct FileMappingBuilder {
    config: MappingConfig,
    resolver: CoordinateResolver,
}

/// Which seasons received files, taken from the placed mappings before featurettes move
#[derive(Debug, Clone, Copy)]
struct SeasonOccupancy {
    standard_empty: bool,
    specials_empty: bool,
}

impl SeasonOccupancy {
    fn from_traces(traces: &[VideoTrace]) -> Self {
        let placed = || traces.iter().filter_map(|t| t.mapping.as_ref()).map(|m| m.coords.season);
        Self {
            standard_empty: !placed().any(|season| season == PlexSeason::STANDARD),
            specials_empty: !placed().any(|season| season == PlexSeason::SPECIALS),
        }
    }

    fn featurettes_target(&self) -> Option<i32> {
        if self.standard_empty {
            Some(PlexSeason::STANDARD)
        } else if self.specials_empty {
            Some(PlexSeason::SPECIALS)
        } else {
            None
        }
    }
}

impl FileMappingBuilder {
    pub fn new(config: MappingConfig) -> Self {
        let resolver = CoordinateResolver::new(&config);
        Self { config, resolver }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn resolver(&self) -> &CoordinateResolver {
        &self.resolver
    }

    /// Series-level preferred TMDB ordering, resolved once per build
    pub fn preferred_ordering(&self, series: &Series) -> Option<String> {
        match self.config.ordering_source {
            OrderingSource::Series => series.effective_ordering_id(),
            OrderingSource::Default => None,
        }
    }

    pub fn build_file_mappings(&self, series: &Series) -> Vec<FileMapping> {
        self.trace_file_mappings(series).into_mappings()
    }

    pub fn series_file_data(&self, series: &Series) -> SeriesFileData {
        SeriesFileData::from_mappings(series.id, self.build_file_mappings(series))
    }

    /// Builds the mappings and keeps every intermediate list for inspection
    pub fn trace_file_mappings(&self, series: &Series) -> SeriesTrace {
        let videos_by_id = series.videos_by_id();

        let visible: Vec<&Episode> = series
            .episodes
            .iter()
            .filter(|e| !e.is_hidden() && e.video_ids.iter().any(|id| videos_by_id.contains_key(id)))
            .collect();

        let preferred = self.preferred_ordering(series);
        let preferred = preferred.as_deref();

        let coords_by_episode: HashMap<u64, PlexCoords> = visible
            .par_iter()
            .map(|e| (e.id, self.resolver.plex_coordinates(Some(*e), preferred)))
            .collect();

        let mut candidates_by_video: HashMap<u64, Vec<(&Episode, PlexCoords)>> = HashMap::new();
        for episode in &visible {
            let coords = coords_by_episode
                .get(&episode.id)
                .copied()
                .unwrap_or_else(|| native_coordinates(episode));
            for video_id in &episode.video_ids {
                if !videos_by_id.contains_key(video_id) {
                    continue;
                }
                let entry = candidates_by_video.entry(*video_id).or_default();
                if !entry.iter().any(|(e, _)| e.id == episode.id) {
                    entry.push((*episode, coords));
                }
            }
        }

        let mut videos: Vec<&Video> = candidates_by_video
            .keys()
            .filter_map(|id| videos_by_id.get(id).copied())
            .collect();
        videos.sort_by_cached_key(|v| file_sort_key(v));

        let mut traces = Vec::with_capacity(videos.len());
        for video in videos {
            let candidates = candidates_by_video.remove(&video.id).unwrap_or_default();
            traces.push(self.map_video(video, candidates, &videos_by_id, preferred));
        }

        let occupancy = SeasonOccupancy::from_traces(&traces);
        if let Some(season) = occupancy.featurettes_target() {
            for trace in &mut traces {
                let Some(mapping) = trace.mapping.as_mut() else {
                    continue;
                };
                if mapping.coords.season == PlexSeason::OTHER {
                    mapping.coords.season = season;
                    trace.coords = Some(mapping.coords);
                    trace.featurettes_fallback = Some(season);
                }
            }
        }

        let mapped = traces.iter().filter(|t| t.mapping.is_some()).count();
        debug!(
            operation = "build_file_mappings",
            series_id = series.id,
            episodes = visible.len(),
            videos = traces.len(),
            mapped,
            skipped = traces.len() - mapped,
            "Built file mappings"
        );

        SeriesTrace {
            series_id: series.id,
            preferred_ordering: preferred.map(|s| s.to_string()),
            standard_season_empty: occupancy.standard_empty,
            specials_season_empty: occupancy.specials_empty,
            videos: traces,
        }
    }

    fn map_video<'a>(
        &self,
        video: &Video,
        candidates: Vec<(&'a Episode, PlexCoords)>,
        videos_by_id: &HashMap<u64, &Video>,
        preferred: Option<&str>,
    ) -> VideoTrace {
        let ranks = cross_reference_ranks(video);
        let rank_of = |episode: &Episode| ranks.get(&episode.id).copied();

        let mut trace = VideoTrace {
            video_id: video.id,
            file_name: video.file_name(),
            candidates: candidates
                .iter()
                .map(|(episode, coords)| {
                    let xref = video.cross_references.iter().find(|x| x.episode_id == episode.id);
                    CandidateTrace {
                        episode_id: episode.id,
                        episode_type: episode.episode_type(),
                        coords: *coords,
                        cross_reference_rank: rank_of(episode),
                        percentage: xref.map(|x| x.percentage),
                        order: xref.map(|x| x.order),
                    }
                })
                .collect(),
            authoritative_type: None,
            after_type_filter: Vec::new(),
            sorted: Vec::new(),
            deduplicated: Vec::new(),
            ranked: Vec::new(),
            file_index: None,
            file_count: None,
            part_eligible: false,
            coords: None,
            featurettes_fallback: None,
            outcome: VideoOutcome::Mapped,
            mapping: None,
        };

        // Mixed types: the best cross-referenced candidate decides
        let mut filtered = candidates;
        let types: HashSet<EpisodeType> = filtered.iter().map(|(e, _)| e.episode_type()).collect();
        if types.len() > 1 {
            let authoritative = filtered
                .iter()
                .filter_map(|(e, _)| rank_of(e).map(|rank| (rank, e.episode_type())))
                .min_by_key(|(rank, _)| *rank)
                .map(|(_, episode_type)| episode_type);

            match (authoritative, self.config.ambiguous_type_policy) {
                (Some(episode_type), _) => {
                    trace.authoritative_type = Some(episode_type);
                    filtered.retain(|(e, _)| e.episode_type() == episode_type);
                }
                (None, AmbiguousTypePolicy::Retain) => {}
                (None, AmbiguousTypePolicy::Drop) => {
                    trace!(
                        operation = "map_video",
                        video_id = video.id,
                        "Dropping video linked to mixed episode types without cross-reference"
                    );
                    trace.outcome = VideoOutcome::Skipped {
                        cause: SkipCause::AmbiguousTypes,
                    };
                    return trace;
                }
            }
        }
        trace.after_type_filter = episode_ids(&filtered);

        filtered.sort_by_key(|(_, coords)| coords.key());
        trace.sorted = episode_ids(&filtered);

        let mut deduplicated: Vec<(&Episode, PlexCoords)> = Vec::with_capacity(filtered.len());
        for candidate in filtered {
            match deduplicated.iter_mut().find(|(_, c)| c.key() == candidate.1.key()) {
                Some(existing) => {
                    if outranks(rank_of(candidate.0), rank_of(existing.0)) {
                        *existing = candidate;
                    }
                }
                None => deduplicated.push(candidate),
            }
        }
        trace.deduplicated = episode_ids(&deduplicated);

        let mut ranked = deduplicated;
        let best = ranked
            .iter()
            .enumerate()
            .filter_map(|(index, (e, _))| rank_of(e).map(|rank| (rank, index)))
            .min();
        if let Some((_, index)) = best {
            let primary = ranked.remove(index);
            ranked.insert(0, primary);
        }
        trace.ranked = episode_ids(&ranked);

        let Some((primary, _)) = ranked.first().copied() else {
            trace.outcome = VideoOutcome::Skipped {
                cause: SkipCause::NoCandidates,
            };
            return trace;
        };

        let mut sibling_ids: Vec<u64> = Vec::new();
        for id in &primary.video_ids {
            if videos_by_id.contains_key(id) && !sibling_ids.contains(id) {
                sibling_ids.push(*id);
            }
        }
        let mut siblings: Vec<&Video> = sibling_ids.iter().filter_map(|id| videos_by_id.get(id).copied()).collect();
        siblings.sort_by_cached_key(|v| file_sort_key(v));
        let file_count = siblings.len();
        let file_index = siblings.iter().position(|v| v.id == video.id).unwrap_or(0);
        trace.file_index = Some(file_index);
        trace.file_count = Some(file_count);

        let single_type = ranked
            .iter()
            .all(|(e, _)| e.episode_type() == primary.episode_type());
        // The marker is judged over the whole episode group, so an unmarked first file is part 1
        let part_eligible = file_count > 1
            && single_type
            && siblings.iter().any(|v| has_split_marker(&v.file_name()));
        trace.part_eligible = part_eligible;

        let episodes: Vec<&Episode> = ranked.iter().map(|(e, _)| *e).collect();
        let index_for_coords = (part_eligible && file_count > 1).then_some(file_index);
        let coords = self
            .resolver
            .plex_coordinates_for_file(&episodes, index_for_coords, preferred);
        trace.coords = Some(coords);

        let tmdb_episode = if part_eligible && self.resolver.tmdb_numbering() {
            self.resolver
                .ordered_tmdb_episodes(primary, preferred)
                .get(file_index)
                .map(|t| (*t).clone())
        } else {
            None
        };

        trace.mapping = Some(FileMapping {
            video: video.clone(),
            primary_episode: primary.clone(),
            additional_episodes: episodes[1..].iter().map(|e| (*e).clone()).collect(),
            coords,
            file_name: trace.file_name.clone(),
            part_index: part_eligible.then_some(file_index as u32 + 1),
            part_count: part_eligible.then_some(file_count as u32),
            tmdb_episode,
        });
        trace
    }
}
