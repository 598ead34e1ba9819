// Plex metadata documents for the custom agent

use crate::rating_keys::{episode_rating_key, season_rating_key, series_rating_key};
use crate::series_file_data::SeriesFileData;
use serde::Serialize;
use shoko_relay_models::{FileMapping, PlexSeason, Series};

pub const AGENT_IDENTIFIER: &str = "tv.plex.agents.custom.shokorelay";

pub fn series_guid(series_id: u64) -> String {
    format!("{}://show/{}", AGENT_IDENTIFIER, series_rating_key(series_id))
}

pub fn season_guid(series_id: u64, season: i32) -> String {
    format!("{}://season/{}", AGENT_IDENTIFIER, season_rating_key(series_id, season))
}

pub fn episode_guid(mapping: &FileMapping) -> String {
    format!("{}://episode/{}", AGENT_IDENTIFIER, episode_rating_key(mapping))
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaContainer {
    pub size: usize,
    pub identifier: String,
    #[serde(rename = "Metadata")]
    pub metadata: Vec<Metadata>,
}

impl MediaContainer {
    fn new(metadata: Vec<Metadata>) -> Self {
        Self {
            size: metadata.len(),
            identifier: AGENT_IDENTIFIER.to_string(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub rating_key: String,
    pub guid: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_rating_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grandparent_rating_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grandparent_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf_count: Option<usize>,
    #[serde(rename = "Media", skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<Media>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Media {
    pub id: u64,
    #[serde(rename = "Part")]
    pub parts: Vec<MediaPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaPart {
    pub file: String,
}

fn episode_title(mapping: &FileMapping) -> String {
    let mut title = if mapping.tmdb_episode.is_some() || mapping.episode_count() == 1 {
        mapping.display_title()
    } else {
        mapping
            .episodes()
            .map(|e| e.display_title())
            .collect::<Vec<_>>()
            .join(" / ")
    };
    if mapping.tmdb_episode.is_none() {
        if let (Some(part), Some(count)) = (mapping.part_index, mapping.part_count) {
            title = format!("{} (Part {} of {})", title, part, count);
        }
    }
    title
}

fn media_for(mapping: &FileMapping) -> Media {
    Media {
        id: mapping.video.id,
        parts: mapping
            .video
            .primary_location()
            .map(|file| vec![MediaPart { file: file.to_string() }])
            .unwrap_or_default(),
    }
}

/// Series document
pub fn series_metadata(series: &Series, data: &SeriesFileData) -> MediaContainer {
    MediaContainer::new(vec![Metadata {
        rating_key: series_rating_key(series.id),
        guid: series_guid(series.id),
        kind: "show",
        title: series.title.clone(),
        index: 1,
        parent_index: None,
        parent_rating_key: None,
        parent_title: None,
        grandparent_rating_key: None,
        grandparent_title: None,
        summary: None,
        child_count: Some(data.seasons.len()),
        leaf_count: Some(data.len()),
        media: Vec::new(),
    }])
}

/// Season list of a series, in ascending season order
pub fn seasons_metadata(series: &Series, data: &SeriesFileData) -> MediaContainer {
    let seasons = data
        .seasons
        .iter()
        .map(|season| Metadata {
            rating_key: season_rating_key(series.id, *season),
            guid: season_guid(series.id, *season),
            kind: "season",
            title: PlexSeason::title(*season),
            index: *season,
            parent_index: None,
            parent_rating_key: Some(series_rating_key(series.id)),
            parent_title: Some(series.title.clone()),
            grandparent_rating_key: None,
            grandparent_title: None,
            summary: None,
            child_count: None,
            leaf_count: Some(data.for_season(*season).len()),
            media: Vec::new(),
        })
        .collect();
    MediaContainer::new(seasons)
}

/// Episodes of one season. Files sharing a rating key are versions of one item.
pub fn season_episodes_metadata(series: &Series, data: &SeriesFileData, season: i32) -> MediaContainer {
    let mut items: Vec<Metadata> = Vec::new();

    for mapping in data.for_season(season) {
        let rating_key = episode_rating_key(mapping);
        if let Some(existing) = items.iter_mut().find(|m| m.rating_key == rating_key) {
            existing.media.push(media_for(mapping));
            continue;
        }

        items.push(Metadata {
            rating_key,
            guid: episode_guid(mapping),
            kind: "episode",
            title: episode_title(mapping),
            index: mapping.coords.episode,
            parent_index: Some(season),
            parent_rating_key: Some(season_rating_key(series.id, season)),
            parent_title: Some(PlexSeason::title(season)),
            grandparent_rating_key: Some(series_rating_key(series.id)),
            grandparent_title: Some(series.title.clone()),
            summary: mapping.display_summary(),
            child_count: None,
            leaf_count: None,
            media: vec![media_for(mapping)],
        });
    }

    MediaContainer::new(items)
}
