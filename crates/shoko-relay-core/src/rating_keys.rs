// Plex rating keys for relayed items
//
//   episode: e{episodeId}[p{part}]
//   season:  {seriesId}s{season}
//   series:  {seriesId}

use regex::Regex;
use shoko_relay_models::FileMapping;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static EPISODE_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^e(\d+)(?:p(\d+))?$").unwrap());
static SEASON_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)s(-?\d+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatingKey {
    Series(u64),
    Season { series_id: u64, season: i32 },
    Episode { episode_id: u64, part: Option<u32> },
}

impl RatingKey {
    pub fn for_mapping(mapping: &FileMapping) -> Self {
        RatingKey::Episode {
            episode_id: mapping.primary_episode().id,
            part: mapping.part_index,
        }
    }

    pub fn episode_id(&self) -> Option<u64> {
        match self {
            RatingKey::Episode { episode_id, .. } => Some(*episode_id),
            _ => None,
        }
    }
}

impl fmt::Display for RatingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatingKey::Series(id) => write!(f, "{}", id),
            RatingKey::Season { series_id, season } => write!(f, "{}s{}", series_id, season),
            RatingKey::Episode { episode_id, part: None } => write!(f, "e{}", episode_id),
            RatingKey::Episode {
                episode_id,
                part: Some(part),
            } => write!(f, "e{}p{}", episode_id, part),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid rating key: {0}")]
pub struct InvalidRatingKey(pub String);

impl FromStr for RatingKey {
    type Err = InvalidRatingKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(caps) = EPISODE_KEY.captures(s) {
            let episode_id = caps[1].parse().map_err(|_| InvalidRatingKey(s.to_string()))?;
            let part = match caps.get(2) {
                Some(m) => Some(m.as_str().parse().map_err(|_| InvalidRatingKey(s.to_string()))?),
                None => None,
            };
            return Ok(RatingKey::Episode { episode_id, part });
        }
        if let Some(caps) = SEASON_KEY.captures(s) {
            let series_id = caps[1].parse().map_err(|_| InvalidRatingKey(s.to_string()))?;
            let season = caps[2].parse().map_err(|_| InvalidRatingKey(s.to_string()))?;
            return Ok(RatingKey::Season { series_id, season });
        }
        s.parse::<u64>()
            .map(RatingKey::Series)
            .map_err(|_| InvalidRatingKey(s.to_string()))
    }
}

pub fn episode_rating_key(mapping: &FileMapping) -> String {
    RatingKey::for_mapping(mapping).to_string()
}

pub fn season_rating_key(series_id: u64, season: i32) -> String {
    RatingKey::Season { series_id, season }.to_string()
}

pub fn series_rating_key(series_id: u64) -> String {
    RatingKey::Series(series_id).to_string()
}

/// Shoko episode id behind a Plex GUID such as
/// `tv.plex.agents.custom.shokorelay://episode/e1234p2`.
///
/// GUIDs of other agents are rejected. Only the last path segment is considered; it
/// must be an episode rating key or a bare number.
pub fn episode_id_from_guid(guid: &str) -> Option<u64> {
    let guid = guid.trim();
    if let Some((scheme, _)) = guid.split_once("://") {
        if !scheme.to_ascii_lowercase().contains("shoko") {
            return None;
        }
    }

    let segment = guid
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()?
        .split(['?', '#'])
        .next()?;

    if segment.is_empty() {
        return None;
    }
    if let Ok(id) = segment.parse::<u64>() {
        return Some(id);
    }
    match segment.parse::<RatingKey>() {
        Ok(RatingKey::Episode { episode_id, .. }) => Some(episode_id),
        _ => None,
    }
}
