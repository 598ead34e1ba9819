use crate::episode::Episode;
use crate::video::Video;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A Shoko series together with its full episode/video graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Series {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub tmdb_show_id: Option<u64>,
    /// Ordering the user picked for this series in Shoko, if any
    #[serde(default)]
    pub preferred_tmdb_ordering_id: Option<String>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub videos: Vec<Video>,
}

impl Series {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            tmdb_show_id: None,
            preferred_tmdb_ordering_id: None,
            episodes: Vec::new(),
            videos: Vec::new(),
        }
    }

    pub fn episode(&self, id: u64) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.id == id)
    }

    pub fn video(&self, id: u64) -> Option<&Video> {
        self.videos.iter().find(|v| v.id == id)
    }

    pub fn videos_by_id(&self) -> HashMap<u64, &Video> {
        self.videos.iter().map(|v| (v.id, v)).collect()
    }

    /// Preferred ordering id with the "default ordering equals the show id" case removed.
    ///
    /// Shoko reports the default TMDB ordering using the show id, which would otherwise
    /// look like a user preference.
    pub fn effective_ordering_id(&self) -> Option<String> {
        let ordering = self.preferred_tmdb_ordering_id.as_deref()?.trim();
        if ordering.is_empty() {
            return None;
        }
        if let Some(show_id) = self.tmdb_show_id {
            if ordering == show_id.to_string() {
                return None;
            }
        }
        Some(ordering.to_string())
    }
}
