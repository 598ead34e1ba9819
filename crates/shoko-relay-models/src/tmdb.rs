use serde::{Deserialize, Serialize};

/// One alternate numbering of a TMDB episode (a TMDB "episode group" ordering)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TmdbOrdering {
    pub ordering_id: String,
    #[serde(default)]
    pub season_number: Option<i32>,
    pub episode_number: i32,
}

/// TMDB episode linked to a Shoko episode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TmdbEpisode {
    pub id: u64,
    pub show_id: u64,
    #[serde(default)]
    pub season_number: Option<i32>,
    pub episode_number: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    /// Ordering this entry natively belongs to. `None` means the show's default
    /// ordering, whose id is the show id.
    #[serde(default)]
    pub ordering_id: Option<String>,
    /// Alternate orderings this episode also appears in
    #[serde(default)]
    pub orderings: Vec<TmdbOrdering>,
}

impl TmdbEpisode {
    /// Ordering id of the entry itself (falls back to the default ordering id)
    pub fn own_ordering_id(&self) -> String {
        self.ordering_id
            .clone()
            .unwrap_or_else(|| self.show_id.to_string())
    }

    pub fn find_ordering(&self, ordering_id: &str) -> Option<&TmdbOrdering> {
        self.orderings.iter().find(|o| o.ordering_id == ordering_id)
    }
}
