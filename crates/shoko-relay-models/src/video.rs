use serde::{Deserialize, Serialize};
use std::path::Path;

/// Declared link between a video file and an episode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrossReference {
    pub episode_id: u64,
    /// Share of the episode's content this file covers (0-100)
    #[serde(default = "default_percentage")]
    pub percentage: u8,
    /// Lower is more authoritative
    #[serde(default)]
    pub order: i32,
}

fn default_percentage() -> u8 {
    100
}

impl CrossReference {
    pub fn new(episode_id: u64, order: i32) -> Self {
        Self {
            episode_id,
            percentage: 100,
            order,
        }
    }
}

/// A video file known to Shoko
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Video {
    pub id: u64,
    /// Every location of this file, first one is preferred
    pub locations: Vec<String>,
    #[serde(default)]
    pub cross_references: Vec<CrossReference>,
}

impl Video {
    pub fn new(id: u64, location: impl Into<String>) -> Self {
        Self {
            id,
            locations: vec![location.into()],
            cross_references: Vec::new(),
        }
    }

    pub fn with_cross_references(mut self, cross_references: Vec<CrossReference>) -> Self {
        self.cross_references = cross_references;
        self
    }

    pub fn primary_location(&self) -> Option<&str> {
        self.locations.first().map(|s| s.as_str())
    }

    /// Base file name of the preferred location (handles both `/` and `\` separators)
    pub fn file_name(&self) -> String {
        let Some(location) = self.primary_location() else {
            return String::new();
        };
        let normalized = location.replace('\\', "/");
        Path::new(&normalized)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&normalized)
            .to_string()
    }

    /// File extension of the preferred location, without the dot
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_string())
    }
}
