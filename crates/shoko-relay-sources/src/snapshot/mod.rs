// Offline Shoko library backed by JSON snapshot files
//
// <dir>/series-<id>.json   one Series graph per file
// <dir>/users.json         optional Shoko users (defaults to a single "default" user)
// <dir>/watched.json       watch records, rewritten by `persist_watched`

use crate::traits::{ShokoLibrary, ShokoUserData};
use crate::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shoko_relay_models::{Series, ShokoEpisodeInfo, ShokoUser, WatchRecord};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const USERS_FILE: &str = "users.json";
const WATCHED_FILE: &str = "watched.json";

pub struct SnapshotLibrary {
    dir: Option<PathBuf>,
    series: BTreeMap<u64, Series>,
    users: Vec<ShokoUser>,
    watched: RwLock<HashMap<(u64, u64), WatchRecord>>,
}

fn default_users() -> Vec<ShokoUser> {
    vec![ShokoUser {
        id: 1,
        username: "default".to_string(),
    }]
}

pub fn series_file_name(series_id: u64) -> String {
    format!("series-{}.json", series_id)
}

/// Writes one series snapshot, returning its path
pub fn write_series(dir: &Path, series: &Series) -> Result<PathBuf, SourceError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(series_file_name(series.id));
    std::fs::write(&path, serde_json::to_string_pretty(series)?)?;
    Ok(path)
}

/// Writes the Shoko users that `load_dir` will pick up
pub fn write_users(dir: &Path, users: &[ShokoUser]) -> Result<PathBuf, SourceError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(USERS_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(users)?)?;
    Ok(path)
}

impl SnapshotLibrary {
    pub fn from_series(series: Vec<Series>) -> Self {
        Self {
            dir: None,
            series: series.into_iter().map(|s| (s.id, s)).collect(),
            users: default_users(),
            watched: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_users(mut self, users: Vec<ShokoUser>) -> Self {
        self.users = users;
        self
    }

    pub fn load_dir(dir: &Path) -> Result<Self, SourceError> {
        if !dir.is_dir() {
            return Err(SourceError::NotFound(format!("snapshot directory {:?}", dir)));
        }

        let mut series = BTreeMap::new();
        let mut users = default_users();
        let mut watched = HashMap::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            match path.file_name().and_then(|n| n.to_str()) {
                Some(USERS_FILE) => users = serde_json::from_str(&content)?,
                Some(WATCHED_FILE) => {
                    let records: Vec<WatchRecord> = serde_json::from_str(&content)?;
                    watched = records.into_iter().map(|r| ((r.user_id, r.episode_id), r)).collect();
                }
                _ => match serde_json::from_str::<Series>(&content) {
                    Ok(s) => {
                        series.insert(s.id, s);
                    }
                    Err(e) => warn!("Skipping unreadable snapshot {:?}: {}", path, e),
                },
            }
        }

        info!("Loaded {} series snapshots from {:?}", series.len(), dir);
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            series,
            users,
            watched: RwLock::new(watched),
        })
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub async fn watch_records(&self) -> Vec<WatchRecord> {
        let mut records: Vec<WatchRecord> = self.watched.read().await.values().cloned().collect();
        records.sort_by_key(|r| (r.user_id, r.episode_id));
        records
    }

    /// Writes watch records back to `watched.json`; no-op for in-memory libraries
    pub async fn persist_watched(&self) -> Result<(), SourceError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let records = self.watch_records().await;
        std::fs::write(dir.join(WATCHED_FILE), serde_json::to_string_pretty(&records)?)?;
        debug!("Persisted {} watch records", records.len());
        Ok(())
    }
}

#[async_trait]
impl ShokoLibrary for SnapshotLibrary {
    fn source_name(&self) -> &str {
        "snapshot"
    }

    async fn list_series_ids(&self) -> Result<Vec<u64>, SourceError> {
        Ok(self.series.keys().copied().collect())
    }

    async fn series(&self, series_id: u64) -> Result<Series, SourceError> {
        self.series
            .get(&series_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("series {}", series_id)))
    }

    async fn episode_info(&self, episode_id: u64) -> Result<Option<ShokoEpisodeInfo>, SourceError> {
        for series in self.series.values() {
            if let Some(episode) = series.episode(episode_id) {
                let video_count = episode
                    .video_ids
                    .iter()
                    .filter(|id| series.video(**id).is_some())
                    .count();
                return Ok(Some(ShokoEpisodeInfo {
                    episode_id,
                    series_id: series.id,
                    series_title: series.title.clone(),
                    episode_title: episode.display_title(),
                    episode_number: episode.episode_number,
                    episode_type: episode.episode_type,
                    video_count,
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ShokoUserData for SnapshotLibrary {
    async fn list_users(&self) -> Result<Vec<ShokoUser>, SourceError> {
        Ok(self.users.clone())
    }

    async fn is_watched(&self, user_id: u64, episode_id: u64) -> Result<bool, SourceError> {
        Ok(self.watched.read().await.contains_key(&(user_id, episode_id)))
    }

    async fn set_watched(
        &self,
        user_id: u64,
        episode_id: u64,
        watched_at: Option<DateTime<Utc>>,
    ) -> Result<(), SourceError> {
        let record = WatchRecord {
            user_id,
            episode_id,
            watched_at: watched_at.unwrap_or_else(Utc::now),
        };
        self.watched.write().await.insert((user_id, episode_id), record);
        Ok(())
    }
}
