use crate::map_helper::SeriesTrace;
use crate::watched_sync::WatchedSyncReport;
use anyhow::{anyhow, Result};
use serde::{de::DeserializeOwned, Serialize};
use shoko_relay_config::PathManager;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LAST_WATCHED_SYNC: &str = "watched-sync-latest";

/// Pretty-printed JSON reports under `<data_dir>/reports`
#[derive(Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(path_manager: &PathManager) -> Result<Self> {
        Self::at(path_manager.reports_dir())
    }

    pub fn at(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn report_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    /// Saves the report twice: timestamped and as the latest run
    pub fn save_watched_sync(&self, report: &WatchedSyncReport) -> Result<PathBuf> {
        let name = format!("watched-sync-{}", report.started_at.format("%Y%m%dT%H%M%SZ"));
        self.save(&name, report)?;
        self.save(LAST_WATCHED_SYNC, report)?;
        Ok(self.report_path(&name))
    }

    pub fn load_last_watched_sync(&self) -> Result<Option<WatchedSyncReport>> {
        self.load(LAST_WATCHED_SYNC)
    }

    pub fn save_trace(&self, trace: &SeriesTrace) -> Result<PathBuf> {
        let name = format!("trace-series-{}", trace.series_id);
        self.save(&name, trace)?;
        Ok(self.report_path(&name))
    }

    fn load<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let path = self.report_path(name);

        if !path.exists() {
            debug!("Report {} does not exist", name);
            return Ok(None);
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<T>(&content) {
                Ok(data) => Ok(Some(data)),
                Err(e) => {
                    warn!("Report {} is corrupted: {}. Deleting it.", name, e);
                    if let Err(rm_err) = std::fs::remove_file(&path) {
                        warn!("Failed to delete corrupted report: {}", rm_err);
                    }
                    Ok(None)
                }
            },
            Err(e) => {
                warn!("Failed to read report {}: {}", name, e);
                Ok(None)
            }
        }
    }

    fn save<T>(&self, name: &str, data: &T) -> Result<()>
    where
        T: Serialize,
    {
        let path = self.report_path(name);
        let json = serde_json::to_string_pretty(data).map_err(|e| anyhow!("Failed to serialize report: {}", e))?;
        std::fs::write(&path, json).map_err(|e| anyhow!("Failed to write report {:?}: {}", path, e))?;
        debug!("Report saved: {:?}", path);
        Ok(())
    }

    /// Deletes every stored report, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        info!("Cleared {} reports from {:?}", removed, self.dir);
        Ok(removed)
    }
}
