// Plex -> Shoko watched state sync

use crate::rating_keys::episode_id_from_guid;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shoko_relay_config::Config;
use shoko_relay_models::{PlexUserKind, PlexWatchedItem, ShokoUser, SkipReason, WatchedAuditRecord};
use shoko_relay_sources::{PlexWatchedSource, ShokoLibrary, ShokoUserData};
use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct WatchedSyncOptions {
    pub library_section: String,
    pub dry_run: bool,
    /// Ignore Plex items last viewed before this instant
    pub since: Option<DateTime<Utc>>,
}

impl WatchedSyncOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        let plex = config
            .plex
            .as_ref()
            .ok_or_else(|| anyhow!("Plex is not configured"))?;
        Ok(Self {
            library_section: plex.library_section.clone(),
            dry_run: config.watched_sync.dry_run,
            since: config
                .watched_sync
                .lookback_hours
                .map(|hours| Utc::now() - Duration::hours(i64::from(hours))),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCounts {
    pub processed: usize,
    pub marked: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl SyncCounts {
    fn add(&mut self, other: &SyncCounts) {
        self.processed += other.processed;
        self.marked += other.marked;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBucket {
    pub plex_user: String,
    pub kind: PlexUserKind,
    #[serde(flatten)]
    pub counts: SyncCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedSyncReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub dry_run: bool,
    pub shoko_user: ShokoUser,
    pub users: Vec<UserBucket>,
    pub totals: SyncCounts,
    pub audit: Vec<WatchedAuditRecord>,
    pub errors: Vec<String>,
    pub cancelled: bool,
}

impl WatchedSyncReport {
    pub fn skipped_with(&self, reason: SkipReason) -> usize {
        self.audit.iter().filter(|r| r.reason == Some(reason)).count()
    }

    pub fn would_mark(&self) -> impl Iterator<Item = &WatchedAuditRecord> {
        self.audit.iter().filter(|r| r.would_mark && r.reason.is_none())
    }
}

/// Outcome of one Plex item
enum ItemOutcome {
    Audited(WatchedAuditRecord),
    Failed(String),
    /// Interrupted while waiting on Shoko; nothing was recorded for the item
    Cancelled,
}

pub struct WatchedSync<'a> {
    library: &'a dyn ShokoLibrary,
    user_data: &'a dyn ShokoUserData,
    options: WatchedSyncOptions,
    cancel: CancellationToken,
}

impl<'a> WatchedSync<'a> {
    pub fn new(library: &'a dyn ShokoLibrary, user_data: &'a dyn ShokoUserData, options: WatchedSyncOptions) -> Self {
        Self {
            library,
            user_data,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// `None` when the token fires before `fut` completes
    async fn unless_cancelled<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Runs the sync for every Plex account: admin first, then extra users in the
    /// order given.
    #[instrument(skip(self, sources), fields(dry_run = self.options.dry_run))]
    pub async fn run(&self, sources: &[&dyn PlexWatchedSource]) -> Result<WatchedSyncReport> {
        if self.cancel.is_cancelled() {
            return Err(anyhow!("Watched sync cancelled before start"));
        }

        let started_at = Utc::now();
        let timer = Instant::now();

        let shoko_user = self
            .unless_cancelled(self.user_data.list_users())
            .await
            .ok_or_else(|| anyhow!("Watched sync cancelled before start"))??
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Shoko user available to receive watched state"))?;

        let mut ordered: Vec<&dyn PlexWatchedSource> = sources.to_vec();
        ordered.sort_by_key(|s| s.user_kind() != PlexUserKind::Admin);

        info!(
            operation = "watched_sync",
            shoko_user = %shoko_user.username,
            plex_users = ordered.len(),
            section = %self.options.library_section,
            "Starting watched sync"
        );

        let mut applied: HashSet<u64> = HashSet::new();
        let mut users = Vec::with_capacity(ordered.len());
        let mut audit = Vec::new();
        let mut errors = Vec::new();
        let mut cancelled = false;

        'users: for source in ordered {
            let mut counts = SyncCounts::default();
            let label = source.user_label().to_string();

            let fetched = self
                .unless_cancelled(source.watched_episodes(&self.options.library_section, self.options.since))
                .await;

            let items = match fetched {
                None => {
                    cancelled = true;
                    users.push(UserBucket {
                        plex_user: label,
                        kind: source.user_kind(),
                        counts,
                    });
                    break;
                }
                Some(Ok(items)) => items,
                Some(Err(e)) => {
                    warn!("Failed to fetch watched items for Plex user {}: {}", label, e);
                    errors.push(format!("{}: failed to fetch watched items: {}", label, e));
                    counts.errors += 1;
                    users.push(UserBucket {
                        plex_user: label,
                        kind: source.user_kind(),
                        counts,
                    });
                    continue;
                }
            };
            debug!("Plex user {} reported {} watched items", label, items.len());

            for item in &items {
                let outcome = if self.cancel.is_cancelled() {
                    ItemOutcome::Cancelled
                } else {
                    self.process_item(&label, item, &shoko_user, &mut applied).await
                };
                if matches!(outcome, ItemOutcome::Cancelled) {
                    cancelled = true;
                    users.push(UserBucket {
                        plex_user: label,
                        kind: source.user_kind(),
                        counts,
                    });
                    break 'users;
                }

                counts.processed += 1;
                match outcome {
                    ItemOutcome::Cancelled => {}
                    ItemOutcome::Audited(record) => {
                        if record.reason.is_none() {
                            counts.marked += 1;
                        } else {
                            counts.skipped += 1;
                            if record.reason == Some(SkipReason::ApplyFailed) {
                                errors.push(format!(
                                    "{}: failed to mark episode {:?} watched",
                                    label, record.shoko_episode_id
                                ));
                            }
                        }
                        audit.push(record);
                    }
                    ItemOutcome::Failed(message) => {
                        warn!("Watched sync error for {} item {}: {}", label, item.rating_key, message);
                        counts.errors += 1;
                        errors.push(format!("{}: {}: {}", label, item.rating_key, message));
                    }
                }
            }

            info!(
                operation = "watched_sync_user",
                plex_user = %label,
                processed = counts.processed,
                marked = counts.marked,
                skipped = counts.skipped,
                errors = counts.errors,
                "Finished Plex user"
            );
            users.push(UserBucket {
                plex_user: label,
                kind: source.user_kind(),
                counts,
            });
        }

        let mut totals = SyncCounts::default();
        for bucket in &users {
            totals.add(&bucket.counts);
        }

        info!(
            operation = "watched_sync",
            processed = totals.processed,
            marked = totals.marked,
            skipped = totals.skipped,
            errors = totals.errors,
            cancelled,
            "Watched sync finished"
        );

        Ok(WatchedSyncReport {
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
            dry_run: self.options.dry_run,
            shoko_user,
            users,
            totals,
            audit,
            errors,
            cancelled,
        })
    }

    async fn process_item(
        &self,
        plex_user: &str,
        item: &PlexWatchedItem,
        shoko_user: &ShokoUser,
        applied: &mut HashSet<u64>,
    ) -> ItemOutcome {
        let mut record = WatchedAuditRecord {
            plex_user: plex_user.to_string(),
            shoko_episode_id: None,
            series_title: item.show_title.clone(),
            episode_title: item.title.clone(),
            episode_number: None,
            rating_key: item.rating_key.clone(),
            guid: item.guid.clone(),
            file_path: item.file_path.clone(),
            last_viewed_at: item.last_viewed_at,
            would_mark: false,
            already_watched_in_shoko: false,
            reason: None,
        };

        if let Some(section) = &item.library_section_id {
            if section != &self.options.library_section {
                record.reason = Some(SkipReason::NotInSection);
                return ItemOutcome::Audited(record);
            }
        }

        let Some(episode_id) = episode_id_from_guid(&item.guid) else {
            record.reason = Some(SkipReason::NoShokoGuid);
            return ItemOutcome::Audited(record);
        };

        let Some(lookup) = self.unless_cancelled(self.library.episode_info(episode_id)).await else {
            return ItemOutcome::Cancelled;
        };
        let info = match lookup {
            Ok(Some(info)) => info,
            Ok(None) => {
                record.reason = Some(SkipReason::NoShokoGuid);
                return ItemOutcome::Audited(record);
            }
            Err(e) => return ItemOutcome::Failed(format!("episode lookup failed: {}", e)),
        };
        record.shoko_episode_id = Some(episode_id);
        record.series_title = Some(info.series_title.clone());
        record.episode_title = Some(info.episode_title.clone());
        record.episode_number = Some(info.episode_number);

        if applied.contains(&episode_id) {
            record.reason = Some(SkipReason::Duplicate);
            return ItemOutcome::Audited(record);
        }

        let Some(watched) = self.unless_cancelled(self.user_data.is_watched(shoko_user.id, episode_id)).await else {
            return ItemOutcome::Cancelled;
        };
        match watched {
            Ok(true) => {
                record.already_watched_in_shoko = true;
                record.reason = Some(SkipReason::AlreadyWatched);
                return ItemOutcome::Audited(record);
            }
            Ok(false) => {}
            Err(e) => return ItemOutcome::Failed(format!("watched state lookup failed: {}", e)),
        }

        if info.video_count == 0 {
            record.reason = Some(SkipReason::NoFiles);
            return ItemOutcome::Audited(record);
        }

        record.would_mark = true;
        if self.options.dry_run {
            applied.insert(episode_id);
            return ItemOutcome::Audited(record);
        }

        let Some(written) = self
            .unless_cancelled(self.user_data.set_watched(shoko_user.id, episode_id, item.last_viewed_at))
            .await
        else {
            return ItemOutcome::Cancelled;
        };
        match written {
            Ok(()) => {
                applied.insert(episode_id);
            }
            Err(e) => {
                warn!("Failed to mark Shoko episode {} watched: {}", episode_id, e);
                record.reason = Some(SkipReason::ApplyFailed);
            }
        }
        ItemOutcome::Audited(record)
    }
}

#[cfg(test)]
mod tests;
