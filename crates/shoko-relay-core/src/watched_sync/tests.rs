use super::*;
use async_trait::async_trait;
use shoko_relay_models::{EpisodeType, ShokoEpisodeInfo};
use shoko_relay_sources::SourceError;
use std::collections::HashMap;
use std::sync::Mutex;

struct FakeShoko {
    episodes: HashMap<u64, ShokoEpisodeInfo>,
    users: Vec<ShokoUser>,
    watched: Mutex<HashSet<u64>>,
    writes: Mutex<Vec<u64>>,
    failing_writes: HashSet<u64>,
    failing_lookups: HashSet<u64>,
}

impl FakeShoko {
    fn new() -> Self {
        let mut episodes = HashMap::new();
        for (id, videos) in [(1u64, 1usize), (2, 1), (3, 0), (4, 2), (5, 1)] {
            episodes.insert(
                id,
                ShokoEpisodeInfo {
                    episode_id: id,
                    series_id: 10,
                    series_title: "Show".to_string(),
                    episode_title: format!("Episode {}", id),
                    episode_number: id as i32,
                    episode_type: EpisodeType::Normal,
                    video_count: videos,
                },
            );
        }
        Self {
            episodes,
            users: vec![
                ShokoUser {
                    id: 7,
                    username: "main".to_string(),
                },
                ShokoUser {
                    id: 8,
                    username: "other".to_string(),
                },
            ],
            watched: Mutex::new(HashSet::from([2])),
            writes: Mutex::new(Vec::new()),
            failing_writes: HashSet::new(),
            failing_lookups: HashSet::new(),
        }
    }

    fn writes(&self) -> Vec<u64> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShokoLibrary for FakeShoko {
    fn source_name(&self) -> &str {
        "fake"
    }

    async fn list_series_ids(&self) -> Result<Vec<u64>, SourceError> {
        Ok(vec![10])
    }

    async fn series(&self, series_id: u64) -> Result<shoko_relay_models::Series, SourceError> {
        Err(SourceError::NotFound(format!("series {}", series_id)))
    }

    async fn episode_info(&self, episode_id: u64) -> Result<Option<ShokoEpisodeInfo>, SourceError> {
        if self.failing_lookups.contains(&episode_id) {
            return Err(SourceError::Parse("boom".to_string()));
        }
        Ok(self.episodes.get(&episode_id).cloned())
    }
}

#[async_trait]
impl ShokoUserData for FakeShoko {
    async fn list_users(&self) -> Result<Vec<ShokoUser>, SourceError> {
        Ok(self.users.clone())
    }

    async fn is_watched(&self, _user_id: u64, episode_id: u64) -> Result<bool, SourceError> {
        Ok(self.watched.lock().unwrap().contains(&episode_id))
    }

    async fn set_watched(
        &self,
        user_id: u64,
        episode_id: u64,
        _watched_at: Option<DateTime<Utc>>,
    ) -> Result<(), SourceError> {
        assert_eq!(user_id, 7, "writes go to the first Shoko user");
        if self.failing_writes.contains(&episode_id) {
            return Err(SourceError::Api {
                service: "Shoko",
                status: 500,
                message: "nope".to_string(),
            });
        }
        self.writes.lock().unwrap().push(episode_id);
        self.watched.lock().unwrap().insert(episode_id);
        Ok(())
    }
}

struct FakePlex {
    label: &'static str,
    kind: PlexUserKind,
    items: Vec<PlexWatchedItem>,
}

#[async_trait]
impl PlexWatchedSource for FakePlex {
    fn user_label(&self) -> &str {
        self.label
    }

    fn user_kind(&self) -> PlexUserKind {
        self.kind.clone()
    }

    async fn watched_episodes(
        &self,
        _library_section: &str,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlexWatchedItem>, SourceError> {
        Ok(self.items.clone())
    }
}

fn item(key: &str, guid: &str, section: &str) -> PlexWatchedItem {
    PlexWatchedItem {
        rating_key: key.to_string(),
        guid: guid.to_string(),
        title: Some(format!("Plex {}", key)),
        show_title: Some("Show".to_string()),
        library_section_id: Some(section.to_string()),
        file_path: Some(format!("/vfs/{}.mkv", key)),
        view_count: 1,
        last_viewed_at: None,
    }
}

fn shoko_guid(episode: u64) -> String {
    format!("tv.plex.agents.custom.shokorelay://episode/e{}", episode)
}

fn options(dry_run: bool) -> WatchedSyncOptions {
    WatchedSyncOptions {
        library_section: "3".to_string(),
        dry_run,
        since: None,
    }
}

fn admin(items: Vec<PlexWatchedItem>) -> FakePlex {
    FakePlex {
        label: "admin",
        kind: PlexUserKind::Admin,
        items,
    }
}

#[tokio::test]
async fn test_unknown_guid_is_never_marked() {
    for dry_run in [true, false] {
        let shoko = FakeShoko::new();
        let plex = admin(vec![item("100", "plex://episode/5d9c0874", "3")]);
        let sync = WatchedSync::new(&shoko, &shoko, options(dry_run));

        let report = sync.run(&[&plex]).await.unwrap();
        let record = &report.audit[0];
        assert_eq!(record.reason, Some(SkipReason::NoShokoGuid));
        assert!(!record.would_mark);
        assert_eq!(report.totals.marked, 0);
        assert_eq!(report.totals.skipped, 1);
        assert!(shoko.writes().is_empty());
    }
}

#[tokio::test]
async fn test_skip_reasons_in_order() {
    let shoko = FakeShoko::new();
    let plex = admin(vec![
        item("a", &shoko_guid(1), "9"),   // other section
        item("b", &shoko_guid(999), "3"), // unknown episode
        item("c", &shoko_guid(2), "3"),   // already watched
        item("d", &shoko_guid(3), "3"),   // no files
        item("e", &shoko_guid(1), "3"),   // marked
        item("f", &format!("{}p2", shoko_guid(1)), "3"), // second part of the same episode
    ]);
    let sync = WatchedSync::new(&shoko, &shoko, options(false));

    let report = sync.run(&[&plex]).await.unwrap();
    let reasons: Vec<Option<SkipReason>> = report.audit.iter().map(|r| r.reason).collect();
    assert_eq!(
        reasons,
        vec![
            Some(SkipReason::NotInSection),
            Some(SkipReason::NoShokoGuid),
            Some(SkipReason::AlreadyWatched),
            Some(SkipReason::NoFiles),
            None,
            Some(SkipReason::Duplicate),
        ]
    );
    assert!(report.audit[2].already_watched_in_shoko);
    assert_eq!(report.audit[4].series_title.as_deref(), Some("Show"));
    assert_eq!(report.audit[4].episode_number, Some(1));
    assert_eq!(shoko.writes(), vec![1]);
    assert_eq!(
        report.totals,
        SyncCounts {
            processed: 6,
            marked: 1,
            skipped: 5,
            errors: 0
        }
    );
}

#[tokio::test]
async fn test_dry_run_matches_real_run_without_writing() {
    let items = vec![
        item("a", &shoko_guid(1), "3"),
        item("b", &shoko_guid(4), "3"),
        item("c", &shoko_guid(4), "3"),
    ];

    let dry = FakeShoko::new();
    let dry_report = WatchedSync::new(&dry, &dry, options(true))
        .run(&[&admin(items.clone())])
        .await
        .unwrap();

    let real = FakeShoko::new();
    let real_report = WatchedSync::new(&real, &real, options(false))
        .run(&[&admin(items)])
        .await
        .unwrap();

    assert!(dry.writes().is_empty());
    assert_eq!(real.writes(), vec![1, 4]);

    let dry_marks: Vec<_> = dry_report.audit.iter().map(|r| (r.would_mark, r.reason)).collect();
    let real_marks: Vec<_> = real_report.audit.iter().map(|r| (r.would_mark, r.reason)).collect();
    assert_eq!(dry_marks, real_marks);
    assert_eq!(dry_report.totals.marked, 2);
    assert_eq!(dry_report.skipped_with(SkipReason::Duplicate), 1);
    assert_eq!(dry_report.would_mark().count(), 2);
}

#[tokio::test]
async fn test_admin_first_and_duplicates_across_users() {
    let shoko = FakeShoko::new();
    let extra = FakePlex {
        label: "Kid",
        kind: PlexUserKind::Extra,
        items: vec![item("k1", &shoko_guid(5), "3"), item("k2", &shoko_guid(1), "3")],
    };
    let admin = admin(vec![item("a1", &shoko_guid(5), "3")]);
    let sync = WatchedSync::new(&shoko, &shoko, options(false));

    let report = sync.run(&[&extra, &admin]).await.unwrap();
    let users: Vec<_> = report.users.iter().map(|u| u.plex_user.as_str()).collect();
    assert_eq!(users, vec!["admin", "Kid"]);

    assert_eq!(report.audit[0].plex_user, "admin");
    assert_eq!(report.audit[1].reason, Some(SkipReason::Duplicate));
    assert_eq!(report.audit[2].reason, None);
    assert_eq!(shoko.writes(), vec![5, 1]);

    assert_eq!(report.users[0].counts.marked, 1);
    assert_eq!(report.users[1].counts.marked, 1);
    assert_eq!(report.users[1].counts.skipped, 1);
    assert_eq!(report.totals.processed, 3);
}

#[tokio::test]
async fn test_apply_failure_and_lookup_errors() {
    let mut shoko = FakeShoko::new();
    shoko.failing_writes.insert(4);
    shoko.failing_lookups.insert(5);
    let plex = admin(vec![
        item("a", &shoko_guid(4), "3"),
        item("b", &shoko_guid(5), "3"),
        item("c", &shoko_guid(1), "3"),
    ]);
    let sync = WatchedSync::new(&shoko, &shoko, options(false));

    let report = sync.run(&[&plex]).await.unwrap();
    // Lookup errors produce no audit record
    assert_eq!(report.audit.len(), 2);
    assert_eq!(report.audit[0].reason, Some(SkipReason::ApplyFailed));
    assert!(report.audit[0].would_mark);
    assert_eq!(report.audit[1].reason, None);
    assert_eq!(report.totals.errors, 1);
    assert_eq!(report.totals.skipped, 1);
    assert_eq!(report.totals.marked, 1);
    assert_eq!(report.errors.len(), 2);
}

#[tokio::test]
async fn test_no_shoko_user_fails_run() {
    let mut shoko = FakeShoko::new();
    shoko.users.clear();
    let plex = admin(vec![item("a", &shoko_guid(1), "3")]);
    let result = WatchedSync::new(&shoko, &shoko, options(false)).run(&[&plex]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cancellation() {
    let shoko = FakeShoko::new();
    let plex = admin(vec![item("a", &shoko_guid(1), "3")]);

    let token = CancellationToken::new();
    token.cancel();
    let result = WatchedSync::new(&shoko, &shoko, options(false))
        .with_cancellation(token)
        .run(&[&plex])
        .await;
    assert!(result.is_err());
    assert!(shoko.writes().is_empty());
}

/// Writes through to `FakeShoko`, except for one episode whose write cancels the run
/// and then never returns
struct StallingWrites<'a> {
    inner: &'a FakeShoko,
    stall_on: u64,
    cancel: CancellationToken,
}

#[async_trait]
impl ShokoUserData for StallingWrites<'_> {
    async fn list_users(&self) -> Result<Vec<ShokoUser>, SourceError> {
        self.inner.list_users().await
    }

    async fn is_watched(&self, user_id: u64, episode_id: u64) -> Result<bool, SourceError> {
        self.inner.is_watched(user_id, episode_id).await
    }

    async fn set_watched(
        &self,
        user_id: u64,
        episode_id: u64,
        watched_at: Option<DateTime<Utc>>,
    ) -> Result<(), SourceError> {
        if episode_id == self.stall_on {
            self.cancel.cancel();
            std::future::pending::<()>().await;
        }
        self.inner.set_watched(user_id, episode_id, watched_at).await
    }
}

#[tokio::test]
async fn test_cancellation_interrupts_stalled_write() {
    let shoko = FakeShoko::new();
    let token = CancellationToken::new();
    let user_data = StallingWrites {
        inner: &shoko,
        stall_on: 4,
        cancel: token.clone(),
    };
    let plex = admin(vec![
        item("a", &shoko_guid(1), "3"),
        item("b", &shoko_guid(4), "3"),
        item("c", &shoko_guid(5), "3"),
    ]);
    let extra = FakePlex {
        label: "guest",
        kind: PlexUserKind::Extra,
        items: vec![item("d", &shoko_guid(5), "3")],
    };

    let report = WatchedSync::new(&shoko, &user_data, options(false))
        .with_cancellation(token)
        .run(&[&plex, &extra])
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(shoko.writes(), vec![1]);
    assert_eq!(report.audit.len(), 1);
    assert_eq!(report.totals.processed, 1);
    assert_eq!(report.totals.marked, 1);
    assert_eq!(report.users.len(), 1);
    assert_eq!(report.users[0].plex_user, "admin");
}

/// Cancels the run while handing back its items
struct CancellingPlex {
    items: Vec<PlexWatchedItem>,
    cancel: CancellationToken,
}

#[async_trait]
impl PlexWatchedSource for CancellingPlex {
    fn user_label(&self) -> &str {
        "admin"
    }

    fn user_kind(&self) -> PlexUserKind {
        PlexUserKind::Admin
    }

    async fn watched_episodes(
        &self,
        _library_section: &str,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlexWatchedItem>, SourceError> {
        self.cancel.cancel();
        Ok(self.items.clone())
    }
}

#[tokio::test]
async fn test_cancellation_after_fetch_processes_nothing() {
    let shoko = FakeShoko::new();
    let token = CancellationToken::new();
    let plex = CancellingPlex {
        items: vec![item("a", &shoko_guid(1), "3")],
        cancel: token.clone(),
    };

    let report = WatchedSync::new(&shoko, &shoko, options(false))
        .with_cancellation(token)
        .run(&[&plex])
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.audit.is_empty());
    assert_eq!(report.totals.processed, 0);
    assert!(shoko.writes().is_empty());
}

#[test]
fn test_options_from_config() {
    let mut config = Config::default();
    assert!(WatchedSyncOptions::from_config(&config).is_err());

    config.plex = Some(shoko_relay_config::PlexConfig {
        enabled: true,
        server_url: "http://localhost:32400".to_string(),
        library_section: "3".to_string(),
        extra_users: Vec::new(),
    });
    config.watched_sync.dry_run = true;
    config.watched_sync.lookback_hours = Some(24);

    let options = WatchedSyncOptions::from_config(&config).unwrap();
    assert_eq!(options.library_section, "3");
    assert!(options.dry_run);
    let since = options.since.unwrap();
    assert!(since < Utc::now() - Duration::hours(23));
}
