use super::context::{AppContext, Library};
use crate::output::{new_table, Output};
use chrono::{Duration, Utc};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use owo_colors::OwoColorize;
use shoko_relay_core::{ReportStore, WatchedSync, WatchedSyncOptions, WatchedSyncReport};
use shoko_relay_models::SkipReason;
use shoko_relay_sources::PlexWatchedSource;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SKIP_REASONS: [SkipReason; 6] = [
    SkipReason::NotInSection,
    SkipReason::NoShokoGuid,
    SkipReason::Duplicate,
    SkipReason::AlreadyWatched,
    SkipReason::NoFiles,
    SkipReason::ApplyFailed,
];

/// Command line adjustments on top of `[watched_sync]`
#[derive(Debug, Clone, Default)]
pub struct SyncOverrides {
    pub dry_run: bool,
    pub admin_only: bool,
    pub lookback_hours: Option<u32>,
}

fn sync_options(ctx: &AppContext, overrides: &SyncOverrides) -> Result<WatchedSyncOptions> {
    let mut options = WatchedSyncOptions::from_config(&ctx.config)
        .map_err(|e| eyre!("{}. Run 'shoko-relay config plex' first", e))?;
    options.dry_run |= overrides.dry_run;
    if let Some(hours) = overrides.lookback_hours {
        options.since = Some(Utc::now() - Duration::hours(i64::from(hours)));
    }
    Ok(options)
}

/// Runs one watched sync and saves its report. Shared by the command and the daemon.
pub async fn execute(
    ctx: &AppContext,
    library: &Library,
    overrides: &SyncOverrides,
    cancel: CancellationToken,
) -> Result<(WatchedSyncReport, PathBuf)> {
    let options = sync_options(ctx, overrides)?;
    let dry_run = options.dry_run;
    let include_extra_users = ctx.config.watched_sync.include_extra_users && !overrides.admin_only;

    let sources = ctx.factory().plex_sources(include_extra_users)?;
    let sources: Vec<&dyn PlexWatchedSource> = sources.iter().map(|s| s as &dyn PlexWatchedSource).collect();

    let report = WatchedSync::new(library.catalog(), library.user_data(), options)
        .with_cancellation(cancel)
        .run(&sources)
        .await
        .map_err(|e| eyre!("Watched sync failed: {}", e))?;

    if !dry_run {
        library.persist().await?;
    }

    let store = ReportStore::new(&ctx.paths).map_err(|e| eyre!("Failed to open report store: {}", e))?;
    let path = store
        .save_watched_sync(&report)
        .map_err(|e| eyre!("Failed to save watched sync report: {}", e))?;
    info!("Watched sync report saved to {}", path.display());

    Ok((report, path))
}

pub async fn run_sync_watched(
    dry_run: bool,
    admin_only: bool,
    lookback_hours: Option<u32>,
    snapshot: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    let ctx = AppContext::load()?;
    if !ctx.config.watched_sync.enabled {
        output.warn("watched_sync.enabled is false; running because it was requested explicitly");
    }
    let library = Library::open(&ctx, snapshot)?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current item");
            on_ctrl_c.cancel();
        }
    });

    let overrides = SyncOverrides {
        dry_run,
        admin_only,
        lookback_hours,
    };
    let (report, path) = execute(&ctx, &library, &overrides, cancel).await?;

    print_report(&report, output)?;
    output.success(format!("Report saved to {}", path.display()));
    Ok(())
}

pub fn show_last_report(output: &Output) -> Result<()> {
    let ctx = AppContext::load()?;
    let store = ReportStore::new(&ctx.paths).map_err(|e| eyre!("Failed to open report store: {}", e))?;
    match store
        .load_last_watched_sync()
        .map_err(|e| eyre!("Failed to read the last report: {}", e))?
    {
        Some(report) => print_report(&report, output),
        None => {
            output.warn("No watched sync has been run yet");
            Ok(())
        }
    }
}

pub fn print_report(report: &WatchedSyncReport, output: &Output) -> Result<()> {
    if !output.is_human() {
        output.json(&serde_json::to_value(report)?);
        return Ok(());
    }

    let mode = if report.dry_run {
        "dry run".yellow().to_string()
    } else {
        "applied".green().to_string()
    };
    output.section(&format!(
        "Watched sync {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.println(format!(
        "Mode: {}  Shoko user: {}  Duration: {} ms",
        mode, report.shoko_user.username, report.duration_ms
    ));

    let marked_header = if report.dry_run { "Would mark" } else { "Marked" };
    let mut users = new_table(["Plex user", "Processed", marked_header, "Skipped", "Errors"]);
    for bucket in &report.users {
        users.add_row(vec![
            bucket.plex_user.clone(),
            bucket.counts.processed.to_string(),
            bucket.counts.marked.to_string(),
            bucket.counts.skipped.to_string(),
            bucket.counts.errors.to_string(),
        ]);
    }
    users.add_row(vec![
        "total".to_string(),
        report.totals.processed.to_string(),
        report.totals.marked.to_string(),
        report.totals.skipped.to_string(),
        report.totals.errors.to_string(),
    ]);
    output.table(&users);

    let mut reasons = new_table(["Skip reason", "Items"]);
    let mut any_skipped = false;
    for reason in SKIP_REASONS {
        let count = report.skipped_with(reason);
        if count > 0 {
            any_skipped = true;
            reasons.add_row(vec![reason.to_string(), count.to_string()]);
        }
    }
    if any_skipped {
        output.table(&reasons);
    }

    if report.dry_run {
        let mut pending = new_table(["Plex user", "Series", "Episode", "Title"]);
        let mut any_pending = false;
        for record in report.would_mark() {
            any_pending = true;
            pending.add_row(vec![
                record.plex_user.clone(),
                record.series_title.clone().unwrap_or_default(),
                record.episode_number.map(|n| n.to_string()).unwrap_or_default(),
                record.episode_title.clone().unwrap_or_default(),
            ]);
        }
        if any_pending {
            output.section("Episodes that would be marked watched");
            output.table(&pending);
        }
    }

    for error in &report.errors {
        output.error(error);
    }
    if report.cancelled {
        output.warn("The run was cancelled before every item was processed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoko_relay_config::{Config, CredentialStore, PathManager, PlexConfig};

    fn context(config: Config) -> AppContext {
        AppContext {
            paths: PathManager::from_base(PathBuf::from("/tmp/shoko-relay-test")),
            config,
            credentials: CredentialStore::new(PathBuf::from("/tmp/shoko-relay-test/credentials.toml")),
        }
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let mut config = Config::default();
        config.plex = Some(PlexConfig {
            enabled: true,
            server_url: "http://localhost:32400".to_string(),
            library_section: "2".to_string(),
            extra_users: Vec::new(),
        });
        let ctx = context(config);

        let options = sync_options(&ctx, &SyncOverrides::default()).unwrap();
        assert!(!options.dry_run);
        assert!(options.since.is_none());

        let overrides = SyncOverrides {
            dry_run: true,
            admin_only: true,
            lookback_hours: Some(2),
        };
        let options = sync_options(&ctx, &overrides).unwrap();
        assert!(options.dry_run);
        assert_eq!(options.library_section, "2");
        assert!(options.since.unwrap() > Utc::now() - Duration::hours(3));
    }

    #[test]
    fn test_missing_plex_config() {
        assert!(sync_options(&context(Config::default()), &SyncOverrides::default()).is_err());
    }
}
