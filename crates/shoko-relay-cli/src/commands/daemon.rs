use super::context::{AppContext, Library};
use super::sync_watched::{self, SyncOverrides};
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use shoko_relay_config::{default_scheduler_config, SchedulerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Scheduled watched sync. Runs never overlap: a tick that fires while a run is
/// still going is skipped.
struct Scheduler {
    snapshot: Option<PathBuf>,
    cancel: CancellationToken,
    running: Arc<Mutex<()>>,
}

impl Scheduler {
    fn new(snapshot: Option<PathBuf>) -> Self {
        Self {
            snapshot,
            cancel: CancellationToken::new(),
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Config and credentials are reloaded for every run so edits apply without a restart
    async fn run_once(snapshot: Option<PathBuf>, cancel: CancellationToken, running: Arc<Mutex<()>>) {
        let Ok(_guard) = running.try_lock() else {
            warn!(operation = "scheduled_sync_skipped", "Previous watched sync is still running");
            return;
        };
        if cancel.is_cancelled() {
            return;
        }

        info!(operation = "scheduled_sync_start", "Starting scheduled watched sync");
        let result = async {
            let ctx = AppContext::load()?;
            let library = Library::open(&ctx, snapshot)?;
            sync_watched::execute(&ctx, &library, &SyncOverrides::default(), cancel).await
        }
        .await;

        match result {
            Ok((report, path)) => info!(
                operation = "scheduled_sync_complete",
                processed = report.totals.processed,
                marked = report.totals.marked,
                skipped = report.totals.skipped,
                errors = report.totals.errors,
                cancelled = report.cancelled,
                duration_ms = report.duration_ms,
                report = %path.display(),
                "Scheduled watched sync completed"
            ),
            Err(e) => error!(
                operation = "scheduled_sync_error",
                error = %e,
                "Scheduled watched sync failed"
            ),
        }
    }

    async fn start(&self, config: &SchedulerConfig) -> Result<()> {
        if config.run_on_startup {
            info!(operation = "scheduler_startup", "Running initial watched sync on startup");
            Self::run_once(self.snapshot.clone(), self.cancel.clone(), self.running.clone()).await;
        }

        let mut sched = JobScheduler::new().await?;
        let snapshot = self.snapshot.clone();
        let cancel = self.cancel.clone();
        let running = self.running.clone();
        let job = Job::new_async(config.schedule.as_str(), move |_id, _sched| {
            let snapshot = snapshot.clone();
            let cancel = cancel.clone();
            let running = running.clone();
            Box::pin(async move {
                Self::run_once(snapshot, cancel, running).await;
            })
        })
        .map_err(|e| eyre!("Invalid cron schedule '{}': {}", config.schedule, e))?;
        sched.add(job).await?;
        sched.start().await?;

        info!(
            operation = "scheduler_started",
            schedule = %config.schedule,
            timezone = %config.timezone,
            "Scheduler started"
        );

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!(operation = "scheduler_stop", "Shutdown requested"),
            _ = self.cancel.cancelled() => {}
        }

        self.cancel.cancel();
        sched.shutdown().await?;
        // Let an in-flight run write its report
        let _ = self.running.lock().await;
        info!(operation = "scheduler_stopped", "Scheduler stopped");
        Ok(())
    }
}

/// Schedule from the command line, then `[scheduler]`, then the built-in default
fn effective_config(config: Option<&SchedulerConfig>, schedule: Option<String>, no_startup_sync: bool) -> SchedulerConfig {
    let mut effective = config.cloned().unwrap_or_else(default_scheduler_config);
    if let Some(schedule) = schedule {
        effective.schedule = schedule;
    }
    if no_startup_sync {
        effective.run_on_startup = false;
    }
    if let Ok(tz) = std::env::var("TZ") {
        effective.timezone = tz;
    }
    effective
}

pub async fn run_daemon(
    schedule: Option<String>,
    no_startup_sync: bool,
    snapshot: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    let ctx = AppContext::load()?;
    if !ctx.config.watched_sync.enabled {
        return Err(eyre!("Watched sync is disabled (watched_sync.enabled = false); nothing to schedule"));
    }
    // Fail on missing servers or credentials now rather than at the first tick
    ctx.factory().plex_sources(false)?;
    if snapshot.is_none() {
        ctx.factory().shoko()?;
    }

    let config = effective_config(ctx.config.scheduler.as_ref(), schedule, no_startup_sync);
    output.info(format!(
        "Watched sync scheduled with '{}'. Press Ctrl-C to stop.",
        config.schedule
    ));

    Scheduler::new(snapshot).start(&config).await
}
