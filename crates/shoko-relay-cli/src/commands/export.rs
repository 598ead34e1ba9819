use super::context::AppContext;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use shoko_relay_sources::snapshot::{write_series, write_users};
use shoko_relay_sources::{ShokoLibrary, ShokoUserData};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{info, warn};

/// Series requests in flight at once
const CONCURRENT_FETCHES: usize = 4;

pub async fn run_export(series: Vec<u64>, dir: Option<PathBuf>, output: &Output) -> Result<()> {
    let ctx = AppContext::load()?;
    let shoko = ctx
        .factory()
        .shoko()
        .map_err(|e| eyre!("{}. Run 'shoko-relay config shoko' first", e))?;
    let dir = dir.unwrap_or_else(|| ctx.paths.snapshot_dir());

    let series_ids = if series.is_empty() {
        shoko.list_series_ids().await?
    } else {
        series
    };

    let pb = if std::io::stderr().is_terminal() {
        ProgressBar::new(series_ids.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}") {
        pb.set_style(style);
    }

    let mut written = 0;
    let mut missing = Vec::new();
    let shoko = &shoko;
    let mut fetches = futures::stream::iter(series_ids.iter().copied())
        .map(|series_id| async move { (series_id, shoko.series(series_id).await) })
        .buffered(CONCURRENT_FETCHES);

    while let Some((series_id, fetched)) = fetches.next().await {
        match fetched {
            Ok(series) => {
                pb.set_message(series.title.clone());
                write_series(&dir, &series)?;
                written += 1;
            }
            Err(e) if e.is_not_found() => {
                warn!("Series {} not found in Shoko", series_id);
                missing.push(series_id);
            }
            Err(e) => {
                pb.finish_and_clear();
                return Err(e.into());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let users = shoko.list_users().await?;
    write_users(&dir, &users)?;
    info!(operation = "export", series = written, dir = %dir.display(), "Exported snapshots");

    if output.is_human() {
        if !missing.is_empty() {
            output.warn(format!("{} series were not found: {:?}", missing.len(), missing));
        }
        output.success(format!("Exported {} series to {}", written, dir.display()));
        output.println(format!("Use them with: shoko-relay --snapshot {} <command>", dir.display()));
    } else {
        output.json(&json!({
            "dir": dir,
            "exported": written,
            "missing": missing,
        }));
    }
    Ok(())
}
