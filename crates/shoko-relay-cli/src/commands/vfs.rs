use super::context::{AppContext, Library};
use crate::output::{new_table, Output};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use shoko_relay_core::vfs::{apply_plan, plan_series};
use shoko_relay_core::{FileMappingBuilder, VfsPlan};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{info, warn};

fn link_progress(total: u64) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb
}

pub async fn run_vfs(
    series: Vec<u64>,
    dry_run: bool,
    no_clean: bool,
    snapshot: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    let ctx = AppContext::load()?;
    if ctx.config.vfs.root.is_none() {
        return Err(eyre!("vfs.root is not set in {}", ctx.paths.config_file().display()));
    }
    let clean = ctx.config.vfs.clean && !no_clean;

    let library = Library::open(&ctx, snapshot)?;
    let builder = FileMappingBuilder::new(ctx.config.mapping.clone());
    let series_ids = library.series_ids(series).await?;

    // Plan everything first so a broken series fails before anything is linked
    let mut plans: Vec<VfsPlan> = Vec::with_capacity(series_ids.len());
    for series_id in &series_ids {
        let series = match library.catalog().series(*series_id).await {
            Ok(series) => series,
            Err(e) if e.is_not_found() => {
                output.warn(format!("Series {} not found, skipping", series_id));
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let data = builder.series_file_data(&series);
        let plan = plan_series(&ctx.config.vfs, &series, &data)
            .map_err(|e| eyre!("Failed to plan series {}: {}", series_id, e))?;
        for video_id in &plan.missing_location {
            warn!("Video {} of series {} has no known location", video_id, series_id);
        }
        plans.push(plan);
    }

    let total_links: usize = plans.iter().map(|p| p.links.len()).sum();
    info!(
        operation = "vfs",
        series = plans.len(),
        links = total_links,
        dry_run,
        clean,
        "Planned VFS"
    );

    if dry_run {
        if output.is_human() {
            for plan in &plans {
                output.section(&plan.series_dir.display().to_string());
                let mut table = new_table(["Link", "Target"]);
                for link in &plan.links {
                    let relative = link.link.strip_prefix(&plan.series_dir).unwrap_or(&link.link);
                    table.add_row(vec![relative.display().to_string(), link.target.display().to_string()]);
                }
                output.table(&table);
            }
            output.success(format!(
                "Dry run: {} links in {} series (nothing written)",
                total_links,
                plans.len()
            ));
        } else {
            output.json(&json!({ "dry_run": true, "clean": clean, "plans": plans }));
        }
        return Ok(());
    }

    let pb = link_progress(total_links as u64);
    let mut created = 0;
    let mut replaced = 0;
    let mut failed = Vec::new();
    for plan in &plans {
        pb.set_message(plan.series_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default());
        match apply_plan(plan, clean, |_| pb.inc(1)) {
            Ok(report) => {
                created += report.created;
                replaced += report.replaced;
            }
            Err(e) => {
                warn!("VFS failed for series {}: {:#}", plan.series_id, e);
                failed.push(json!({ "series_id": plan.series_id, "error": format!("{:#}", e) }));
            }
        }
    }
    pb.finish_and_clear();

    if output.is_human() {
        for failure in &failed {
            output.error(format!("Series {}: {}", failure["series_id"], failure["error"].as_str().unwrap_or_default()));
        }
        output.success(format!(
            "Linked {} series: {} created, {} replaced",
            plans.len() - failed.len(),
            created,
            replaced
        ));
    } else {
        output.json(&json!({
            "series": plans.len(),
            "created": created,
            "replaced": replaced,
            "clean": clean,
            "failed": failed,
        }));
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(eyre!("{} series could not be linked", failed.len()))
    }
}
