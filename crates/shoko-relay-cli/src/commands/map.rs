use super::context::{AppContext, Library};
use crate::output::{new_table, Output};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::json;
use shoko_relay_core::map_helper::SeriesTrace;
use shoko_relay_core::metadata::{season_episodes_metadata, seasons_metadata, series_metadata};
use shoko_relay_core::rating_keys::episode_rating_key;
use shoko_relay_core::{FileMappingBuilder, ReportStore, SeriesFileData, VideoOutcome};
use shoko_relay_models::{FileMapping, PlexSeason};
use std::path::PathBuf;

pub async fn run_map(
    series_id: u64,
    trace: bool,
    metadata: bool,
    season: Option<i32>,
    snapshot: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    let ctx = AppContext::load()?;
    let library = Library::open(&ctx, snapshot)?;
    let series = library.catalog().series(series_id).await?;
    let builder = FileMappingBuilder::new(ctx.config.mapping.clone());

    if trace {
        let trace = builder.trace_file_mappings(&series);
        let store = ReportStore::new(&ctx.paths).map_err(|e| eyre!("Failed to open report store: {}", e))?;
        let path = store
            .save_trace(&trace)
            .map_err(|e| eyre!("Failed to save mapping trace: {}", e))?;

        if output.is_human() {
            output.section(&format!("{} [{}]", series.title, series.id));
            print_trace(&trace, output);
            output.success(format!("Trace saved to {}", path.display()));
        } else {
            output.json(&serde_json::to_value(&trace)?);
        }
        return Ok(());
    }

    let data = builder.series_file_data(&series);

    if metadata {
        let document = match season {
            Some(season) => serde_json::to_value(season_episodes_metadata(&series, &data, season))?,
            None => json!({
                "series": series_metadata(&series, &data),
                "seasons": seasons_metadata(&series, &data),
            }),
        };
        output.json(&document);
        return Ok(());
    }

    if !output.is_human() {
        let mappings: Vec<&FileMapping> = match season {
            Some(season) => data.for_season(season),
            None => data.seasons.iter().flat_map(|s| data.for_season(*s)).collect(),
        };
        output.json(&json!({
            "series_id": series.id,
            "title": series.title,
            "preferred_ordering": builder.preferred_ordering(&series),
            "mappings": mappings,
        }));
        return Ok(());
    }

    output.section(&format!("{} [{}]", series.title, series.id));
    if data.is_empty() {
        output.warn("No files of this series could be mapped");
        return Ok(());
    }
    if let Some(ordering) = builder.preferred_ordering(&series) {
        output.println(format!("TMDB ordering: {}", ordering));
    }

    let mut table = new_table(["Season", "Episode", "Part", "Episodes", "File", "Rating key"]);
    for row in mapping_rows(&data, season) {
        table.add_row(row);
    }
    output.table(&table);
    output.success(format!("{} files mapped", data.len()));
    Ok(())
}

fn part_label(mapping: &FileMapping) -> String {
    match (mapping.part_index, mapping.part_count) {
        (Some(index), Some(count)) => format!("{}/{}", index, count),
        _ => String::new(),
    }
}

/// Table rows in season order, limited to `season` when given
fn mapping_rows(data: &SeriesFileData, season: Option<i32>) -> Vec<Vec<String>> {
    let seasons: Vec<i32> = match season {
        Some(season) => vec![season],
        None => data.seasons.clone(),
    };

    seasons
        .into_iter()
        .flat_map(|s| data.for_season(s))
        .map(|mapping| {
            let episodes: Vec<String> = mapping.episode_ids().iter().map(|id| id.to_string()).collect();
            vec![
                PlexSeason::title(mapping.coords.season),
                mapping.coords.to_string(),
                part_label(mapping),
                episodes.join(", "),
                mapping.file_name.clone(),
                episode_rating_key(mapping),
            ]
        })
        .collect()
}

fn print_trace(trace: &SeriesTrace, output: &Output) {
    if let Some(ordering) = &trace.preferred_ordering {
        output.println(format!("TMDB ordering: {}", ordering));
    }
    output.println(format!(
        "Standard season empty: {}, specials season empty: {}",
        trace.standard_season_empty, trace.specials_season_empty
    ));

    let mut table = new_table(["Video", "File", "Candidates", "Ranked", "Part", "Coords", "Outcome"]);
    for video in &trace.videos {
        let candidates: Vec<String> = video
            .candidates
            .iter()
            .map(|c| format!("{} {:?} {}", c.episode_id, c.episode_type, c.coords))
            .collect();
        let ranked: Vec<String> = video.ranked.iter().map(|id| id.to_string()).collect();
        let part = match (video.part_eligible, video.file_index, video.file_count) {
            (true, Some(index), Some(count)) => format!("{}/{}", index + 1, count),
            _ => String::new(),
        };
        let coords = match (video.coords, video.featurettes_fallback) {
            (Some(coords), Some(season)) => format!("{} (moved to {})", coords, PlexSeason::title(season)),
            (Some(coords), None) => coords.to_string(),
            (None, _) => String::new(),
        };
        let outcome = match &video.outcome {
            VideoOutcome::Mapped => "mapped".to_string(),
            VideoOutcome::Skipped { cause } => format!("skipped: {:?}", cause),
        };
        table.add_row(vec![
            video.video_id.to_string(),
            video.file_name.clone(),
            candidates.join("\n"),
            ranked.join(", "),
            part,
            coords,
            outcome,
        ]);
    }
    output.table(&table);
}
