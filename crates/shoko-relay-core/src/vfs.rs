// Virtual file system: Plex-friendly symlink tree over the Shoko import folders
//
// <root>/<Series Title> [shoko-<id>]/<season folder>/<Series Title> - s01e05-e06 pt1 [e1234p1].mkv

use crate::rating_keys::episode_rating_key;
use crate::series_file_data::SeriesFileData;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use shoko_relay_config::{PathMapping, VfsConfig};
use shoko_relay_models::{FileMapping, PlexSeason, Series};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VfsLink {
    pub video_id: u64,
    pub rating_key: String,
    /// File the link points at, after path mappings
    pub target: PathBuf,
    pub link: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct VfsPlan {
    pub series_id: u64,
    pub series_dir: PathBuf,
    pub links: Vec<VfsLink>,
    /// Videos with no known location
    pub missing_location: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VfsApplyReport {
    pub created: usize,
    pub replaced: usize,
    pub cleaned: bool,
}

fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches('.').trim().to_string()
}

pub fn series_folder_name(series: &Series) -> String {
    let title = sanitize_component(&series.title);
    if title.is_empty() {
        format!("[shoko-{}]", series.id)
    } else {
        format!("{} [shoko-{}]", title, series.id)
    }
}

/// Link file name. Extras folders are not parsed by Plex, so they use season 00.
pub fn link_name(series: &Series, mapping: &FileMapping) -> String {
    let season = if PlexSeason::is_extras(mapping.coords.season) {
        0
    } else {
        mapping.coords.season
    };

    let mut name = format!("{} - s{:02}e{:02}", sanitize_component(&series.title), season, mapping.coords.episode);
    if let Some(end) = mapping.coords.end_episode {
        name.push_str(&format!("-e{:02}", end));
    }
    if let Some(part) = mapping.part_index {
        name.push_str(&format!(" pt{}", part));
    }
    name.push_str(&format!(" [{}]", episode_rating_key(mapping)));

    // Versions of one episode share everything above
    if mapping.part_index.is_none() {
        name.push_str(&format!(" [v{}]", mapping.video.id));
    }
    if let Some(ext) = mapping.video.extension() {
        name.push('.');
        name.push_str(&ext);
    }
    name
}

/// Rewrites a Shoko location with the first matching path mapping
pub fn map_location(location: &str, mappings: &[PathMapping]) -> PathBuf {
    for mapping in mappings {
        let from = mapping.from.trim_end_matches(['/', '\\']);
        if from.is_empty() {
            continue;
        }
        if let Some(rest) = location.strip_prefix(from) {
            if rest.is_empty() || rest.starts_with(['/', '\\']) {
                let rest = rest.trim_start_matches(['/', '\\']).replace('\\', "/");
                return Path::new(&mapping.to).join(rest);
            }
        }
    }
    PathBuf::from(location)
}

pub fn plan_series(config: &VfsConfig, series: &Series, data: &SeriesFileData) -> Result<VfsPlan> {
    let root = config
        .root
        .as_ref()
        .ok_or_else(|| anyhow!("vfs.root is not configured"))?;
    let series_dir = root.join(series_folder_name(series));

    let mut links = Vec::with_capacity(data.len());
    let mut missing_location = Vec::new();

    for season in &data.seasons {
        let season_dir = series_dir.join(PlexSeason::folder_name(*season));
        for mapping in data.for_season(*season) {
            let Some(location) = mapping.video.primary_location() else {
                missing_location.push(mapping.video.id);
                continue;
            };
            links.push(VfsLink {
                video_id: mapping.video.id,
                rating_key: episode_rating_key(mapping),
                target: map_location(location, &config.path_mappings),
                link: season_dir.join(link_name(series, mapping)),
            });
        }
    }

    debug!(
        operation = "vfs_plan",
        series_id = series.id,
        links = links.len(),
        missing = missing_location.len(),
        "Planned VFS links"
    );

    Ok(VfsPlan {
        series_id: series.id,
        series_dir,
        links,
        missing_location,
    })
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Writes the plan to disk, calling `on_link` after each link
pub fn apply_plan<F>(plan: &VfsPlan, clean: bool, mut on_link: F) -> Result<VfsApplyReport>
where
    F: FnMut(&VfsLink),
{
    let mut report = VfsApplyReport::default();

    if clean && plan.series_dir.exists() {
        std::fs::remove_dir_all(&plan.series_dir)
            .with_context(|| format!("Failed to clean series folder {:?}", plan.series_dir))?;
        report.cleaned = true;
    }

    for link in &plan.links {
        if let Some(parent) = link.link.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("Failed to create folder {:?}", parent))?;
        }

        if std::fs::symlink_metadata(&link.link).is_ok() {
            std::fs::remove_file(&link.link).with_context(|| format!("Failed to replace {:?}", link.link))?;
            report.replaced += 1;
        } else {
            report.created += 1;
        }

        if !link.target.exists() {
            warn!("VFS target does not exist (yet): {:?}", link.target);
        }
        create_symlink(&link.target, &link.link)
            .with_context(|| format!("Failed to link {:?} -> {:?}", link.link, link.target))?;
        on_link(link);
    }

    info!(
        operation = "vfs_apply",
        series_id = plan.series_id,
        created = report.created,
        replaced = report.replaced,
        cleaned = report.cleaned,
        "Applied VFS plan"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoko_relay_models::{Episode, EpisodeType, PlexCoords, Video};

    fn mapping(video: Video, episode_id: u64, coords: PlexCoords, part: Option<u32>) -> FileMapping {
        let file_name = video.file_name();
        FileMapping {
            primary_episode: Episode::new(episode_id, EpisodeType::Normal, coords.episode),
            additional_episodes: Vec::new(),
            video,
            coords,
            file_name,
            part_index: part,
            part_count: part.map(|_| 2),
            tmdb_episode: None,
        }
    }

    #[test]
    fn test_series_folder_name_is_sanitized() {
        let series = Series::new(12, "Re:Zero / Starting Life?");
        assert_eq!(series_folder_name(&series), "Re Zero Starting Life [shoko-12]");
    }

    #[test]
    fn test_link_names() {
        let series = Series::new(1, "Show");
        let range = mapping(
            Video::new(5, "/a/x.mkv"),
            10,
            PlexCoords::with_end(1, 5, Some(6)),
            None,
        );
        assert_eq!(link_name(&series, &range), "Show - s01e05-e06 [e10] [v5].mkv");

        let part = mapping(Video::new(6, "/a/y.mp4"), 11, PlexCoords::new(1, 3), Some(2));
        assert_eq!(link_name(&series, &part), "Show - s01e03 pt2 [e11p2].mp4");

        let credit = mapping(Video::new(7, "/a/op.mkv"), 12, PlexCoords::new(PlexSeason::CREDITS, 1), None);
        assert_eq!(link_name(&series, &credit), "Show - s00e01 [e12] [v7].mkv");
    }

    #[test]
    fn test_path_mappings() {
        let mappings = vec![
            PathMapping {
                from: "D:\\Anime".to_string(),
                to: "/mnt/anime".to_string(),
            },
            PathMapping {
                from: "/import/".to_string(),
                to: "/data".to_string(),
            },
        ];
        assert_eq!(
            map_location("D:\\Anime\\Show\\01.mkv", &mappings),
            PathBuf::from("/mnt/anime/Show/01.mkv")
        );
        assert_eq!(map_location("/import/Show/01.mkv", &mappings), PathBuf::from("/data/Show/01.mkv"));
        assert_eq!(map_location("/important/x.mkv", &mappings), PathBuf::from("/important/x.mkv"));
    }

    #[test]
    fn test_plan_requires_root() {
        let series = Series::new(1, "Show");
        let data = SeriesFileData::from_mappings(1, Vec::new());
        assert!(plan_series(&VfsConfig::default(), &series, &data).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_apply_plan_creates_and_replaces_links() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("01.mkv"), b"video").unwrap();
        std::fs::write(source.join("sp.mkv"), b"special").unwrap();

        let series = Series::new(3, "Show");
        let data = SeriesFileData::from_mappings(
            3,
            vec![
                mapping(
                    Video::new(1, source.join("01.mkv").to_string_lossy()),
                    10,
                    PlexCoords::new(1, 1),
                    None,
                ),
                mapping(
                    Video::new(2, source.join("sp.mkv").to_string_lossy()),
                    11,
                    PlexCoords::new(0, 1),
                    None,
                ),
            ],
        );
        let config = VfsConfig {
            root: Some(dir.path().join("vfs")),
            ..VfsConfig::default()
        };

        let plan = plan_series(&config, &series, &data).unwrap();
        assert_eq!(plan.links.len(), 2);

        let mut seen = 0;
        let report = apply_plan(&plan, false, |_| seen += 1).unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(seen, 2);

        let episode_link = dir.path().join("vfs/Show [shoko-3]/Season 01/Show - s01e01 [e10] [v1].mkv");
        assert_eq!(std::fs::read(&episode_link).unwrap(), b"video");
        assert!(dir.path().join("vfs/Show [shoko-3]/Specials").is_dir());

        let report = apply_plan(&plan, false, |_| {}).unwrap();
        assert_eq!(report.replaced, 2);
        assert_eq!(report.created, 0);

        std::fs::write(plan.series_dir.join("stale.txt"), b"old").unwrap();
        let report = apply_plan(&plan, true, |_| {}).unwrap();
        assert!(report.cleaned);
        assert!(!plan.series_dir.join("stale.txt").exists());
        assert_eq!(report.created, 2);
    }
}
