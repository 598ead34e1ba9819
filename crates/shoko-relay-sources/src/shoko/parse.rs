// Shoko Server API v3 payloads -> relay models

use serde_json::Value;
use shoko_relay_models::{CrossReference, Episode, EpisodeType, Series, TmdbEpisode, TmdbOrdering, Video};
use std::collections::HashMap;

pub(crate) fn u64_field(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
}

pub(crate) fn i32_field(value: &Value, key: &str) -> Option<i32> {
    value.get(key).and_then(|v| v.as_i64()).map(|v| v as i32)
}

pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

fn array<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value.get(key).and_then(|v| v.as_array()).into_iter().flatten()
}

pub(crate) fn episode_type(name: &str) -> EpisodeType {
    match name {
        "Normal" | "Episode" => EpisodeType::Normal,
        "Special" => EpisodeType::Special,
        "Credits" | "ThemeSong" | "OpeningSong" | "EndingSong" => EpisodeType::Credits,
        "Trailer" => EpisodeType::Trailer,
        "Parody" => EpisodeType::Parody,
        "Other" => EpisodeType::Other,
        _ => EpisodeType::Unknown,
    }
}

/// `IDs.ID`, falling back to a top-level `ID`
pub(crate) fn shoko_id(value: &Value) -> Option<u64> {
    value
        .get("IDs")
        .and_then(|ids| u64_field(ids, "ID"))
        .or_else(|| u64_field(value, "ID"))
}

pub(crate) fn parse_series_header(value: &Value) -> Option<Series> {
    let id = shoko_id(value)?;
    let title = str_field(value, "Name").unwrap_or_else(|| format!("Series {}", id));
    let mut series = Series::new(id, title);

    // TMDB show link: either a bare id list under IDs.TMDB.Show or objects under TMDB.Shows
    let tmdb_ids = value.get("IDs").and_then(|ids| ids.get("TMDB"));
    series.tmdb_show_id = tmdb_ids
        .and_then(|t| t.get("Show"))
        .and_then(|s| s.as_array())
        .and_then(|s| s.first())
        .and_then(|s| s.as_u64());

    if let Some(show) = value
        .get("TMDB")
        .and_then(|t| t.get("Shows"))
        .and_then(|s| s.as_array())
        .and_then(|s| s.first())
    {
        if series.tmdb_show_id.is_none() {
            series.tmdb_show_id = u64_field(show, "ID");
        }
        series.preferred_tmdb_ordering_id = str_field(show, "PreferredOrderingID");
    }

    Some(series)
}

fn parse_tmdb_episode(value: &Value) -> Option<TmdbEpisode> {
    Some(TmdbEpisode {
        id: u64_field(value, "ID")?,
        show_id: u64_field(value, "ShowID").unwrap_or(0),
        season_number: i32_field(value, "SeasonNumber"),
        episode_number: i32_field(value, "EpisodeNumber")?,
        title: str_field(value, "Title"),
        overview: str_field(value, "Overview"),
        ordering_id: None,
        orderings: array(value, "Ordering")
            .filter_map(|o| {
                Some(TmdbOrdering {
                    ordering_id: str_field(o, "OrderingID")?,
                    season_number: i32_field(o, "SeasonNumber"),
                    episode_number: i32_field(o, "EpisodeNumber")?,
                })
            })
            .collect(),
    })
}

fn parse_file(value: &Value) -> Option<Video> {
    let id = u64_field(value, "ID")?;
    let locations: Vec<String> = array(value, "Locations")
        .filter_map(|l| str_field(l, "AbsolutePath").or_else(|| str_field(l, "RelativePath")))
        .collect();

    let mut cross_references = Vec::new();
    for xref in array(value, "CrossReferences") {
        for (position, episode) in array(xref, "Episodes").enumerate() {
            let Some(episode_id) = u64_field(episode, "ID").or_else(|| u64_field(episode, "Shoko")) else {
                continue;
            };
            let percentage = episode
                .get("Percentage")
                .and_then(|p| p.get("Size").or(Some(p)))
                .and_then(|p| p.as_u64())
                .map(|p| p.min(100) as u8)
                .unwrap_or(100);
            cross_references.push(CrossReference {
                episode_id,
                percentage,
                order: i32_field(episode, "Order").unwrap_or(position as i32),
            });
        }
    }

    Some(Video {
        id,
        locations,
        cross_references,
    })
}

/// One API episode plus the files it lists
pub(crate) fn parse_episode(value: &Value) -> Option<(Episode, Vec<Video>)> {
    let id = shoko_id(value)?;
    let anidb = value.get("AniDB").cloned().unwrap_or(Value::Null);

    let episode_type = str_field(&anidb, "Type").map(|t| episode_type(&t)).unwrap_or(EpisodeType::Unknown);
    let number = i32_field(&anidb, "EpisodeNumber").unwrap_or(1);

    let mut episode = Episode::new(id, episode_type, number);
    episode.title = str_field(value, "Name").or_else(|| str_field(&anidb, "Title"));
    episode.summary = str_field(value, "Description").or_else(|| str_field(&anidb, "Description"));
    episode.is_hidden = value.get("IsHidden").and_then(|h| h.as_bool()).unwrap_or(false);
    episode.tmdb_episodes = value
        .get("TMDB")
        .map(|t| array(t, "Episodes").filter_map(parse_tmdb_episode).collect())
        .unwrap_or_default();

    let files: Vec<Video> = array(value, "Files").filter_map(parse_file).collect();
    episode.video_ids = files.iter().map(|f| f.id).collect();

    Some((episode, files))
}

/// Assembles the series graph, de-duplicating files shared by several episodes
pub(crate) fn assemble_series(mut series: Series, episodes: &[Value]) -> Series {
    let mut videos: HashMap<u64, Video> = HashMap::new();
    let mut video_order = Vec::new();

    for value in episodes {
        let Some((episode, files)) = parse_episode(value) else {
            continue;
        };
        for file in files {
            match videos.get_mut(&file.id) {
                Some(existing) => {
                    for xref in file.cross_references {
                        if !existing.cross_references.contains(&xref) {
                            existing.cross_references.push(xref);
                        }
                    }
                }
                None => {
                    video_order.push(file.id);
                    videos.insert(file.id, file);
                }
            }
        }
        series.episodes.push(episode);
    }

    series.videos = video_order.into_iter().filter_map(|id| videos.remove(&id)).collect();
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn episode_json() -> Value {
        json!({
            "IDs": {"ID": 42, "ParentSeries": 12},
            "Name": "Arrival",
            "IsHidden": false,
            "AniDB": {"Type": "Normal", "EpisodeNumber": 3},
            "TMDB": {"Episodes": [{
                "ID": 900, "ShowID": 77, "SeasonNumber": 1, "EpisodeNumber": 5, "Title": "Arrival (TMDB)",
                "Ordering": [{"OrderingID": "group-a", "SeasonNumber": 2, "EpisodeNumber": 1}]
            }]},
            "Files": [{
                "ID": 5,
                "Locations": [{"AbsolutePath": "/anime/Show/03.mkv"}],
                "CrossReferences": [{"Episodes": [
                    {"ID": 42, "Percentage": {"Size": 100}},
                    {"ID": 43, "Percentage": {"Size": 50}, "Order": 4}
                ]}]
            }]
        })
    }

    #[test]
    fn test_parse_episode() {
        let (episode, files) = parse_episode(&episode_json()).unwrap();
        assert_eq!(episode.id, 42);
        assert_eq!(episode.episode_type, EpisodeType::Normal);
        assert_eq!(episode.episode_number, 3);
        assert_eq!(episode.title.as_deref(), Some("Arrival"));
        assert_eq!(episode.video_ids, vec![5]);

        let tmdb = &episode.tmdb_episodes[0];
        assert_eq!(tmdb.show_id, 77);
        assert_eq!(tmdb.find_ordering("group-a").map(|o| o.season_number), Some(Some(2)));

        let video = &files[0];
        assert_eq!(video.primary_location(), Some("/anime/Show/03.mkv"));
        assert_eq!(video.cross_references.len(), 2);
        assert_eq!(video.cross_references[0].order, 0);
        assert_eq!(video.cross_references[1].percentage, 50);
        assert_eq!(video.cross_references[1].order, 4);
    }

    #[test]
    fn test_episode_type_names() {
        assert_eq!(episode_type("ThemeSong"), EpisodeType::Credits);
        assert_eq!(episode_type("Trailer"), EpisodeType::Trailer);
        assert_eq!(episode_type("Something"), EpisodeType::Unknown);
    }

    #[test]
    fn test_series_header_tmdb_ordering() {
        let value = json!({
            "IDs": {"ID": 12, "TMDB": {"Show": [77]}},
            "Name": "Show",
            "TMDB": {"Shows": [{"ID": 77, "PreferredOrderingID": "group-a"}]}
        });
        let series = parse_series_header(&value).unwrap();
        assert_eq!(series.tmdb_show_id, Some(77));
        assert_eq!(series.preferred_tmdb_ordering_id.as_deref(), Some("group-a"));
        assert_eq!(series.effective_ordering_id(), Some("group-a".to_string()));
    }

    #[test]
    fn test_assemble_shares_files() {
        let mut second = episode_json();
        second["IDs"]["ID"] = json!(43);
        second["AniDB"]["EpisodeNumber"] = json!(4);

        let series = assemble_series(Series::new(12, "Show"), &[episode_json(), second]);
        assert_eq!(series.episodes.len(), 2);
        assert_eq!(series.videos.len(), 1);
        assert_eq!(series.videos[0].cross_references.len(), 2);
    }
}
