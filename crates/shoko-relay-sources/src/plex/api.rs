use crate::SourceError;
use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;
use shoko_relay_models::PlexWatchedItem;
use tracing::debug;

const CLIENT_IDENTIFIER: &str = "shoko-relay";
const PAGE_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub key: String,
    pub type_: String,
    pub title: String,
    pub agent: String,
}

pub struct PlexHttpClient {
    client: Client,
    server_url: String,
}

impl PlexHttpClient {
    pub fn new(token: &str, server_url: &str) -> Result<Self, SourceError> {
        let client = Client::builder()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-token"),
                    reqwest::header::HeaderValue::from_str(token).context("Invalid token format")?,
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-client-identifier"),
                    reqwest::header::HeaderValue::from_static(CLIENT_IDENTIFIER),
                );
                headers
            })
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn get_json(&self, url: &str) -> Result<Value, SourceError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                service: "Plex",
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn get_libraries(&self) -> Result<Vec<LibraryInfo>, SourceError> {
        let url = format!("{}/library/sections", self.server_url);
        let json = self.get_json(&url).await?;

        let libraries = json
            .get("MediaContainer")
            .and_then(|c| c.get("Directory"))
            .and_then(|d| d.as_array())
            .map(|dirs| {
                dirs.iter()
                    .map(|dir| LibraryInfo {
                        key: str_field(dir, "key").unwrap_or_default(),
                        type_: str_field(dir, "type").unwrap_or_default(),
                        title: str_field(dir, "title").unwrap_or_default(),
                        agent: str_field(dir, "agent").unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(libraries)
    }

    /// Every episode of a section with a non-zero view count, paged
    pub async fn get_watched_episodes(&self, section: &str) -> Result<Vec<PlexWatchedItem>, SourceError> {
        let mut items = Vec::new();
        let mut start = 0usize;

        loop {
            let url = format!(
                "{}/library/sections/{}/all?type=4&viewCount%3E=1&X-Plex-Container-Start={}&X-Plex-Container-Size={}",
                self.server_url,
                urlencoding::encode(section),
                start,
                PAGE_SIZE
            );
            let json = self.get_json(&url).await?;
            let container = json
                .get("MediaContainer")
                .ok_or_else(|| SourceError::Parse("missing MediaContainer".to_string()))?;

            // Items inherit the section from their container
            let container_section = container
                .get("librarySectionID")
                .and_then(value_as_string)
                .unwrap_or_else(|| section.to_string());

            let page: Vec<PlexWatchedItem> = container
                .get("Metadata")
                .and_then(|m| m.as_array())
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| parse_watched_item(entry, &container_section))
                        .collect()
                })
                .unwrap_or_default();

            let fetched = page.len();
            items.extend(page);

            let total = container
                .get("totalSize")
                .and_then(|t| t.as_u64())
                .map(|t| t as usize);
            start += PAGE_SIZE;
            match total {
                Some(total) if start < total => continue,
                None if fetched == PAGE_SIZE => continue,
                _ => break,
            }
        }

        debug!(
            operation = "plex_watched_episodes",
            section,
            count = items.len(),
            "Fetched watched Plex episodes"
        );
        Ok(items)
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(value_as_string)
}

// Plex sends ids as strings on some endpoints and numbers on others
fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(|t| t.as_i64())
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

fn parse_watched_item(entry: &Value, container_section: &str) -> Option<PlexWatchedItem> {
    let rating_key = str_field(entry, "ratingKey")?;
    let guid = str_field(entry, "guid").unwrap_or_default();
    let file_path = entry
        .get("Media")
        .and_then(|m| m.as_array())
        .and_then(|media| media.first())
        .and_then(|m| m.get("Part"))
        .and_then(|p| p.as_array())
        .and_then(|parts| parts.first())
        .and_then(|p| str_field(p, "file"));

    Some(PlexWatchedItem {
        rating_key,
        guid,
        title: str_field(entry, "title"),
        show_title: str_field(entry, "grandparentTitle"),
        library_section_id: str_field(entry, "librarySectionID").or_else(|| Some(container_section.to_string())),
        file_path,
        view_count: entry.get("viewCount").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        last_viewed_at: parse_timestamp(entry.get("lastViewedAt")),
    })
}
