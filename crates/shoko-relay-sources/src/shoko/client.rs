use crate::shoko::parse::{assemble_series, episode_type, i32_field, parse_series_header, shoko_id, str_field, u64_field};
use crate::traits::{ShokoLibrary, ShokoUserData};
use crate::SourceError;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use shoko_relay_models::{EpisodeType, Series, ShokoEpisodeInfo, ShokoUser};
use tracing::{debug, info};

/// Shoko Server REST API (v3)
///
/// Watched state is read and written for the user owning the API key; the
/// `user_id` arguments only label the request in logs.
pub struct ShokoHttpClient {
    client: Client,
    base_url: String,
}

impl ShokoHttpClient {
    pub fn new(server_url: &str, api_key: &str) -> Result<Self, SourceError> {
        let client = Client::builder()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("apikey"),
                    reqwest::header::HeaderValue::from_str(api_key).context("Invalid API key format")?,
                );
                headers
            })
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: format!("{}/api/v3", server_url.trim_end_matches('/')),
        })
    }

    async fn request(&self, method: Method, path: &str) -> Result<Option<Value>, SourceError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self.client.request(method, &url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                service: "Shoko",
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Some(Value::Null));
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn get(&self, path: &str) -> Result<Value, SourceError> {
        self.request(Method::GET, path)
            .await?
            .ok_or_else(|| SourceError::NotFound(path.to_string()))
    }

    async fn series_title(&self, series_id: u64) -> Result<String, SourceError> {
        let value = self.get(&format!("Series/{}", series_id)).await?;
        Ok(str_field(&value, "Name").unwrap_or_else(|| format!("Series {}", series_id)))
    }
}

#[async_trait]
impl ShokoLibrary for ShokoHttpClient {
    fn source_name(&self) -> &str {
        "shoko"
    }

    async fn list_series_ids(&self) -> Result<Vec<u64>, SourceError> {
        let value = self.get("Series?pageSize=0").await?;
        let ids: Vec<u64> = value
            .get("List")
            .and_then(|l| l.as_array())
            .map(|list| list.iter().filter_map(shoko_id).collect())
            .unwrap_or_default();
        info!("Shoko reports {} series", ids.len());
        Ok(ids)
    }

    async fn series(&self, series_id: u64) -> Result<Series, SourceError> {
        let header = self
            .get(&format!("Series/{}?includeDataFrom=TMDB", series_id))
            .await?;
        let series = parse_series_header(&header)
            .ok_or_else(|| SourceError::Parse(format!("series {} has no id", series_id)))?;

        let episodes = self
            .get(&format!(
                "Series/{}/Episode?pageSize=0&includeHidden=true&includeFiles=true&includeXRefs=true&includeDataFrom={}",
                series_id,
                urlencoding::encode("AniDB,TMDB")
            ))
            .await?;
        let list: Vec<Value> = match episodes {
            Value::Array(items) => items,
            other => other
                .get("List")
                .and_then(|l| l.as_array())
                .cloned()
                .unwrap_or_default(),
        };

        let series = assemble_series(series, &list);
        debug!(
            operation = "shoko_series",
            series_id,
            episodes = series.episodes.len(),
            videos = series.videos.len(),
            "Loaded series graph"
        );
        Ok(series)
    }

    async fn episode_info(&self, episode_id: u64) -> Result<Option<ShokoEpisodeInfo>, SourceError> {
        let Some(value) = self
            .request(Method::GET, &format!("Episode/{}?includeDataFrom=AniDB", episode_id))
            .await?
        else {
            return Ok(None);
        };

        let series_id = value
            .get("IDs")
            .and_then(|ids| u64_field(ids, "ParentSeries"))
            .ok_or_else(|| SourceError::Parse(format!("episode {} has no parent series", episode_id)))?;
        let anidb = value.get("AniDB").cloned().unwrap_or(Value::Null);
        let number = i32_field(&anidb, "EpisodeNumber").unwrap_or(0);

        Ok(Some(ShokoEpisodeInfo {
            episode_id,
            series_id,
            series_title: self.series_title(series_id).await?,
            episode_title: str_field(&value, "Name").unwrap_or_else(|| format!("Episode {}", number)),
            episode_number: number,
            episode_type: str_field(&anidb, "Type")
                .map(|t| episode_type(&t))
                .unwrap_or(EpisodeType::Unknown),
            video_count: u64_field(&value, "Size").unwrap_or(0) as usize,
        }))
    }
}

#[async_trait]
impl ShokoUserData for ShokoHttpClient {
    async fn list_users(&self) -> Result<Vec<ShokoUser>, SourceError> {
        let value = self.get("User").await?;
        let users = value
            .as_array()
            .map(|users| {
                users
                    .iter()
                    .filter_map(|u| {
                        Some(ShokoUser {
                            id: u64_field(u, "ID")?,
                            username: str_field(u, "Username").unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(users)
    }

    async fn is_watched(&self, user_id: u64, episode_id: u64) -> Result<bool, SourceError> {
        let value = self.get(&format!("Episode/{}", episode_id)).await?;
        let watched = value.get("Watched").map(|w| !w.is_null()).unwrap_or(false);
        debug!("Shoko episode {} watched by user {}: {}", episode_id, user_id, watched);
        Ok(watched)
    }

    async fn set_watched(
        &self,
        user_id: u64,
        episode_id: u64,
        _watched_at: Option<DateTime<Utc>>,
    ) -> Result<(), SourceError> {
        self.request(Method::POST, &format!("Episode/{}/Watched/true", episode_id))
            .await?
            .ok_or_else(|| SourceError::NotFound(format!("episode {}", episode_id)))?;
        info!("Marked Shoko episode {} watched for user {}", episode_id, user_id);
        Ok(())
    }
}
