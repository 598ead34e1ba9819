use anyhow::Result;
use reqwest::Client;
use tracing::debug;

const PLEX_TV_BASE_URL: &str = "https://plex.tv";

/// Verify that a token is valid by making an API call
pub async fn verify_token(token: &str) -> Result<bool> {
    let client = Client::new();
    let url = format!("{}/api/v2/user", PLEX_TV_BASE_URL);

    let response = client
        .get(&url)
        .header("X-Plex-Token", token)
        .header("Accept", "application/json")
        .send()
        .await?;

    debug!("Plex token check returned {}", response.status());
    Ok(response.status().is_success())
}
