//! Builds the configured Shoko and Plex clients

use crate::plex::PlexSource;
use crate::shoko::ShokoHttpClient;
use crate::SourceError;
use shoko_relay_config::{Config, CredentialStore};
use tracing::warn;

pub struct SourceFactory<'a> {
    config: &'a Config,
    credentials: &'a CredentialStore,
}

impl<'a> SourceFactory<'a> {
    pub fn new(config: &'a Config, credentials: &'a CredentialStore) -> Self {
        Self { config, credentials }
    }

    pub fn shoko(&self) -> Result<ShokoHttpClient, SourceError> {
        let shoko = self
            .config
            .shoko
            .as_ref()
            .filter(|s| s.enabled)
            .ok_or_else(|| SourceError::NotConfigured("shoko".to_string()))?;
        let api_key = self
            .credentials
            .get_shoko_api_key()
            .ok_or_else(|| SourceError::NotConfigured("shoko api key".to_string()))?;
        ShokoHttpClient::new(&shoko.server_url, api_key)
    }

    /// Admin first, then extra users in configured order. Extra users without a
    /// stored token are skipped with a warning.
    pub fn plex_sources(&self, include_extra_users: bool) -> Result<Vec<PlexSource>, SourceError> {
        let plex = self
            .config
            .plex
            .as_ref()
            .filter(|p| p.enabled)
            .ok_or_else(|| SourceError::NotConfigured("plex".to_string()))?;
        let token = self
            .credentials
            .get_plex_token()
            .ok_or_else(|| SourceError::NotConfigured("plex token".to_string()))?;

        let mut sources = vec![PlexSource::admin(&plex.server_url, token)?];
        if include_extra_users {
            for user in &plex.extra_users {
                match self.credentials.get_plex_user_token(user) {
                    Some(token) => sources.push(PlexSource::extra_user(user, &plex.server_url, token)?),
                    None => warn!("No Plex token stored for extra user '{}', skipping", user),
                }
            }
        }
        Ok(sources)
    }

    pub fn library_section(&self) -> Option<&str> {
        self.config.plex.as_ref().map(|p| p.library_section.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::PlexWatchedSource;
    use shoko_relay_config::{PlexConfig, ShokoConfig};
    use std::path::PathBuf;

    fn config() -> Config {
        Config {
            plex: Some(PlexConfig {
                enabled: true,
                server_url: "http://localhost:32400".to_string(),
                library_section: "3".to_string(),
                extra_users: vec!["Kid".to_string(), "Guest".to_string()],
            }),
            shoko: Some(ShokoConfig {
                enabled: true,
                server_url: "http://localhost:8111".to_string(),
            }),
            ..Config::default()
        }
    }

    #[test]
    fn test_plex_sources_order_and_missing_tokens() {
        let config = config();
        let mut credentials = CredentialStore::new(PathBuf::from("/tmp/unused"));
        credentials.set_plex_token("admin".to_string());
        credentials.set_plex_user_token("Guest", "guest".to_string());

        let factory = SourceFactory::new(&config, &credentials);
        let labels: Vec<String> = factory
            .plex_sources(true)
            .unwrap()
            .iter()
            .map(|s| s.user_label().to_string())
            .collect();
        assert_eq!(labels, vec!["admin", "Guest"]);
        assert_eq!(factory.plex_sources(false).unwrap().len(), 1);
        assert_eq!(factory.library_section(), Some("3"));
    }

    #[test]
    fn test_missing_credentials() {
        let config = config();
        let credentials = CredentialStore::new(PathBuf::from("/tmp/unused"));
        let factory = SourceFactory::new(&config, &credentials);
        assert!(matches!(factory.shoko(), Err(SourceError::NotConfigured(_))));
        assert!(matches!(factory.plex_sources(true), Err(SourceError::NotConfigured(_))));
    }
}
