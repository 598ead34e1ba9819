use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub plex: Option<PlexConfig>,
    #[serde(default)]
    pub shoko: Option<ShokoConfig>,
    #[serde(default)]
    pub vfs: VfsConfig,
    #[serde(default)]
    pub watched_sync: WatchedSyncConfig,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

/// Where the preferred TMDB ordering of a series comes from
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderingSource {
    /// Use the ordering selected on the series in Shoko
    Series,
    /// Always use TMDB's default ordering
    Default,
}

/// What to do with a file linked to episodes of different types when none of its
/// cross-references point at one of the candidates
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousTypePolicy {
    /// Keep every candidate episode
    Retain,
    /// Drop the file from the layout
    Drop,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MappingConfig {
    /// Number episodes using TMDB instead of AniDB
    #[serde(default)]
    pub tmdb_episode_numbering: bool,
    #[serde(default = "default_ordering_source")]
    pub ordering_source: OrderingSource,
    #[serde(default = "default_ambiguous_type_policy")]
    pub ambiguous_type_policy: AmbiguousTypePolicy,
}

fn default_ordering_source() -> OrderingSource {
    OrderingSource::Series
}

fn default_ambiguous_type_policy() -> AmbiguousTypePolicy {
    AmbiguousTypePolicy::Retain
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            tmdb_episode_numbering: false,
            ordering_source: default_ordering_source(),
            ambiguous_type_policy: default_ambiguous_type_policy(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlexConfig {
    pub enabled: bool,
    pub server_url: String,
    /// Key of the library section that holds the Shoko Relay shows
    pub library_section: String,
    /// Extra Plex users (managed/home users) whose watched state is synced after the admin.
    /// Their tokens live in the credential store.
    #[serde(default)]
    pub extra_users: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ShokoConfig {
    pub enabled: bool,
    pub server_url: String,
}

/// Rewrites a path prefix as seen by Shoko into the same location as seen locally
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VfsConfig {
    /// Root of the virtual file system; VFS commands are unavailable when unset
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Remove a series folder before relinking it
    #[serde(default = "default_true")]
    pub clean: bool,
    #[serde(default)]
    pub path_mappings: Vec<PathMapping>,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            root: None,
            clean: default_true(),
            path_mappings: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchedSyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Evaluate everything but never write to Shoko
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub include_extra_users: bool,
    /// Only look at items Plex reports as viewed within this many hours
    #[serde(default)]
    pub lookback_hours: Option<u32>,
}

impl Default for WatchedSyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            dry_run: false,
            include_extra_users: default_true(),
            lookback_hours: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

fn default_true() -> bool {
    true
}

fn default_schedule() -> String {
    "0 0 */6 * * *".to_string() // Every 6 hours (sec min hour dom mon dow)
}

fn default_timezone() -> String {
    std::env::var("TZ").unwrap_or_else(|_| "UTC".to_string())
}

pub fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        schedule: default_schedule(),
        timezone: default_timezone(),
        run_on_startup: default_true(),
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(plex) = &self.plex {
            if plex.enabled {
                if plex.server_url.trim().is_empty() {
                    return Err(anyhow::anyhow!("Plex is enabled but server_url is not configured"));
                }
                if plex.library_section.trim().is_empty() {
                    return Err(anyhow::anyhow!("Plex is enabled but library_section is not configured"));
                }
                let mut seen = std::collections::HashSet::new();
                for user in &plex.extra_users {
                    if user.trim().is_empty() {
                        return Err(anyhow::anyhow!("Plex extra_users contains an empty name"));
                    }
                    if !seen.insert(user.to_lowercase()) {
                        return Err(anyhow::anyhow!("Plex extra user '{}' is listed twice", user));
                    }
                }
            }
        }

        if let Some(shoko) = &self.shoko {
            if shoko.enabled && shoko.server_url.trim().is_empty() {
                return Err(anyhow::anyhow!("Shoko is enabled but server_url is not configured"));
            }
        }

        if let Some(root) = &self.vfs.root {
            if !root.is_absolute() {
                return Err(anyhow::anyhow!("vfs.root must be an absolute path: {}", root.display()));
            }
        }
        for mapping in &self.vfs.path_mappings {
            if mapping.from.is_empty() {
                return Err(anyhow::anyhow!("vfs.path_mappings entries need a non-empty 'from'"));
            }
        }

        if let Some(scheduler) = &self.scheduler {
            let fields = scheduler.schedule.split_whitespace().count();
            if !(5..=7).contains(&fields) {
                return Err(anyhow::anyhow!("Invalid cron schedule: {}", scheduler.schedule));
            }
        }

        Ok(())
    }

    pub fn is_plex_configured(&self) -> bool {
        self.plex
            .as_ref()
            .map(|p| p.enabled && !p.server_url.is_empty() && !p.library_section.is_empty())
            .unwrap_or(false)
    }

    pub fn is_shoko_configured(&self) -> bool {
        self.shoko
            .as_ref()
            .map(|s| s.enabled && !s.server_url.is_empty())
            .unwrap_or(false)
    }

    /// Get list of configured and enabled services
    pub fn get_configured_services(&self) -> Vec<String> {
        let mut services = Vec::new();
        if self.is_shoko_configured() {
            services.push("shoko".to_string());
        }
        if self.is_plex_configured() {
            services.push("plex".to_string());
        }
        services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn plex_config() -> PlexConfig {
        PlexConfig {
            enabled: true,
            server_url: "http://127.0.0.1:32400".to_string(),
            library_section: "3".to_string(),
            extra_users: vec!["kid".to_string()],
        }
    }

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let config = Config {
            mapping: MappingConfig {
                tmdb_episode_numbering: true,
                ..MappingConfig::default()
            },
            plex: Some(plex_config()),
            shoko: Some(ShokoConfig {
                enabled: true,
                server_url: "http://127.0.0.1:8111".to_string(),
            }),
            vfs: VfsConfig::default(),
            watched_sync: WatchedSyncConfig::default(),
            scheduler: None,
        };

        let path = file.path().to_path_buf();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert!(loaded.mapping.tmdb_episode_numbering);
        assert_eq!(loaded.mapping.ordering_source, OrderingSource::Series);
        assert_eq!(loaded.plex.as_ref().unwrap().library_section, "3");
        assert_eq!(loaded.plex.as_ref().unwrap().extra_users, vec!["kid".to_string()]);
        assert_eq!(loaded.get_configured_services(), vec!["shoko".to_string(), "plex".to_string()]);
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(!config.mapping.tmdb_episode_numbering);
        assert_eq!(config.mapping.ambiguous_type_policy, AmbiguousTypePolicy::Retain);
        assert!(config.vfs.clean);
        assert!(config.watched_sync.enabled);
        assert!(!config.watched_sync.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_mapping_section() {
        let config: Config = toml::from_str(
            r#"
            [mapping]
            tmdb_episode_numbering = true
            ordering_source = "default"
            ambiguous_type_policy = "drop"
            "#,
        )
        .unwrap();
        assert!(config.mapping.tmdb_episode_numbering);
        assert_eq!(config.mapping.ordering_source, OrderingSource::Default);
        assert_eq!(config.mapping.ambiguous_type_policy, AmbiguousTypePolicy::Drop);
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config {
            plex: Some(PlexConfig {
                library_section: String::new(),
                ..plex_config()
            }),
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(!config.is_plex_configured());

        config.plex = Some(PlexConfig {
            extra_users: vec!["kid".to_string(), "Kid".to_string()],
            ..plex_config()
        });
        assert!(config.validate().is_err());

        config.plex = Some(plex_config());
        assert!(config.validate().is_ok());
        assert!(config.is_plex_configured());

        config.vfs.root = Some(PathBuf::from("relative/vfs"));
        assert!(config.validate().is_err());
        config.vfs.root = None;

        config.scheduler = Some(SchedulerConfig {
            schedule: "every hour".to_string(),
            ..default_scheduler_config()
        });
        assert!(config.validate().is_err());
    }
}
