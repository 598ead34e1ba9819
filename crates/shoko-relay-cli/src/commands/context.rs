use color_eyre::eyre::eyre;
use color_eyre::Result;
use shoko_relay_config::{Config, CredentialStore, PathManager};
use shoko_relay_sources::{ShokoHttpClient, ShokoLibrary, ShokoUserData, SnapshotLibrary, SourceFactory};
use std::path::PathBuf;
use tracing::{debug, info};

/// Paths, config and credentials as loaded at the start of a command
pub struct AppContext {
    pub paths: PathManager,
    pub config: Config,
    pub credentials: CredentialStore,
}

impl AppContext {
    /// Missing config or credential files load as empty defaults
    pub fn load() -> Result<Self> {
        let paths = PathManager::default();
        let config_file = paths.config_file();

        let config = if config_file.exists() {
            let config = Config::load_from_file(&config_file)
                .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
            config
                .validate()
                .map_err(|e| eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
            config
        } else {
            debug!("No config file at {}, using defaults", config_file.display());
            Config::default()
        };

        let credentials_file = paths.credentials_file();
        let mut credentials = CredentialStore::new(credentials_file.clone());
        credentials
            .load()
            .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;

        Ok(Self {
            paths,
            config,
            credentials,
        })
    }

    pub fn factory(&self) -> SourceFactory<'_> {
        SourceFactory::new(&self.config, &self.credentials)
    }
}

/// Where series graphs and Shoko watch state come from
pub enum Library {
    Shoko(ShokoHttpClient),
    Snapshot(SnapshotLibrary),
}

impl Library {
    pub fn open(ctx: &AppContext, snapshot: Option<PathBuf>) -> Result<Self> {
        match snapshot {
            Some(dir) => {
                info!("Using snapshot library at {}", dir.display());
                Ok(Library::Snapshot(SnapshotLibrary::load_dir(&dir)?))
            }
            None => Ok(Library::Shoko(ctx.factory().shoko().map_err(|e| {
                eyre!("{}. Run 'shoko-relay config shoko' or pass --snapshot <DIR>", e)
            })?)),
        }
    }

    pub fn catalog(&self) -> &dyn ShokoLibrary {
        match self {
            Library::Shoko(client) => client,
            Library::Snapshot(snapshot) => snapshot,
        }
    }

    pub fn user_data(&self) -> &dyn ShokoUserData {
        match self {
            Library::Shoko(client) => client,
            Library::Snapshot(snapshot) => snapshot,
        }
    }

    /// Snapshot watch state lives in memory until written back
    pub async fn persist(&self) -> Result<()> {
        if let Library::Snapshot(snapshot) = self {
            snapshot.persist_watched().await?;
        }
        Ok(())
    }

    /// The requested ids, or every series in the library when none were given
    pub async fn series_ids(&self, requested: Vec<u64>) -> Result<Vec<u64>> {
        if !requested.is_empty() {
            return Ok(requested);
        }
        Ok(self.catalog().list_series_ids().await?)
    }
}
