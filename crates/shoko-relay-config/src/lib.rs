pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{AmbiguousTypePolicy, Config, MappingConfig, OrderingSource, PathMapping, PlexConfig, SchedulerConfig, ShokoConfig, VfsConfig, WatchedSyncConfig, default_scheduler_config};
pub use credentials::CredentialStore;
pub use paths::{PathManager, container_base_path};
