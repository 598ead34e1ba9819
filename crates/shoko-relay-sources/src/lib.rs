pub mod error;
pub mod factory;
pub mod plex;
pub mod shoko;
pub mod snapshot;
pub mod traits;

pub use error::SourceError;
pub use factory::SourceFactory;
pub use plex::{PlexHttpClient, PlexSource};
pub use shoko::ShokoHttpClient;
pub use snapshot::SnapshotLibrary;
pub use traits::{PlexWatchedSource, ShokoLibrary, ShokoUserData};
