pub mod coords;
pub mod episode;
pub mod file_mapping;
pub mod series;
pub mod tmdb;
pub mod video;
pub mod watched;

pub use coords::{PlexCoords, PlexSeason};
pub use episode::{Episode, EpisodeType, TypedEpisode};
pub use file_mapping::FileMapping;
pub use series::Series;
pub use tmdb::{TmdbEpisode, TmdbOrdering};
pub use video::{CrossReference, Video};
pub use watched::{PlexUserKind, PlexWatchedItem, ShokoEpisodeInfo, ShokoUser, SkipReason, WatchRecord, WatchedAuditRecord};
