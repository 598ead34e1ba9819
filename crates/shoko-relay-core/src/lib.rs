pub mod map_helper;
pub mod metadata;
pub mod ordering_cache;
pub mod plex_mapping;
pub mod rating_keys;
pub mod reports;
pub mod series_file_data;
pub mod vfs;
pub mod watched_sync;

pub use map_helper::{FileMappingBuilder, SeriesTrace, VideoOutcome, VideoTrace};
pub use ordering_cache::OrderingCache;
pub use plex_mapping::CoordinateResolver;
pub use rating_keys::{episode_id_from_guid, RatingKey};
pub use reports::ReportStore;
pub use series_file_data::SeriesFileData;
pub use vfs::{VfsApplyReport, VfsPlan};
pub use watched_sync::{WatchedSync, WatchedSyncOptions, WatchedSyncReport};
