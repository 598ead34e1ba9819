pub mod clear;
pub mod config;
pub mod context;
pub mod daemon;
pub mod export;
pub mod map;
pub mod prompts;
pub mod sync_watched;
pub mod vfs;
