pub mod api;
pub mod auth;
pub mod client;

pub use api::{LibraryInfo, PlexHttpClient};
pub use auth::verify_token;
pub use client::PlexSource;
