pub mod client;
mod parse;

pub use client::ShokoHttpClient;
