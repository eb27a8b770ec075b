pub mod config;
pub mod downloader;
pub mod error;
pub mod images;
pub mod jobs;
pub mod lyrics;
pub mod models;
pub mod music;
pub mod normalizer;
pub mod pipeline;
pub mod poller;
pub mod progress;
pub mod routes;

use std::time::Duration;

/// Shared HTTP client for every remote service.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
  reqwest::Client::builder()
    .connect_timeout(Duration::from_secs(30))
    .user_agent(concat!("tunesmith/", env!("CARGO_PKG_VERSION")))
    .build()
}
