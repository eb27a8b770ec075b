use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use anyhow::{anyhow, Result};
use futures::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_retry::Retry;
use tracing::{info, warn};
use crate::config::RetryPolicy;
use crate::error::{GenerationError, GenerationResult};
use crate::models::DownloadResult;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Waits between consecutive attempts: `base`, `2 * base`, `4 * base`, ...
pub fn backoff_schedule(policy: RetryPolicy) -> impl Iterator<Item = Duration> {
  let retries = policy.max_attempts.max(1) - 1;
  (0..retries).map(move |i| policy.base_delay.saturating_mul(2u32.saturating_pow(i)))
}

#[derive(Debug, Clone)]
pub struct Downloader {
  client: Client,
  policy: RetryPolicy,
}

impl Downloader {
  pub fn new(client: Client, policy: RetryPolicy) -> Self {
    Self { client, policy }
  }

  /// Streams `url` into `destination`, retrying with exponential backoff
  /// until a non-empty file lands or the attempts run out.
  pub async fn download(&self, url: &str, destination: &Path) -> GenerationResult<DownloadResult> {
    let max_attempts = self.policy.max_attempts.max(1);
    let attempts = AtomicU32::new(0);

    let outcome = Retry::spawn(backoff_schedule(self.policy), || {
      let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
      async move {
        info!("Download attempt {}/{} from {}", attempt, max_attempts, url);
        let result = self.fetch_once(url, destination).await;
        if let Err(e) = &result {
          warn!("Download attempt {} failed: {:#}", attempt, e);
        }
        result
      }
    })
      .await;

    let attempts = attempts.load(Ordering::SeqCst);
    match outcome {
      Ok(bytes) => {
        info!("Saved {} bytes to {}", bytes, destination.display());
        Ok(DownloadResult {
          path: destination.to_path_buf(),
          bytes,
          attempts,
        })
      }
      Err(e) => {
        if let Err(cleanup) = tokio::fs::remove_file(destination).await {
          if cleanup.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove partial download {}: {}", destination.display(), cleanup);
          }
        }
        Err(GenerationError::Download {
          url: url.to_string(),
          path: destination.to_path_buf(),
          attempts,
          last_error: format!("{e:#}"),
        })
      }
    }
  }

  async fn fetch_once(&self, url: &str, destination: &Path) -> Result<u64> {
    let response = self.client
      .get(url)
      .timeout(DOWNLOAD_TIMEOUT)
      .send()
      .await?
      .error_for_status()?;

    if let Some(size) = response.content_length() {
      info!("File size: {:.2} MB", size as f64 / 1024.0 / 1024.0);
    }

    let mut file = File::create(destination).await?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
      file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    drop(file);

    let written = tokio::fs::metadata(destination).await.map(|m| m.len()).unwrap_or(0);
    if written == 0 {
      return Err(anyhow!("downloaded file is empty"));
    }
    Ok(written)
  }
}
