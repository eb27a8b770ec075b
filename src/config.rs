use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use anyhow::{Context, Result};

pub const DEFAULT_SUNO_BASE_URL: &str = "https://apibox.erweima.ai/api/v1";

pub const DEFAULT_STATUS_ENDPOINTS: &[&str] = &[
  "{base}/generate/record-info?taskId={task_id}",
  "{base}/generate/status?taskId={task_id}",
  "{base}/generate/result?taskId={task_id}",
  "{base}/task/{task_id}",
  "{base}/generate/{task_id}",
];

#[derive(Debug, Clone)]
pub struct Config {
  pub suno: SunoSettings,
  pub poll: PollSettings,
  pub download: RetryPolicy,
  pub lyrics: LyricsSettings,
  pub images: ImageSettings,
  pub server_port: u16,
  pub output_root: PathBuf,
  pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone)]
pub struct SunoSettings {
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub callback_url: String,
  pub custom_mode: bool,
  pub instrumental: bool,
  /// URL templates for status queries, tried in order. `{base}` and
  /// `{task_id}` are substituted.
  pub status_endpoints: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
  pub check_interval: Duration,
  pub max_checks: u32,
  /// Cap on the summed `check_interval` sleeps. Time spent waiting on status
  /// requests is not counted, so a run can last longer than this.
  pub max_total_wait: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  /// Wait before the second attempt; doubles after every further failure.
  pub base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct LyricsSettings {
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

#[derive(Debug, Clone)]
pub struct ImageSettings {
  pub api_key: String,
  pub base_url: String,
  pub size: String,
  pub delay: Duration,
}

impl Default for PollSettings {
  fn default() -> Self {
    Self {
      check_interval: Duration::from_secs(15),
      max_checks: 15,
      max_total_wait: Duration::from_secs(300),
    }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      base_delay: Duration::from_secs(1),
    }
  }
}

impl SunoSettings {
  /// Settings pointing at `base_url` with the stock model and endpoints.
  pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
    Self {
      api_key: api_key.into(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
      model: "V3_5".into(),
      callback_url: "https://example.com/callback".into(),
      custom_mode: true,
      instrumental: false,
      status_endpoints: DEFAULT_STATUS_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
    }
  }

  pub fn status_urls(&self, task_id: &str) -> Vec<String> {
    self.status_endpoints
      .iter()
      .map(|template| template.replace("{base}", &self.base_url).replace("{task_id}", task_id))
      .collect()
  }

  pub fn from_env() -> Result<Self> {
    let mut suno = Self::new(
      required("SUNO_API_KEY")?,
      env::var("SUNO_API_BASE_URL").unwrap_or_else(|_| DEFAULT_SUNO_BASE_URL.into()),
    );
    if let Ok(model) = env::var("SUNO_MODEL") {
      suno.model = model;
    }
    if let Ok(callback_url) = env::var("SUNO_CALLBACK_URL") {
      suno.callback_url = callback_url;
    }
    suno.instrumental = parsed("SUNO_INSTRUMENTAL", false)?;
    if let Ok(list) = env::var("SUNO_STATUS_ENDPOINTS") {
      suno.status_endpoints = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
      anyhow::ensure!(!suno.status_endpoints.is_empty(), "SUNO_STATUS_ENDPOINTS has no templates");
    }
    Ok(suno)
  }
}

impl PollSettings {
  pub fn from_env() -> Result<Self> {
    Ok(Self {
      check_interval: Duration::from_secs(parsed("POLL_INTERVAL_SECS", 15)?),
      max_checks: parsed("POLL_MAX_CHECKS", 15)?,
      max_total_wait: Duration::from_secs(parsed("POLL_MAX_WAIT_SECS", 300)?),
    })
  }
}

impl RetryPolicy {
  pub fn from_env() -> Result<Self> {
    Ok(Self {
      max_attempts: parsed("DOWNLOAD_MAX_ATTEMPTS", 5)?,
      base_delay: Duration::from_millis(parsed("DOWNLOAD_BACKOFF_MS", 1000)?),
    })
  }
}

impl Config {
  pub fn from_env() -> Result<Self> {
    Ok(Self {
      suno: SunoSettings::from_env()?,
      poll: PollSettings::from_env()?,
      download: RetryPolicy::from_env()?,
      lyrics: LyricsSettings {
        api_key: required("ANTHROPIC_API_KEY")?,
        base_url: env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| "https://api.anthropic.com".into()),
        model: env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| "claude-3-opus-20240229".into()),
      },
      images: ImageSettings {
        api_key: required("OPENAI_API_KEY")?,
        base_url: env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com".into()),
        size: env::var("IMAGE_SIZE").unwrap_or_else(|_| "1024x1024".into()),
        delay: Duration::from_millis(parsed("IMAGE_DELAY_MS", 2000)?),
      },
      server_port: parsed("SERVER_PORT", 5001)?,
      output_root: env::var("OUTPUT_ROOT")
        .unwrap_or_else(|_| "static/output".into())
        .into(),
      max_concurrent_jobs: parsed("MAX_CONCURRENT_JOBS", 4)?,
    })
  }
}

fn required(key: &str) -> Result<String> {
  env::var(key)
    .ok()
    .filter(|value| !value.trim().is_empty())
    .with_context(|| format!("{key} is not set; add it to the environment or .env"))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  match env::var(key) {
    Ok(raw) => raw
      .trim()
      .parse()
      .with_context(|| format!("invalid value for {key}: {raw:?}")),
    Err(_) => Ok(default),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_templates_are_rendered_in_order() {
    let suno = SunoSettings::new("key", "http://localhost:9000/api/v1/");
    let urls = suno.status_urls("abc");
    assert_eq!(urls[0], "http://localhost:9000/api/v1/generate/record-info?taskId=abc");
    assert_eq!(urls[3], "http://localhost:9000/api/v1/task/abc");
    assert_eq!(urls.len(), DEFAULT_STATUS_ENDPOINTS.len());
  }
}
