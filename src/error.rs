use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Failures surfaced by a generation session.
///
/// Only `Submission`, `MonitorTimeout`, `Monitor` and `Download` leave the
/// music core; `StatusUnavailable` is absorbed by the poller.
#[derive(Error, Debug)]
pub enum GenerationError {
  #[error("music submission failed: {0}")]
  Submission(String),

  #[error("task {task_id} still running after {checks} checks ({waited:?} waited)")]
  MonitorTimeout {
    task_id: String,
    checks: u32,
    waited: Duration,
  },

  #[error("task {task_id} failed: {reason}")]
  Monitor {
    task_id: String,
    reason: String,
  },

  #[error("download of {url} to {} failed after {attempts} attempts: {last_error}", path.display())]
  Download {
    url: String,
    path: PathBuf,
    attempts: u32,
    last_error: String,
  },

  #[error("no status endpoint answered for task {0}")]
  StatusUnavailable(String),

  #[error("lyrics generation failed: {0}")]
  Lyrics(String),

  #[error("image generation failed: {0}")]
  Images(String),

  #[error(transparent)]
  Http(#[from] reqwest::Error),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl GenerationError {
  pub fn monitor(task_id: &str, reason: impl Into<String>) -> Self {
    Self::Monitor {
      task_id: task_id.to_string(),
      reason: reason.into(),
    }
  }
}
