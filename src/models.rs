use serde::{Serialize, Deserialize};
use serde_json::Value;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Body of the music-service submit request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
  pub prompt: String,
  pub style: String,
  pub title: String,
  pub custom_mode: bool,
  pub instrumental: bool,
  pub model: String,
  #[serde(rename = "callBackUrl")]
  pub callback_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationTask {
  pub id: String,
  pub payload: Option<SubmissionPayload>,
  pub created_at: DateTime<Utc>,
}

impl GenerationTask {
  pub fn submitted(id: String, payload: SubmissionPayload) -> Self {
    Self {
      id,
      payload: Some(payload),
      created_at: Utc::now(),
    }
  }

  /// A task submitted by an earlier run, known only by its identifier.
  pub fn resumed(id: String) -> Self {
    Self {
      id,
      payload: None,
      created_at: Utc::now(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
  Queued,
  InProgress,
  Succeeded,
  Failed,
  Unknown,
}

impl TaskStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
  }
}

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
  pub status: TaskStatus,
  /// Status token exactly as the service reported it.
  pub raw_status: Option<String>,
  pub result_url: Option<String>,
  pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
  pub path: PathBuf,
  pub bytes: u64,
  pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
  Running,
  Complete,
  Failed,
}

/// Web-facing view of one generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
  pub id: String,
  pub theme: String,
  pub style: String,
  pub verses: u8,
  pub has_chorus: bool,
  pub state: JobStatus,
  pub status: String,
  pub progress: u8,
  pub output_dir: PathBuf,
  pub audio_path: Option<String>,
  pub lyrics_path: Option<String>,
  pub image_paths: Vec<String>,
  pub error_message: Option<String>,
  pub error_details: Vec<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
