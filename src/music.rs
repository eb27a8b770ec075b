use std::path::{Path, PathBuf};
use std::time::Duration;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use crate::config::{PollSettings, SunoSettings};
use crate::downloader::Downloader;
use crate::error::{GenerationError, GenerationResult};
use crate::models::{DownloadResult, GenerationTask, SubmissionPayload};
use crate::normalizer::extract_task_id;
use crate::poller::{StatusSource, TaskMonitor};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the music-synthesis service.
#[derive(Debug, Clone)]
pub struct SunoApi {
  client: Client,
  settings: SunoSettings,
}

impl SunoApi {
  pub fn new(client: Client, settings: SunoSettings) -> Self {
    Self { client, settings }
  }

  pub fn payload(&self, title: &str, lyrics: &str, style: &str) -> SubmissionPayload {
    let custom = self.settings.custom_mode;
    SubmissionPayload {
      prompt: lyrics.to_string(),
      style: if custom { style.to_string() } else { String::new() },
      title: if custom { title.to_string() } else { String::new() },
      custom_mode: custom,
      instrumental: self.settings.instrumental,
      model: self.settings.model.clone(),
      callback_url: self.settings.callback_url.clone(),
    }
  }

  pub async fn submit(&self, payload: SubmissionPayload) -> GenerationResult<GenerationTask> {
    let url = format!("{}/generate", self.settings.base_url);
    info!("Submitting \"{}\" to {}", payload.title, url);
    debug!(payload = ?payload, "submit payload");

    let response = self.client
      .post(&url)
      .bearer_auth(&self.settings.api_key)
      .timeout(REQUEST_TIMEOUT)
      .json(&payload)
      .send()
      .await
      .map_err(|e| GenerationError::Submission(format!("could not reach {url}: {e}")))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
      error!("Submit returned {}: {}", status, body);
      return Err(GenerationError::Submission(describe_rejection(status, &body)));
    }

    let document: Value = serde_json::from_str(&body)
      .map_err(|e| GenerationError::Submission(format!("response is not JSON: {e}")))?;
    debug!(response = %document, "submit response");

    match extract_task_id(&document) {
      Some(id) => {
        info!("Music generation started with task ID: {}", id);
        Ok(GenerationTask::submitted(id, payload))
      }
      None if document.get("code").is_some() => Err(GenerationError::Submission(describe_rejection(status, &body))),
      None => Err(GenerationError::Submission(format!("no task ID in response: {document}"))),
    }
  }
}

impl StatusSource for SunoApi {
  async fn fetch_status(&self, task_id: &str) -> GenerationResult<Value> {
    for url in self.settings.status_urls(task_id) {
      debug!("Checking status at: {}", url);
      let response = match self.client
        .get(&url)
        .bearer_auth(&self.settings.api_key)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
      {
        Ok(response) => response,
        Err(e) => {
          warn!("Error checking endpoint {}: {}", url, e);
          continue;
        }
      };
      if !response.status().is_success() {
        debug!("Endpoint {} answered {}", url, response.status());
        continue;
      }
      match response.json::<Value>().await {
        Ok(document) => return Ok(document),
        Err(e) => warn!("Endpoint {} returned unreadable body: {}", url, e),
      }
    }
    Err(GenerationError::StatusUnavailable(task_id.to_string()))
  }
}

/// Submit, monitor and download: lyrics in, local audio file out.
pub struct MusicGenerator {
  api: SunoApi,
  downloader: Downloader,
  poll: PollSettings,
}

impl MusicGenerator {
  pub fn new(api: SunoApi, downloader: Downloader, poll: PollSettings) -> Self {
    Self { api, downloader, poll }
  }

  pub async fn produce_audio(
    &self,
    title: &str,
    lyrics: &str,
    style: &str,
    output_path: &Path,
  ) -> GenerationResult<PathBuf> {
    let payload = self.api.payload(title, lyrics, style);
    let task = self.api.submit(payload).await?;
    remember_task_id(&task, output_path).await;
    let result = self.monitor(&task, output_path).await?;
    Ok(result.path)
  }

  /// Monitors an already-submitted task.
  pub async fn monitor(&self, task: &GenerationTask, output_path: &Path) -> GenerationResult<DownloadResult> {
    if let Some(dir) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(dir).await?;
    }
    TaskMonitor::new(&self.api, &self.downloader, self.poll)
      .monitor(task, output_path)
      .await
  }
}

async fn remember_task_id(task: &GenerationTask, output_path: &Path) {
  let dir = output_path.parent().unwrap_or(Path::new("."));
  let marker = dir.join("last_task_id.txt");
  let write = async {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&marker, &task.id).await
  };
  if let Err(e) = write.await {
    warn!("Could not record task ID in {}: {}", marker.display(), e);
  }
}

fn describe_rejection(status: StatusCode, body: &str) -> String {
  let Ok(document) = serde_json::from_str::<Value>(body) else {
    return format!("service answered {status}: {body}");
  };
  let code = document.get("code").and_then(Value::as_i64);
  let msg = document.get("msg").and_then(Value::as_str).unwrap_or("no message");
  let hint = match code.unwrap_or(i64::from(status.as_u16())) {
    401 => " (authentication failed, check SUNO_API_KEY)",
    429 => " (insufficient credits)",
    413 => " (theme or lyrics too long)",
    _ => "",
  };
  match code {
    Some(code) => format!("service answered {status} with code {code}: {msg}{hint}"),
    None => format!("service answered {status}: {msg}{hint}"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn payload_uses_mode_flags() {
    let mut settings = SunoSettings::new("key", "http://localhost");
    let api = SunoApi::new(Client::new(), settings.clone());
    let payload = api.payload("Night Drive", "la la", "synthwave");
    assert_eq!(payload.title, "Night Drive");
    assert_eq!(payload.style, "synthwave");
    assert!(payload.custom_mode);
    assert!(!payload.instrumental);
    assert_eq!(payload.model, "V3_5");

    settings.custom_mode = false;
    let api = SunoApi::new(Client::new(), settings);
    let payload = api.payload("Night Drive", "la la", "synthwave");
    assert!(payload.title.is_empty());
    assert!(payload.style.is_empty());
    assert_eq!(payload.prompt, "la la");
  }

  #[test]
  fn payload_serializes_with_service_field_names() {
    let api = SunoApi::new(Client::new(), SunoSettings::new("key", "http://localhost"));
    let json = serde_json::to_value(api.payload("t", "p", "s")).unwrap();
    for field in ["prompt", "style", "title", "customMode", "instrumental", "model", "callBackUrl"] {
      assert!(json.get(field).is_some(), "missing {field}");
    }
  }

  #[test]
  fn rejection_messages_carry_hints() {
    let msg = describe_rejection(StatusCode::OK, r#"{"code": 429, "msg": "credits exhausted"}"#);
    assert!(msg.contains("insufficient credits"), "{msg}");
    let msg = describe_rejection(StatusCode::UNAUTHORIZED, "not json");
    assert!(msg.contains("not json"), "{msg}");
    let msg = describe_rejection(StatusCode::PAYLOAD_TOO_LARGE, r#"{"msg": "too long"}"#);
    assert!(msg.contains("too long") && msg.contains("lyrics too long"), "{msg}");
  }
}
