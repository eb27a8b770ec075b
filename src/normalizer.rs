//! Classification of music-service status documents.
//!
//! The service does not commit to a response schema, so every field is looked
//! up through an ordered list of JSON pointers and, failing that, a bounded
//! depth-first scan of the whole document. Nothing here performs I/O.

use reqwest::Url;
use serde_json::{Map, Value};
use crate::models::{StatusSnapshot, TaskStatus};

const STATUS_PATHS: &[&str] = &["/data/status", "/status", "/data/data/status"];

// Tokens are compared upper-cased.
const SUCCESS_TOKENS: &[&str] = &["SUCCESS", "FIRST_SUCCESS", "FINAL_SUCCESS", "COMPLETE", "FINISHED"];
const FAILURE_TOKENS: &[&str] = &[
  "CREATE_TASK_FAILED",
  "GENERATE_AUDIO_FAILED",
  "CALLBACK_EXCEPTION",
  "SENSITIVE_WORD_ERROR",
  "FAILED",
  "ERROR",
];
const QUEUED_TOKENS: &[&str] = &["PENDING", "QUEUED"];
const IN_PROGRESS_TOKENS: &[&str] = &["TEXT_SUCCESS", "GENERATING", "IN_PROGRESS", "RUNNING"];

const PREFERRED_AUDIO_KEYS: &[&str] = &["audioUrl", "sourceAudioUrl"];
const AUDIO_KEYS: &[&str] = &["audioUrl", "sourceAudioUrl", "streamAudioUrl", "sourceStreamAudioUrl"];
const AUDIO_URL_PATHS: &[&str] = &[
  "/data/response/sunoData/0/audioUrl",
  "/data/response/sunoData/0/sourceAudioUrl",
  "/data/audioUrl",
  "/data/sunoData/0/audioUrl",
  "/sunoData/0/audioUrl",
  "/results/0/audioUrl",
];
const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".m4a", ".flac", ".ogg", ".aac"];

const TASK_ID_KEY: &str = "taskId";
const TASK_ID_PATHS: &[&str] = &["/data/taskId", "/taskId"];

const MAX_SCAN_DEPTH: usize = 32;
const MAX_SCAN_NODES: usize = 10_000;

/// Classifies one status response. The result URL is only looked up when the
/// task reports success.
pub fn classify(raw: &Value) -> StatusSnapshot {
  let raw_status = extract_status(raw);
  let status = raw_status
    .as_deref()
    .map(status_from_token)
    .unwrap_or(TaskStatus::Unknown);
  let result_url = match status {
    TaskStatus::Succeeded => find_audio_url(raw),
    _ => None,
  };

  StatusSnapshot {
    status,
    raw_status,
    result_url,
    raw: raw.clone(),
  }
}

pub fn extract_status(raw: &Value) -> Option<String> {
  first_present(raw, STATUS_PATHS).map(token_text)
}

pub fn status_from_token(token: &str) -> TaskStatus {
  let token = token.trim().to_ascii_uppercase();
  let in_set = |set: &[&str]| set.contains(&token.as_str());

  if in_set(SUCCESS_TOKENS) {
    TaskStatus::Succeeded
  } else if in_set(FAILURE_TOKENS) {
    TaskStatus::Failed
  } else if in_set(QUEUED_TOKENS) {
    TaskStatus::Queued
  } else if in_set(IN_PROGRESS_TOKENS) {
    TaskStatus::InProgress
  } else {
    TaskStatus::Unknown
  }
}

/// Finds the downloadable audio URL: direct top-level keys first, then the
/// known nested locations, then a scan of the whole document.
pub fn find_audio_url(raw: &Value) -> Option<String> {
  if let Some(url) = raw.as_object().and_then(direct_audio_url) {
    return Some(url.to_string());
  }

  let nested = AUDIO_URL_PATHS
    .iter()
    .filter_map(|path| raw.pointer(path).and_then(Value::as_str))
    .find(|candidate| is_http_url(candidate));
  if let Some(url) = nested {
    return Some(url.to_string());
  }

  scan(raw, |node| node.as_object().and_then(audio_url_in_object))
    .or_else(|| scan(raw, |node| node.as_str().filter(|s| is_http_url(s) && has_audio_extension(s))))
    .or_else(|| scan(raw, |node| node.as_str().filter(|s| is_http_url(s))))
    .map(str::to_string)
}

/// Pulls the task identifier out of a submit response.
pub fn extract_task_id(raw: &Value) -> Option<String> {
  TASK_ID_PATHS
    .iter()
    .filter_map(|path| raw.pointer(path))
    .find_map(non_empty_id)
    .or_else(|| {
      scan(raw, |node| {
        node.as_object()
          .and_then(|obj| obj.get(TASK_ID_KEY))
          .and_then(non_empty_id)
      })
    })
}

/// Every `(key, url)` pair in the document, for diagnosing responses where no
/// audio URL could be chosen.
pub fn collect_urls(raw: &Value) -> Vec<(String, String)> {
  let mut found = Vec::new();
  scan(raw, |node| {
    if let Some(obj) = node.as_object() {
      for (key, value) in obj {
        if let Some(url) = value.as_str().filter(|s| is_http_url(s)) {
          found.push((key.clone(), url.to_string()));
        }
      }
    }
    None::<()>
  });
  found
}

fn first_present<'a>(raw: &'a Value, paths: &[&str]) -> Option<&'a Value> {
  paths
    .iter()
    .filter_map(|path| raw.pointer(path))
    .find(|value| !value.is_null())
}

fn token_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.trim().to_string(),
    other => other.to_string(),
  }
}

fn non_empty_id(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn direct_audio_url(obj: &Map<String, Value>) -> Option<&str> {
  let url_at = |key: &&str| obj.get(*key).and_then(Value::as_str).filter(|s| is_http_url(s));

  PREFERRED_AUDIO_KEYS
    .iter()
    .filter_map(url_at)
    .find(|url| has_audio_extension(url))
    .or_else(|| AUDIO_KEYS.iter().find_map(url_at))
}

fn audio_url_in_object(obj: &Map<String, Value>) -> Option<&str> {
  direct_audio_url(obj).or_else(|| {
    obj.iter()
      .filter(|(key, _)| key.to_ascii_lowercase().contains("audiourl"))
      .filter_map(|(_, value)| value.as_str())
      .find(|s| is_http_url(s))
  })
}

fn is_http_url(candidate: &str) -> bool {
  Url::parse(candidate)
    .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
    .unwrap_or(false)
}

fn has_audio_extension(candidate: &str) -> bool {
  Url::parse(candidate)
    .map(|url| {
      let path = url.path().to_ascii_lowercase();
      AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    })
    .unwrap_or(false)
}

/// Depth-first walk in document order, stopping at the first node `visit`
/// accepts. Bounded in depth and in total nodes visited.
fn scan<'a, T>(root: &'a Value, mut visit: impl FnMut(&'a Value) -> Option<T>) -> Option<T> {
  let mut stack = vec![(root, 0usize)];
  let mut visited = 0usize;

  while let Some((node, depth)) = stack.pop() {
    visited += 1;
    if visited > MAX_SCAN_NODES {
      break;
    }
    if let Some(hit) = visit(node) {
      return Some(hit);
    }
    if depth >= MAX_SCAN_DEPTH {
      continue;
    }
    match node {
      Value::Object(obj) => stack.extend(obj.values().rev().map(|child| (child, depth + 1))),
      Value::Array(items) => stack.extend(items.iter().rev().map(|child| (child, depth + 1))),
      _ => {}
    }
  }
  None
}
