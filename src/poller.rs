//! Submit → poll → terminal state machine for one music task.
//!
//! ```text
//! Submitted ─► Queued/InProgress ─┬─► Succeeded ─► download
//!        ▲             │          └─► Failed
//!        └── Unknown ◄─┘ (keep polling)
//! ```

use std::future::Future;
use std::path::Path;
use std::time::Duration;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use crate::config::PollSettings;
use crate::downloader::Downloader;
use crate::error::{GenerationError, GenerationResult};
use crate::models::{DownloadResult, GenerationTask, StatusSnapshot, TaskStatus};
use crate::normalizer::{classify, collect_urls};

/// Where status documents come from. A failed query is transient: the
/// monitor logs it and keeps polling.
pub trait StatusSource {
  fn fetch_status(&self, task_id: &str) -> impl Future<Output = GenerationResult<Value>> + Send;
}

pub struct TaskMonitor<'a, S> {
  source: &'a S,
  downloader: &'a Downloader,
  settings: PollSettings,
}

impl<'a, S> TaskMonitor<'a, S>
where
  S: StatusSource + Sync,
{
  pub fn new(source: &'a S, downloader: &'a Downloader, settings: PollSettings) -> Self {
    Self { source, downloader, settings }
  }

  /// Polls until the task reaches a terminal status or the budget runs out,
  /// then downloads the result to `destination`. The reported wait is the sum
  /// of the sleeps between checks, not elapsed time.
  pub async fn monitor(&self, task: &GenerationTask, destination: &Path) -> GenerationResult<DownloadResult> {
    let PollSettings { check_interval, max_checks, max_total_wait } = self.settings;
    let mut checks = 0u32;
    let mut waited = Duration::ZERO;
    info!("Monitoring task {} (saving to {})", task.id, destination.display());

    loop {
      info!("Check {}/{} for task {} (waited {:?})", checks + 1, max_checks, task.id, waited);

      match self.source.fetch_status(&task.id).await {
        Ok(raw) => {
          debug!(task_id = %task.id, response = %raw, "status response");
          let snapshot = classify(&raw);
          info!(
            "Task {} status: {:?} ({})",
            task.id,
            snapshot.status,
            snapshot.raw_status.as_deref().unwrap_or("none")
          );
          match snapshot.status {
            TaskStatus::Succeeded => return self.finish(task, snapshot, destination).await,
            TaskStatus::Failed => {
              let token = snapshot.raw_status.unwrap_or_default();
              return Err(GenerationError::monitor(&task.id, format!("service reported {token}")));
            }
            TaskStatus::Unknown => {
              warn!("Unrecognized status for task {}, continuing to wait", task.id);
            }
            TaskStatus::Queued | TaskStatus::InProgress => {}
          }
        }
        Err(e) => warn!("Could not retrieve status for task {}: {}", task.id, e),
      }

      sleep(check_interval).await;
      waited += check_interval;
      checks += 1;

      if waited >= max_total_wait || checks >= max_checks {
        warn!("Giving up on task {} after {} checks; it may still be processing", task.id, checks);
        return Err(GenerationError::MonitorTimeout {
          task_id: task.id.clone(),
          checks,
          waited,
        });
      }
    }
  }

  async fn finish(
    &self,
    task: &GenerationTask,
    snapshot: StatusSnapshot,
    destination: &Path,
  ) -> GenerationResult<DownloadResult> {
    let Some(url) = snapshot.result_url else {
      for (key, url) in collect_urls(&snapshot.raw) {
        debug!("Unused URL in response: {}: {}", key, url);
      }
      return Err(GenerationError::monitor(&task.id, "no result URL found"));
    };

    info!("Task {} complete, audio at {}", task.id, url);
    self.downloader.download(&url, destination).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RetryPolicy;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};

  struct Scripted<F> {
    respond: F,
    calls: AtomicU32,
  }

  impl<F> Scripted<F>
  where
    F: Fn(u32) -> GenerationResult<Value> + Sync,
  {
    fn new(respond: F) -> Self {
      Self { respond, calls: AtomicU32::new(0) }
    }

    fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl<F> StatusSource for Scripted<F>
  where
    F: Fn(u32) -> GenerationResult<Value> + Sync,
  {
    async fn fetch_status(&self, _task_id: &str) -> GenerationResult<Value> {
      let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
      (self.respond)(call)
    }
  }

  fn settings(max_checks: u32) -> PollSettings {
    PollSettings {
      check_interval: Duration::ZERO,
      max_checks,
      max_total_wait: Duration::from_secs(300),
    }
  }

  fn downloader() -> Downloader {
    Downloader::new(reqwest::Client::new(), RetryPolicy::default())
  }

  #[tokio::test]
  async fn times_out_after_max_checks() {
    let source = Scripted::new(|_| Ok(json!({"data": {"status": "GENERATING"}})));
    let downloader = downloader();
    let task = GenerationTask::resumed("t-1".into());

    let err = TaskMonitor::new(&source, &downloader, settings(3))
      .monitor(&task, Path::new("unused.mp3"))
      .await
      .unwrap_err();

    assert!(matches!(err, GenerationError::MonitorTimeout { checks: 3, .. }), "{err:?}");
    assert_eq!(source.calls(), 3);
  }

  #[tokio::test]
  async fn slept_time_budget_stops_polling() {
    // slow status replies do not count toward the budget
    let source = Scripted::new(|_| {
      std::thread::sleep(Duration::from_millis(20));
      Ok(json!({"status": "PENDING"}))
    });
    let downloader = downloader();
    let task = GenerationTask::resumed("t-2".into());
    let settings = PollSettings {
      check_interval: Duration::from_millis(5),
      max_checks: 100,
      max_total_wait: Duration::from_millis(10),
    };

    let err = TaskMonitor::new(&source, &downloader, settings)
      .monitor(&task, Path::new("unused.mp3"))
      .await
      .unwrap_err();

    match err {
      GenerationError::MonitorTimeout { checks, waited, .. } => {
        assert_eq!(checks, 2);
        assert_eq!(waited, Duration::from_millis(10));
      }
      other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(source.calls(), 2);
  }

  #[tokio::test]
  async fn remote_failure_ends_immediately() {
    let source = Scripted::new(|call| match call {
      1 => Ok(json!({"data": {"status": "PENDING"}})),
      _ => Ok(json!({"data": {"status": "SENSITIVE_WORD_ERROR"}})),
    });
    let downloader = downloader();
    let task = GenerationTask::resumed("t-3".into());

    let err = TaskMonitor::new(&source, &downloader, settings(10))
      .monitor(&task, Path::new("unused.mp3"))
      .await
      .unwrap_err();

    match err {
      GenerationError::Monitor { task_id, reason } => {
        assert_eq!(task_id, "t-3");
        assert!(reason.contains("SENSITIVE_WORD_ERROR"), "{reason}");
      }
      other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(source.calls(), 2);
  }

  #[tokio::test]
  async fn success_without_url_is_a_failure() {
    let source = Scripted::new(|_| Ok(json!({"data": {"status": "SUCCESS", "response": {}}})));
    let downloader = downloader();
    let task = GenerationTask::resumed("t-4".into());

    let err = TaskMonitor::new(&source, &downloader, settings(10))
      .monitor(&task, Path::new("unused.mp3"))
      .await
      .unwrap_err();

    assert!(err.to_string().contains("no result URL found"), "{err}");
    assert_eq!(source.calls(), 1);
  }

  #[tokio::test]
  async fn transient_errors_and_unknown_tokens_keep_polling() {
    let source = Scripted::new(|call| match call {
      1 => Err(GenerationError::StatusUnavailable("t-5".into())),
      2 => Ok(json!({"data": {"status": "MIXING"}})),
      _ => Ok(json!({"data": {"status": "CREATE_TASK_FAILED"}})),
    });
    let downloader = downloader();
    let task = GenerationTask::resumed("t-5".into());

    let err = TaskMonitor::new(&source, &downloader, settings(10))
      .monitor(&task, Path::new("unused.mp3"))
      .await
      .unwrap_err();

    assert!(matches!(err, GenerationError::Monitor { .. }), "{err:?}");
    assert_eq!(source.calls(), 3);
  }

  #[tokio::test]
  async fn transient_errors_count_toward_the_budget() {
    let source = Scripted::new(|_| Err(GenerationError::StatusUnavailable("t-6".into())));
    let downloader = downloader();
    let task = GenerationTask::resumed("t-6".into());

    let err = TaskMonitor::new(&source, &downloader, settings(4))
      .monitor(&task, Path::new("unused.mp3"))
      .await
      .unwrap_err();

    assert!(matches!(err, GenerationError::MonitorTimeout { checks: 4, .. }), "{err:?}");
  }
}
