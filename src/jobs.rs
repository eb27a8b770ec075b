use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;
use crate::error::GenerationResult;
use crate::models::{JobRecord, JobStatus};
use crate::pipeline::{Artifacts, SongRequest, Studio};
use crate::progress::ProgressSink;

/// In-memory job records, shared between the web routes and running sessions.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
  jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl JobStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a job and returns the only handle allowed to write to it.
  pub fn create(&self, id: String, request: &SongRequest, output_dir: PathBuf) -> JobHandle {
    self.insert(pending_record(id, request, output_dir))
  }

  pub fn insert(&self, record: JobRecord) -> JobHandle {
    let id = record.id.clone();
    self.jobs
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(id.clone(), record);
    JobHandle { id, store: self.clone() }
  }

  pub fn get(&self, id: &str) -> Option<JobRecord> {
    self.jobs
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(id)
      .cloned()
  }

  /// All jobs, newest first.
  pub fn list(&self) -> Vec<JobRecord> {
    let mut jobs: Vec<_> = self.jobs
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect();
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    jobs
  }

  fn modify(&self, id: &str, change: impl FnOnce(&mut JobRecord)) {
    let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(record) = jobs.get_mut(id) {
      change(record);
      record.updated_at = Utc::now();
    }
  }
}

fn pending_record(id: String, request: &SongRequest, output_dir: PathBuf) -> JobRecord {
  let now = Utc::now();
  JobRecord {
    id,
    theme: request.theme.clone(),
    style: request.style.clone(),
    verses: request.verses,
    has_chorus: request.chorus,
    state: JobStatus::Running,
    status: "Starting...".into(),
    progress: 0,
    output_dir,
    audio_path: None,
    lyrics_path: None,
    image_paths: Vec::new(),
    error_message: None,
    error_details: Vec::new(),
    created_at: now,
    updated_at: now,
  }
}

/// Write access to a single job record.
#[derive(Debug, Clone)]
pub struct JobHandle {
  id: String,
  store: JobStore,
}

impl JobHandle {
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Marks the job complete. Paths are stored relative to `output_root` and
  /// prefixed with the URL segment the files are served under.
  pub fn complete(&self, artifacts: &Artifacts, output_root: &Path) {
    let public = |path: &Path| public_path(path, output_root);
    self.store.modify(&self.id, |job| {
      job.state = JobStatus::Complete;
      job.status = "Complete".into();
      job.progress = 100;
      job.audio_path = Some(public(artifacts.audio_path.as_path()));
      job.lyrics_path = Some(public(artifacts.lyrics_path.as_path()));
      job.image_paths = artifacts.image_paths.iter().map(|p| public(p.as_path())).collect();
    });
  }

  pub fn fail(&self, error: &(dyn Error + 'static)) {
    let mut details = vec![format!("Error: {error}"), format!("Debug: {error:?}")];
    let mut source = error.source();
    while let Some(cause) = source {
      details.push(format!("Caused by: {cause}"));
      source = cause.source();
    }
    self.fail_with(error.to_string(), details);
  }

  pub fn fail_with(&self, message: String, details: Vec<String>) {
    self.store.modify(&self.id, |job| {
      job.state = JobStatus::Failed;
      job.status = "Failed".into();
      job.progress = 0;
      job.error_message = Some(message);
      job.error_details = details;
    });
  }
}

impl ProgressSink for JobHandle {
  fn update(&self, percent: u8, label: &str) {
    self.store.modify(&self.id, |job| {
      job.progress = percent.min(100);
      job.status = label.to_string();
    });
  }
}

fn public_path(path: &Path, output_root: &Path) -> String {
  let relative = path.strip_prefix(output_root).unwrap_or(path);
  let joined = relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/");
  format!("output/{joined}")
}

/// Runs generation sessions in the background, at most `max_concurrent` at a
/// time. A failing or panicking session only affects its own record.
#[derive(Clone)]
pub struct JobRunner {
  studio: Arc<Studio>,
  store: JobStore,
  permits: Arc<Semaphore>,
  output_root: PathBuf,
}

impl JobRunner {
  pub fn new(studio: Arc<Studio>, store: JobStore, output_root: PathBuf, max_concurrent: usize) -> Self {
    Self {
      studio,
      store,
      permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
      output_root,
    }
  }

  pub fn store(&self) -> &JobStore {
    &self.store
  }

  pub fn submit(&self, request: SongRequest) -> JobRecord {
    let id = Uuid::new_v4().to_string();
    let output_dir = self.output_root.join(&id);
    let record = pending_record(id, &request, output_dir.clone());
    let handle = self.store.insert(record.clone());

    let studio = self.studio.clone();
    spawn_session(handle, self.permits.clone(), self.output_root.clone(), move |handle| async move {
      studio.create(&request, &output_dir, &handle).await
    });

    record
  }
}

/// Runs `session` once a permit is free and records its outcome on `handle`.
/// The session runs in its own task so a panic ends up as a Failed record.
fn spawn_session<F, Fut>(handle: JobHandle, permits: Arc<Semaphore>, output_root: PathBuf, session: F) -> JoinHandle<()>
where
  F: FnOnce(JobHandle) -> Fut + Send + 'static,
  Fut: Future<Output = GenerationResult<Artifacts>> + Send + 'static,
{
  tokio::spawn(async move {
    let Ok(_permit) = permits.acquire_owned().await else {
      handle.fail_with("job runner shut down".into(), Vec::new());
      return;
    };
    info!("Job {} started", handle.id());

    match tokio::spawn(session(handle.clone())).await {
      Ok(Ok(artifacts)) => {
        info!("Job {} complete", handle.id());
        handle.complete(&artifacts, &output_root);
      }
      Ok(Err(e)) => {
        error!("Job {} failed: {}", handle.id(), e);
        handle.fail(&e);
      }
      Err(e) => {
        error!("Job {} aborted: {}", handle.id(), e);
        handle.fail_with(format!("generation aborted: {e}"), vec![format!("{e:?}")]);
      }
    }
  })
}
