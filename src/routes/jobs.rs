use std::sync::LazyLock;
use warp::Filter;
use warp::http::StatusCode;
use serde::Serialize;
use regex::Regex;
use tracing::{info, error};
use crate::jobs::{JobRunner, JobStore};
use crate::pipeline::SongRequest;
use super::ApiError;

const MAX_THEME_LEN: usize = 200;
const MAX_VERSES: u8 = 8;

static SAFE_TEXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\w\s.,'&!?\-]+$").expect("valid input pattern"));

#[derive(Serialize)]
pub struct JobResponse {
  pub job_id: String,
  pub status: String,
  pub job_url: String,
  pub sse_url: String,
}

fn sanitize_input(input: &str) -> bool {
  SAFE_TEXT.is_match(input)
}

pub fn validate_request(request: &SongRequest) -> Result<(), String> {
  let theme = request.theme.trim();
  if theme.is_empty() {
    return Err("Please enter a theme for your music".into());
  }
  if theme.chars().count() > MAX_THEME_LEN {
    return Err(format!("Theme must be at most {MAX_THEME_LEN} characters"));
  }
  if !sanitize_input(theme) {
    return Err("Invalid or unsafe value for field 'theme'".into());
  }
  if !sanitize_input(&request.style) {
    return Err("Invalid or unsafe value for field 'style'".into());
  }
  if request.verses == 0 || request.verses > MAX_VERSES {
    return Err(format!("Field 'verses' must be between 1 and {MAX_VERSES}"));
  }
  Ok(())
}

pub fn generate_route(runner: JobRunner) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("generate")
    .and(warp::path::end())
    .and(warp::post())
    .and(warp::body::json())
    .and(with_runner(runner))
    .and_then(handle_generate)
}

pub fn list_route(store: JobStore) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("jobs")
    .and(warp::path::end())
    .and(warp::get())
    .and(with_store(store))
    .map(|store: JobStore| warp::reply::json(&store.list()))
}

pub fn get_route(store: JobStore) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("jobs" / String)
    .and(warp::get())
    .and(with_store(store))
    .and_then(handle_get_job)
}

fn with_runner(runner: JobRunner) -> impl Filter<Extract = (JobRunner,), Error = std::convert::Infallible> + Clone {
  warp::any().map(move || runner.clone())
}

pub(super) fn with_store(store: JobStore) -> impl Filter<Extract = (JobStore,), Error = std::convert::Infallible> + Clone {
  warp::any().map(move || store.clone())
}

async fn handle_generate(request: SongRequest, runner: JobRunner) -> Result<impl warp::Reply, warp::Rejection> {
  if let Err(e) = validate_request(&request) {
    error!("Request validation failed: {}", e);
    return Err(warp::reject::custom(ApiError::new(StatusCode::BAD_REQUEST, e)));
  }

  let record = runner.submit(request);
  info!("Job {} submitted for theme '{}'", record.id, record.theme);

  let response = JobResponse {
    job_url: format!("/jobs/{}", record.id),
    sse_url: format!("/sse?job_id={}", record.id),
    job_id: record.id,
    status: record.status,
  };
  Ok(warp::reply::with_status(warp::reply::json(&response), StatusCode::ACCEPTED))
}

async fn handle_get_job(job_id: String, store: JobStore) -> Result<impl warp::Reply, warp::Rejection> {
  match store.get(&job_id) {
    Some(job) => Ok(warp::reply::json(&job)),
    None => Err(warp::reject::custom(ApiError::new(StatusCode::NOT_FOUND, "Job not found"))),
  }
}
