use warp::Filter;
use warp::http::StatusCode;
use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::{wrappers::IntervalStream, StreamExt};
use serde_json::json;
use crate::jobs::JobStore;
use crate::models::{JobRecord, JobStatus};
use super::ApiError;
use super::jobs::with_store;

const PUSH_INTERVAL: Duration = Duration::from_secs(2);

pub fn sse_route(store: JobStore) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("sse")
    .and(warp::get())
    .and(warp::query::<HashMap<String, String>>())
    .and(with_store(store))
    .and_then(handle_sse)
}

fn progress_event(job: &JobRecord) -> warp::sse::Event {
  warp::sse::Event::default()
    .data(json!({"job_id": job.id, "state": job.state, "status": job.status, "progress": job.progress}).to_string())
}

async fn handle_sse(query: HashMap<String, String>, store: JobStore) -> Result<impl warp::Reply, warp::Rejection> {
  let job_id = query
    .get("job_id")
    .ok_or_else(|| warp::reject::custom(ApiError::new(StatusCode::BAD_REQUEST, "Missing job_id")))?
    .clone();
  if store.get(&job_id).is_none() {
    return Err(warp::reject::custom(ApiError::new(StatusCode::NOT_FOUND, "Job not found")));
  }

  // Ends after the first event reporting a finished job.
  let mut finished = false;
  let stream = IntervalStream::new(tokio::time::interval(PUSH_INTERVAL))
    .map(move |_| store.get(&job_id))
    .take_while(move |job| {
      if finished {
        return false;
      }
      match job {
        Some(job) => {
          finished = job.state != JobStatus::Running;
          true
        }
        None => false,
      }
    })
    .filter_map(|job| job.map(|job| Ok::<_, Infallible>(progress_event(&job))));

  Ok(warp::sse::reply(warp::sse::keep_alive().stream(stream)))
}
