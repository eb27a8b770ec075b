use std::convert::Infallible;
use std::path::PathBuf;
use warp::Filter;
use warp::http::StatusCode;
use serde_json::json;
use crate::jobs::JobRunner;
pub mod jobs;
pub mod sse;

#[derive(Debug)]
pub struct ApiError {
  pub status: StatusCode,
  pub message: String,
}

impl ApiError {
  pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
    Self { status, message: message.into() }
  }
}

impl warp::reject::Reject for ApiError {}

pub fn routes(
  runner: JobRunner,
  output_root: PathBuf,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
  let store = runner.store().clone();
  jobs::generate_route(runner)
    .or(jobs::list_route(store.clone()))
    .or(jobs::get_route(store.clone()))
    .or(sse::sse_route(store))
    .or(warp::path("output").and(warp::fs::dir(output_root)))
    .recover(handle_rejection)
    .with(warp::trace::request())
}

pub async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
  let (status, message) = if let Some(e) = err.find::<ApiError>() {
    (e.status, e.message.clone())
  } else if err.is_not_found() {
    (StatusCode::NOT_FOUND, "Not found".to_string())
  } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
    (StatusCode::BAD_REQUEST, e.to_string())
  } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
  } else {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Unhandled rejection: {err:?}"))
  };
  Ok(warp::reply::with_status(warp::reply::json(&json!({"error": message})), status))
}
