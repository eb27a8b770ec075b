use std::sync::Arc;
use anyhow::Result;
use tracing::info;
use tunesmith::{config::Config, http_client, jobs::{JobRunner, JobStore}, pipeline::Studio, routes::routes};

#[tokio::main]
async fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt::init();
  let config = Config::from_env()?;
  tokio::fs::create_dir_all(&config.output_root).await?;

  let studio = Arc::new(Studio::from_config(&config, http_client()?));
  let runner = JobRunner::new(studio, JobStore::new(), config.output_root.clone(), config.max_concurrent_jobs);
  let api = routes(runner, config.output_root.clone());

  info!("Listening on port {}", config.server_port);
  warp::serve(api)
    .run(([0, 0, 0, 0], config.server_port))
    .await;
  Ok(())
}
