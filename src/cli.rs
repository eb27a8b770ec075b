use std::path::PathBuf;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tunesmith::config::{Config, PollSettings, RetryPolicy, SunoSettings};
use tunesmith::downloader::Downloader;
use tunesmith::http_client;
use tunesmith::models::GenerationTask;
use tunesmith::music::{MusicGenerator, SunoApi};
use tunesmith::pipeline::{SongRequest, Studio};
use tunesmith::progress::LogProgress;

#[derive(Parser)]
#[command(name = "tunesmith", about = "Generate AI music and images from a theme")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Write lyrics, a song and images for a theme.
  Generate {
    /// Theme or idea for the song
    #[arg(long)]
    theme: String,
    /// Music style (e.g. rock, pop, rap)
    #[arg(long, default_value = "pop")]
    style: String,
    #[arg(long, default_value_t = 2)]
    verses: u8,
    /// Include a chorus
    #[arg(long)]
    chorus: bool,
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
  },
  /// Keep waiting for a task submitted by an earlier run and download it.
  Resume {
    #[arg(long)]
    task_id: String,
    #[arg(long, default_value = "output/song.mp3")]
    output: PathBuf,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt::init();
  let cli = Cli::parse();

  match cli.command {
    Command::Generate { theme, style, verses, chorus, output_dir } => {
      let config = Config::from_env()?;
      let studio = Studio::from_config(&config, http_client()?);
      let request = SongRequest { theme, style, verses, chorus };
      match studio.create(&request, &output_dir, &LogProgress).await {
        Ok(artifacts) => {
          info!("Lyrics: {}", artifacts.lyrics_path.display());
          info!("Song: {}", artifacts.audio_path.display());
          info!("Images: {}", artifacts.image_paths.len());
        }
        Err(e) => {
          error!("Generation failed: {}", e);
          return Err(e.into());
        }
      }
    }
    Command::Resume { task_id, output } => {
      let client = http_client()?;
      let music = MusicGenerator::new(
        SunoApi::new(client.clone(), SunoSettings::from_env()?),
        Downloader::new(client, RetryPolicy::from_env()?),
        PollSettings::from_env()?,
      );
      let result = music.monitor(&GenerationTask::resumed(task_id), &output).await?;
      info!("Saved {} bytes to {}", result.bytes, result.path.display());
    }
  }
  Ok(())
}
