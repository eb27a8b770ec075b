use std::path::{Path, PathBuf};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::config::Config;
use crate::downloader::Downloader;
use crate::error::GenerationResult;
use crate::images::ImageClient;
use crate::lyrics::{Lyrics, LyricsClient};
use crate::music::{MusicGenerator, SunoApi};
use crate::progress::ProgressSink;

pub const LYRICS_FILE: &str = "lyrics.txt";
pub const AUDIO_FILE: &str = "song.mp3";
pub const IMAGES_DIR: &str = "images";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongRequest {
  pub theme: String,
  #[serde(default = "default_style")]
  pub style: String,
  #[serde(default = "default_verses")]
  pub verses: u8,
  #[serde(default)]
  pub chorus: bool,
}

fn default_style() -> String {
  "pop".into()
}

fn default_verses() -> u8 {
  2
}

#[derive(Debug, Clone)]
pub struct Artifacts {
  pub lyrics_path: PathBuf,
  pub audio_path: PathBuf,
  pub image_paths: Vec<PathBuf>,
}

/// Theme in, lyrics + song + images out.
pub struct Studio {
  lyrics: LyricsClient,
  music: MusicGenerator,
  images: ImageClient,
}

impl Studio {
  pub fn new(lyrics: LyricsClient, music: MusicGenerator, images: ImageClient) -> Self {
    Self { lyrics, music, images }
  }

  pub fn from_config(config: &Config, client: Client) -> Self {
    let downloader = Downloader::new(client.clone(), config.download);
    Self {
      lyrics: LyricsClient::new(client.clone(), config.lyrics.clone()),
      music: MusicGenerator::new(SunoApi::new(client.clone(), config.suno.clone()), downloader, config.poll),
      images: ImageClient::new(client, config.images.clone()),
    }
  }

  pub async fn create(
    &self,
    request: &SongRequest,
    output_dir: &Path,
    progress: &dyn ProgressSink,
  ) -> GenerationResult<Artifacts> {
    tokio::fs::create_dir_all(output_dir).await?;

    progress.update(10, "Generating lyrics...");
    let lyrics = self.lyrics
      .generate(&request.theme, &request.style, request.verses, request.chorus)
      .await?;
    let lyrics_path = save_lyrics(&lyrics, output_dir).await?;
    info!("Lyrics saved to {}", lyrics_path.display());

    progress.update(20, "Generating music...");
    let audio_path = self.music
      .produce_audio(&lyrics.title, &lyrics.content, &request.style, &output_dir.join(AUDIO_FILE))
      .await?;

    progress.update(50, "Generating images...");
    let image_paths = self.images
      .generate_for_lyrics(&lyrics.content, &output_dir.join(IMAGES_DIR))
      .await?;

    progress.update(100, "Complete");
    Ok(Artifacts {
      lyrics_path,
      audio_path,
      image_paths,
    })
  }
}

pub async fn save_lyrics(lyrics: &Lyrics, output_dir: &Path) -> GenerationResult<PathBuf> {
  let path = output_dir.join(LYRICS_FILE);
  tokio::fs::write(&path, format!("{}\n\n{}", lyrics.title, lyrics.content)).await?;
  Ok(path)
}
