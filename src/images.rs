use std::path::{Path, PathBuf};
use std::time::Duration;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{error, info};
use crate::config::ImageSettings;
use crate::error::{GenerationError, GenerationResult};

const IMAGE_MODEL: &str = "dall-e-3";
const LINES_PER_PROMPT: usize = 4;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Deserialize)]
struct ImagesResponse {
  data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
  url: Option<String>,
}

/// One prompt per lyric section (blank-line separated), each cut to its first
/// four lines.
pub fn image_prompts(lyrics: &str) -> Vec<String> {
  lyrics
    .split("\n\n")
    .map(str::trim)
    .filter(|section| !section.is_empty())
    .map(|section| {
      section
        .lines()
        .take(LINES_PER_PROMPT)
        .collect::<Vec<_>>()
        .join("\n")
    })
    .collect()
}

pub fn image_file_name(index: usize) -> String {
  format!("image_{index:02}.png")
}

#[derive(Debug, Clone)]
pub struct ImageClient {
  client: Client,
  settings: ImageSettings,
}

impl ImageClient {
  pub fn new(client: Client, settings: ImageSettings) -> Self {
    Self { client, settings }
  }

  /// Generates an image for every lyric section into `output_dir`. Sections
  /// that fail are skipped and the saved files stay numbered without gaps; an
  /// empty result is an error.
  pub async fn generate_for_lyrics(&self, lyrics: &str, output_dir: &Path) -> GenerationResult<Vec<PathBuf>> {
    tokio::fs::create_dir_all(output_dir).await?;

    let mut paths = Vec::new();
    for (section, prompt) in image_prompts(lyrics).iter().enumerate() {
      let path = output_dir.join(image_file_name(paths.len()));
      match self.generate_image(prompt, &path).await {
        Ok(()) => {
          info!("Image saved to {}", path.display());
          paths.push(path);
          // rate limit
          sleep(self.settings.delay).await;
        }
        Err(e) => error!("Error generating image for section {}: {}", section, e),
      }
    }

    if paths.is_empty() {
      return Err(GenerationError::Images("no images were generated".into()));
    }
    Ok(paths)
  }

  async fn generate_image(&self, lyric: &str, path: &Path) -> GenerationResult<()> {
    info!("Generating image for: {}", lyric.lines().next().unwrap_or_default());
    let url = format!("{}/v1/images/generations", self.settings.base_url.trim_end_matches('/'));
    let body = json!({
      "model": IMAGE_MODEL,
      "prompt": scene_prompt(lyric),
      "size": self.settings.size,
      "quality": "standard",
      "n": 1,
    });

    let response = self.client
      .post(&url)
      .bearer_auth(&self.settings.api_key)
      .timeout(REQUEST_TIMEOUT)
      .json(&body)
      .send()
      .await?;
    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(GenerationError::Images(format!("{status}: {text}")));
    }

    let parsed: ImagesResponse = response.json().await?;
    let image_url = parsed
      .data
      .into_iter()
      .find_map(|image| image.url)
      .ok_or_else(|| GenerationError::Images("response contained no image URL".into()))?;

    let bytes = self.client
      .get(&image_url)
      .timeout(REQUEST_TIMEOUT)
      .send()
      .await?
      .error_for_status()?
      .bytes()
      .await?;
    tokio::fs::write(path, &bytes).await?;
    Ok(())
  }
}

fn scene_prompt(lyric: &str) -> String {
  format!(
    "Create a cinematic scene for a music video with the following lyrics: '{lyric}'. \
     Make it visually striking with artistic lighting and composition. No text in the image."
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sections_become_prompts() {
    let lyrics = "[Verse 1]\na\nb\nc\nd\ne\n\n\n\n[Chorus]\nla la\n\n   \n";
    let prompts = image_prompts(lyrics);
    assert_eq!(prompts, vec!["[Verse 1]\na\nb\nc".to_string(), "[Chorus]\nla la".to_string()]);
  }

  #[test]
  fn file_names_are_zero_padded() {
    assert_eq!(image_file_name(3), "image_03.png");
    assert_eq!(image_file_name(12), "image_12.png");
  }
}
