use std::time::Duration;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use crate::config::LyricsSettings;
use crate::error::{GenerationError, GenerationResult};

const MAX_TITLE_LEN: usize = 80;
const MAX_TOKENS: u32 = 1000;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const SYSTEM_PROMPT: &str = "You are a professional songwriter with expertise in many musical styles. \
Create original, creative, and emotionally resonant lyrics that feel authentic to the requested style. \
Structure the lyrics properly and ensure they have a cohesive theme.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lyrics {
  pub title: String,
  pub content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
  content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
  #[serde(default)]
  text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LyricsClient {
  client: Client,
  settings: LyricsSettings,
}

impl LyricsClient {
  pub fn new(client: Client, settings: LyricsSettings) -> Self {
    Self { client, settings }
  }

  pub async fn generate(&self, theme: &str, style: &str, verses: u8, chorus: bool) -> GenerationResult<Lyrics> {
    info!("Generating lyrics about '{}' in {} style", theme, style);
    let url = format!("{}/v1/messages", self.settings.base_url.trim_end_matches('/'));
    let body = json!({
      "model": self.settings.model,
      "max_tokens": MAX_TOKENS,
      "system": SYSTEM_PROMPT,
      "messages": [{"role": "user", "content": user_prompt(theme, style, verses, chorus)}],
    });

    let response = self.client
      .post(&url)
      .header("x-api-key", &self.settings.api_key)
      .header("anthropic-version", ANTHROPIC_VERSION)
      .timeout(REQUEST_TIMEOUT)
      .json(&body)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(GenerationError::Lyrics(format!("{status}: {text}")));
    }

    let parsed: MessagesResponse = response.json().await?;
    let text = parsed
      .content
      .into_iter()
      .find_map(|block| block.text)
      .ok_or_else(|| GenerationError::Lyrics("response contained no text".into()))?;

    let lyrics = parse_lyrics(&text);
    if lyrics.content.is_empty() {
      return Err(GenerationError::Lyrics("response contained a title but no lyrics".into()));
    }
    info!("Generated title: {}", lyrics.title);
    Ok(lyrics)
  }
}

pub fn user_prompt(theme: &str, style: &str, verses: u8, chorus: bool) -> String {
  let style_instruction = if style.trim().is_empty() {
    String::new()
  } else {
    format!("Write in {style} style. ")
  };
  let structure = if chorus {
    format!("Include {verses} verses and a chorus that repeats.")
  } else {
    format!("Include {verses} verses.")
  };
  format!(
    "{style_instruction}Write lyrics for a song about: {theme}. {structure} \
     Include a title at the top. Format the output so verses and chorus are clearly separated."
  )
}

/// First line is the title (markdown heading marks removed), the rest is the
/// song body.
pub fn parse_lyrics(text: &str) -> Lyrics {
  let trimmed = text.trim();
  let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
  Lyrics {
    title: truncate_title(first.replace('#', "").trim(), MAX_TITLE_LEN),
    content: rest.trim().to_string(),
  }
}

/// Shortens a title to `max_len` characters on a word boundary.
pub fn truncate_title(title: &str, max_len: usize) -> String {
  if title.chars().count() <= max_len {
    return title.to_string();
  }

  let title = title.trim_matches(|c: char| c == '"' || c == '\'');
  let mut kept = String::new();
  for word in title.split_whitespace() {
    let needed = if kept.is_empty() { word.chars().count() } else { word.chars().count() + 1 };
    if kept.chars().count() + needed > max_len {
      break;
    }
    if !kept.is_empty() {
      kept.push(' ');
    }
    kept.push_str(word);
  }

  if kept.is_empty() {
    title.chars().take(max_len).collect()
  } else {
    kept
  }
}
