use std::time::Duration;

use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tunesmith::config::ImageSettings;
use tunesmith::images::ImageClient;

#[tokio::test]
async fn failed_sections_leave_no_gaps_in_numbering() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/v1/images/generations"))
    .respond_with(ResponseTemplate::new(500).set_body_string("content policy"))
    .up_to_n_times(1)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/v1/images/generations"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "data": [{"url": format!("{}/render.png", server.uri())}]
    })))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/render.png"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89u8, b'P', b'N', b'G']))
    .mount(&server)
    .await;

  let settings = ImageSettings {
    api_key: "image-key".into(),
    base_url: server.uri(),
    size: "256x256".into(),
    delay: Duration::ZERO,
  };
  let images = ImageClient::new(reqwest::Client::new(), settings);
  let dir = tempfile::tempdir().unwrap();
  let lyrics = "[Verse 1]\nfirst\n\n[Chorus]\nsecond\n\n[Verse 2]\nthird";

  let paths = assert_ok!(images.generate_for_lyrics(lyrics, dir.path()).await);

  let names: Vec<_> = paths
    .iter()
    .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
    .collect();
  assert_eq!(names, vec!["image_00.png", "image_01.png"]);
  assert!(paths.iter().all(|p| p.exists()));
  assert!(!dir.path().join("image_02.png").exists());
}
