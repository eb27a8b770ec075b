//! Submit → poll → download against a mocked music service.

use std::time::{Duration, Instant};

use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tunesmith::config::{PollSettings, RetryPolicy, SunoSettings};
use tunesmith::downloader::Downloader;
use tunesmith::error::GenerationError;
use tunesmith::music::{MusicGenerator, SunoApi};

fn fast_retries(max_attempts: u32, base_ms: u64) -> RetryPolicy {
  RetryPolicy {
    max_attempts,
    base_delay: Duration::from_millis(base_ms),
  }
}

fn fast_polling(max_checks: u32) -> PollSettings {
  PollSettings {
    check_interval: Duration::ZERO,
    max_checks,
    max_total_wait: Duration::from_secs(60),
  }
}

fn generator(server: &MockServer, max_checks: u32) -> MusicGenerator {
  let client = reqwest::Client::new();
  let settings = SunoSettings::new("test-key", format!("{}/api/v1", server.uri()));
  MusicGenerator::new(
    SunoApi::new(client.clone(), settings),
    Downloader::new(client, fast_retries(3, 10)),
    fast_polling(max_checks),
  )
}

#[tokio::test]
async fn download_retries_until_the_file_arrives() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/song.mp3"))
    .respond_with(ResponseTemplate::new(503))
    .up_to_n_times(2)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/song.mp3"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024]))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let destination = dir.path().join("song.mp3");
  let downloader = Downloader::new(reqwest::Client::new(), fast_retries(5, 50));

  let started = Instant::now();
  let result = assert_ok!(downloader.download(&format!("{}/song.mp3", server.uri()), &destination).await);

  assert_eq!(result.attempts, 3);
  assert_eq!(result.bytes, 1024);
  assert_eq!(std::fs::metadata(&destination).unwrap().len(), 1024);
  // 50ms then 100ms of backoff
  assert!(started.elapsed() >= Duration::from_millis(150), "{:?}", started.elapsed());
  assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn empty_downloads_exhaust_every_attempt() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/empty.mp3"))
    .respond_with(ResponseTemplate::new(200))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let destination = dir.path().join("empty.mp3");
  let downloader = Downloader::new(reqwest::Client::new(), fast_retries(4, 5));

  let err = assert_err!(downloader.download(&format!("{}/empty.mp3", server.uri()), &destination).await);

  match err {
    GenerationError::Download { attempts, last_error, .. } => {
      assert_eq!(attempts, 4);
      assert!(last_error.contains("empty"), "{last_error}");
    }
    other => panic!("unexpected error: {other:?}"),
  }
  assert_eq!(server.received_requests().await.unwrap().len(), 4);
  assert!(!destination.exists(), "empty file left at {}", destination.display());
}

#[tokio::test]
async fn produce_audio_end_to_end() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/v1/generate"))
    .and(header("authorization", "Bearer test-key"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 200, "data": {"taskId": "abc123"}})))
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/api/v1/generate/record-info"))
    .and(query_param("taskId", "abc123"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "data": {
        "status": "SUCCESS",
        "response": {"sunoData": [{"audioUrl": format!("{}/files/song.mp3", server.uri())}]}
      }
    })))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/files/song.mp3"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 1024]))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let output = dir.path().join("job").join("song.mp3");
  let music = generator(&server, 3);

  let path = assert_ok!(music.produce_audio("Night Drive", "[Verse]\nlights", "synthwave", &output).await);

  assert_eq!(path, output);
  assert_eq!(std::fs::metadata(&path).unwrap().len(), 1024);
  assert_eq!(
    std::fs::read_to_string(dir.path().join("job").join("last_task_id.txt")).unwrap(),
    "abc123"
  );

  let submit = server
    .received_requests()
    .await
    .unwrap()
    .into_iter()
    .find(|r| r.method.as_str() == "POST")
    .unwrap();
  let payload: serde_json::Value = serde_json::from_slice(&submit.body).unwrap();
  assert_eq!(payload["title"], "Night Drive");
  assert_eq!(payload["style"], "synthwave");
  assert_eq!(payload["customMode"], true);
}

#[tokio::test]
async fn later_status_endpoints_are_tried() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/v1/generate"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"taskId": "t-9"})))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/api/v1/task/t-9"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "status": "complete",
      "audioUrl": format!("{}/out.mp3", server.uri())
    })))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/out.mp3"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3 audio".to_vec()))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let output = dir.path().join("song.mp3");
  let path = assert_ok!(generator(&server, 3).produce_audio("t", "l", "s", &output).await);
  assert_eq!(std::fs::read(path).unwrap(), b"ID3 audio");
}

#[tokio::test]
async fn unreachable_status_times_out() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/v1/generate"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"taskId": "lost"}})))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let err = assert_err!(generator(&server, 2).produce_audio("t", "l", "s", &dir.path().join("song.mp3")).await);
  assert!(matches!(err, GenerationError::MonitorTimeout { checks: 2, .. }), "{err:?}");
}

#[tokio::test]
async fn remote_failure_status_is_reported() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/v1/generate"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"taskId": "bad"}})))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/api/v1/generate/record-info"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"status": "GENERATE_AUDIO_FAILED"}})))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let err = assert_err!(generator(&server, 5).produce_audio("t", "l", "s", &dir.path().join("song.mp3")).await);
  assert!(err.to_string().contains("GENERATE_AUDIO_FAILED"), "{err}");
}

#[tokio::test]
async fn submission_without_task_id_fails_fast() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/v1/generate"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 429, "msg": "credits exhausted", "data": null})))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let err = assert_err!(generator(&server, 5).produce_audio("t", "l", "s", &dir.path().join("song.mp3")).await);
  match err {
    GenerationError::Submission(msg) => assert!(msg.contains("insufficient credits"), "{msg}"),
    other => panic!("unexpected error: {other:?}"),
  }
  // no status polling after a failed submission
  assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
