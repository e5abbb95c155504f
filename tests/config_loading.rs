use bridge::{
  media::{FfmpegConfig, FfmpegMediaService},
  transport::{http::PersistedState, HttpTransport, TransportConfig},
  BridgeError, BridgeOrchestrator, BridgeState, ConfigSource, FileConfigSource,
  OrchestratorSettings, ShutdownOutcome,
};
use std::{path::Path, sync::Arc};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const CAMERAS_YAML: &str = r#"
front:
  id: 1
  name: Front
  input_device: avfoundation
  filename: default
back:
  id: 2
  name: Back
  input_device: avfoundation
  filename: "1"
  multistream: true
  min_video_bitrate: 256
"#;

fn settings(storage: &Path) -> OrchestratorSettings {
  OrchestratorSettings::new(TransportConfig {
    pairing_pin: "31415926".into(),
    port: 0,
    bind_host: "127.0.0.1".into(),
    storage_path: storage.to_path_buf(),
  })
  .with_host_os("macos")
}

async fn http_get(port: u16, path: &str, pin: &str) -> String {
  let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
  let request = format!(
    "GET {path} HTTP/1.1\r\nHost: localhost\r\nx-pairing-pin: {pin}\r\nConnection: close\r\n\r\n"
  );
  stream.write_all(request.as_bytes()).await.unwrap();
  let mut response = String::new();
  stream.read_to_string(&mut response).await.unwrap();
  response
}

#[tokio::test]
async fn test_keyed_yaml_document_loads_in_order() {
  let dir = TempDir::new().unwrap();
  std::fs::write(dir.path().join("cameras.yaml"), CAMERAS_YAML).unwrap();

  let cams = FileConfigSource::new(vec![dir.path().into()])
    .load("cameras")
    .await
    .unwrap();

  assert_eq!(cams.len(), 2);
  assert_eq!(cams[0].name, "Front");
  assert_eq!(cams[1].id, 2);
  assert!(cams[1].multi_stream);
  assert_eq!(cams[1].min_video_bitrate, 256);
}

#[tokio::test]
async fn test_json_list_document_loads() {
  let dir = TempDir::new().unwrap();
  std::fs::write(
    dir.path().join("garage.json"),
    r#"[{"id": 4, "name": "Garage", "loopback": "/dev/video9"}]"#,
  )
  .unwrap();

  let cams = FileConfigSource::new(vec![dir.path().into()])
    .load("garage")
    .await
    .unwrap();

  assert_eq!(cams[0].id, 4);
  assert_eq!(cams[0].loopback_filename, "/dev/video9");
}

#[tokio::test]
async fn test_missing_config_stops_the_bridge() {
  let config_dir = TempDir::new().unwrap();
  let storage = TempDir::new().unwrap();
  let orch = BridgeOrchestrator::new(
    settings(storage.path()),
    Arc::new(FileConfigSource::new(vec![config_dir.path().into()])),
    Arc::new(FfmpegMediaService::new(FfmpegConfig::default())),
    Arc::new(HttpTransport::new()),
  );

  let err = orch.run(async {}).await.unwrap_err();

  assert!(matches!(err, BridgeError::ConfigLoadFailed { .. }));
  assert_eq!(orch.state(), BridgeState::Stopped);
}

#[tokio::test]
async fn test_bridge_serves_configured_cameras_over_http() {
  let config_dir = TempDir::new().unwrap();
  std::fs::write(config_dir.path().join("cameras.yaml"), CAMERAS_YAML).unwrap();
  let storage = TempDir::new().unwrap();
  let storage_path = storage.path().join("camera");

  let orch = Arc::new(BridgeOrchestrator::new(
    settings(&storage_path),
    Arc::new(FileConfigSource::new(vec![config_dir.path().into()])),
    Arc::new(FfmpegMediaService::new(FfmpegConfig::default())),
    Arc::new(HttpTransport::new()),
  ));
  let mut states = orch.subscribe();
  let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

  let runner = {
    let orch = Arc::clone(&orch);
    tokio::spawn(async move {
      orch
        .run(async {
          let _ = stop_rx.await;
        })
        .await
    })
  };

  states
    .wait_for(|s| *s == BridgeState::Serving)
    .await
    .unwrap();

  let running = PersistedState::read(&storage_path).await.unwrap();
  assert_eq!(running.accessory_ids, vec![1, 2]);
  assert!(!running.clean_shutdown);

  let health = http_get(running.port, "/healthz", "").await;
  assert!(health.starts_with("HTTP/1.1 200"));

  let listing = http_get(running.port, "/accessories", "31415926").await;
  assert!(listing.starts_with("HTTP/1.1 200"));
  assert!(listing.contains("\"Front\""));
  assert!(listing.contains("\"Back\""));
  assert!(listing.contains("Homekit IP Camera Bridge"));

  let denied = http_get(running.port, "/accessories", "00000000").await;
  assert!(denied.starts_with("HTTP/1.1 401"));

  let assets = http_get(running.port, "/accessories/1/assets", "31415926").await;
  assert!(assets.starts_with("HTTP/1.1 200"));
  assert!(assets.ends_with("[]"));
  let assets_denied = http_get(running.port, "/accessories/1/assets", "").await;
  assert!(assets_denied.starts_with("HTTP/1.1 401"));

  stop_tx.send(()).unwrap();
  let outcome = runner.await.unwrap().unwrap();
  assert_eq!(outcome, ShutdownOutcome::Clean);

  let stopped = PersistedState::read(&storage_path).await.unwrap();
  assert!(stopped.clean_shutdown);
  assert!(stopped.stopped_at.is_some());
}
