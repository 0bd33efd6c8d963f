//! Integration tests for the HTTP and directory sources

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use frr_core::{RaceKey, RaceSource, SourceError};
use frr_sources::{DirectorySource, LocalApiSource, ObjectStorageSource, StorageLayout};
use std::collections::HashMap;
use std::sync::Mutex;

const PAYLOAD: &str = r#"{"frames":[{"t":0,"lap":1,"drivers":{}}]}"#;

/// Serve a tiny bucket plus a local API on an ephemeral port
async fn spawn_server() -> String {
    let app = Router::new()
        .route(
            "/races/2024/1.json",
            get(|| async { ([(header::CONTENT_TYPE, "application/json")], PAYLOAD) }),
        )
        .route(
            "/races/2024/9.json",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR.into_response() }),
        )
        .route(
            "/api/race",
            get(
                |axum::extract::Query(q): axum::extract::Query<HashMap<String, String>>| async move {
                    format!(
                        r#"{{"frames":[],"metadata":{{"year":{},"round":{},"event_name":"Echo","session_type":"R","exported_at":"now"}}}}"#,
                        q.get("year").cloned().unwrap_or_default(),
                        q.get("round").cloned().unwrap_or_default()
                    )
                },
            ),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ==================== Object storage ====================

#[tokio::test]
async fn test_object_storage_downloads_with_progress() {
    let base = spawn_server().await;
    let source = ObjectStorageSource::new(StorageLayout::Plain { root: base });
    let seen = Mutex::new(Vec::new());
    let report = |p: u8| seen.lock().unwrap().push(p);

    let text = source.fetch(RaceKey::new(2024, 1), &report).await.unwrap();
    assert_eq!(text, PAYLOAD);

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[1] > w[0]), "progress must increase: {:?}", seen);
}

#[tokio::test]
async fn test_object_storage_missing_race_is_not_found() {
    let base = spawn_server().await;
    let source = ObjectStorageSource::new(StorageLayout::Plain { root: base });
    let err = source.fetch(RaceKey::new(2030, 4), &|_: u8| {}).await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_object_storage_server_error_is_http_error() {
    let base = spawn_server().await;
    let source = ObjectStorageSource::new(StorageLayout::Plain { root: base });
    let err = source.fetch(RaceKey::new(2024, 9), &|_: u8| {}).await.unwrap_err();
    assert!(matches!(err, SourceError::Http { status: 500, .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    // Port 9 (discard) is closed on test hosts
    let source = ObjectStorageSource::new(StorageLayout::Plain {
        root: "http://127.0.0.1:9".to_string(),
    });
    let err = source.fetch(RaceKey::new(2024, 1), &|_: u8| {}).await.unwrap_err();
    assert!(matches!(err, SourceError::Transport(_)), "got {:?}", err);
}

// ==================== Local API ====================

#[tokio::test]
async fn test_local_api_passes_year_and_round() {
    let base = spawn_server().await;
    let source = LocalApiSource::new(format!("{}/", base));
    assert_eq!(source.endpoint(), format!("{}/api/race", base));

    let text = source.fetch(RaceKey::new(2022, 14), &|_: u8| {}).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["metadata"]["year"], 2022);
    assert_eq!(value["metadata"]["round"], 14);
}

// ==================== Directory ====================

#[tokio::test]
async fn test_directory_reads_object_layout() {
    let dir = tempfile::tempdir().unwrap();
    let source = DirectorySource::new(dir.path());
    let path = source.path_for(RaceKey::new(2024, 1));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, PAYLOAD).unwrap();

    let seen = Mutex::new(Vec::new());
    let report = |p: u8| seen.lock().unwrap().push(p);
    let text = source.fetch(RaceKey::new(2024, 1), &report).await.unwrap();

    assert_eq!(text, PAYLOAD);
    assert_eq!(seen.into_inner().unwrap(), vec![100]);
}

#[tokio::test]
async fn test_directory_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let source = DirectorySource::new(dir.path());
    let err = source.fetch(RaceKey::new(2024, 5), &|_: u8| {}).await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound(_)));
}

#[tokio::test]
async fn test_directory_rejects_invalid_utf8() {
    let dir = tempfile::tempdir().unwrap();
    let source = DirectorySource::new(dir.path());
    let path = source.path_for(RaceKey::new(2024, 1));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

    let err = source.fetch(RaceKey::new(2024, 1), &|_: u8| {}).await.unwrap_err();
    assert!(matches!(err, SourceError::Encoding));
}
