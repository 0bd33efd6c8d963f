//! Integration tests for the frr-server HTTP API
//!
//! Uses tower::ServiceExt::oneshot to test routes directly without binding a port.

use axum::body::Body;
use axum::http::StatusCode;
use frr_core::{ProgressFn, RaceKey, RaceSource, SourceError};
use frr_server::{
    api::create_router,
    cache::FileCache,
    config::ServerConfig,
    loader::Loader,
    state::AppState,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use http_body_util::BodyExt;
use hyper::Request;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const THREE_FRAMES: &str = r#"{"frames":[
    {"t":0,"lap":1,"drivers":{"VER":{"x":0,"y":0,"speed":0,"throttle":0,"brake":0,"gear":1,"rpm":0,"drs":0,"lap":1,"position":1},
                             "HAM":{"x":-5,"y":0,"speed":0,"throttle":0,"brake":0,"gear":1,"rpm":0,"drs":0,"lap":1,"position":2}}},
    {"t":1,"lap":1,"drivers":{"VER":{"x":10,"y":5,"speed":120,"throttle":80,"brake":0,"gear":3,"rpm":9000,"drs":0,"lap":1,"position":1},
                             "HAM":{"x":5,"y":5,"speed":118,"throttle":80,"brake":0,"gear":3,"rpm":8900,"drs":0,"lap":1,"position":2}}},
    {"t":2,"lap":2,"drivers":{"VER":{"x":20,"y":10,"speed":180,"throttle":100,"brake":0,"gear":5,"rpm":11000,"drs":12,"lap":2,"position":1},
                             "HAM":{"x":15,"y":10,"speed":179,"throttle":100,"brake":0,"gear":5,"rpm":10900,"drs":12,"lap":2,"position":2}}}
]}"#;

/// Serves `payload` for every race, or fails when None
struct FixtureSource {
    payload: Option<&'static str>,
}

impl RaceSource for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch<'a>(
        &'a self,
        key: RaceKey,
        progress: ProgressFn<'a>,
    ) -> BoxFuture<'a, Result<String, SourceError>> {
        async move {
            let payload = self
                .payload
                .ok_or_else(|| SourceError::NotFound(key.object_path()))?;
            progress(100);
            Ok(payload.to_string())
        }
        .boxed()
    }
}

/// Helper: build a router whose loader serves `payload`
fn app_serving(payload: Option<&'static str>) -> (axum::Router, AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let loader = Loader::new(
        None,
        Arc::new(FixtureSource { payload }),
        Arc::new(FileCache::new(dir.path())),
    );
    let state = AppState::with_loader(ServerConfig::default(), loader);
    (create_router(state.clone()), state, dir)
}

fn app() -> (axum::Router, AppState, TempDir) {
    app_serving(Some(THREE_FRAMES))
}

/// Helper: collect response body into string
async fn body_string(body: Body) -> String {
    let collected = body.collect().await.unwrap();
    String::from_utf8(collected.to_bytes().to_vec()).unwrap()
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_string(response.into_body()).await)
}

async fn send_json(app: &axum::Router, method: &str, uri: &str, body: Value) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_string(response.into_body()).await)
}

async fn control(app: &axum::Router, body: Value) -> (StatusCode, String) {
    send_json(app, "POST", "/api/replay/control", body).await
}

async fn load_and_wait(app: &axum::Router) -> Value {
    let (status, body) = send_json(
        app,
        "POST",
        "/api/replay/load?wait=true",
        json!({"year": 2024, "round": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "load failed: {}", body);
    serde_json::from_str(&body).unwrap()
}

async fn snapshot(app: &axum::Router) -> Value {
    let (status, body) = get(app, "/api/replay").await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_str(&body).unwrap()
}

// ==================== GET /api/replay ====================

#[tokio::test]
async fn test_snapshot_before_any_load() {
    let (app, _state, _dir) = app();

    let replay = snapshot(&app).await;
    assert_eq!(replay["loadingStage"], "init");
    assert_eq!(replay["loading"], true);
    assert_eq!(replay["loadingProgress"], 0);
    assert!(replay["currentFrame"].is_null());
    assert!(replay["bounds"].is_null());
    assert_eq!(replay["playback"]["isPlaying"], false);
    assert_eq!(replay["playback"]["playbackSpeed"], 1.0);
}

#[tokio::test]
async fn test_data_is_404_before_load() {
    let (app, _state, _dir) = app();
    let (status, _) = get(&app, "/api/replay/data").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ==================== POST /api/replay/load ====================

#[tokio::test]
async fn test_load_and_wait_reaches_ready() {
    let (app, _state, _dir) = app();

    let body = load_and_wait(&app).await;
    let replay = &body["replay"];
    assert_eq!(replay["loadingStage"], "ready");
    assert_eq!(replay["loadingProgress"], 100);
    assert_eq!(replay["loading"], false);
    assert_eq!(replay["isFromCache"], false);
    assert_eq!(replay["year"], 2024);
    assert_eq!(replay["round"], 1);
    assert_eq!(replay["playback"]["currentFrameIndex"], 0);
    assert_eq!(replay["availableLaps"], json!([1, 2]));
    assert_eq!(replay["currentFrame"]["t"], 0.0);
    assert_eq!(replay["totalFrames"], 3);
    assert_eq!(replay["trackStatus"]["label"], "TRACK CLEAR");
    assert!(replay["bounds"]["width"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_background_load_is_accepted() {
    let (app, state, _dir) = app();

    let (status, body) =
        send_json(&app, "POST", "/api/replay/load", json!({"year": 2024, "round": 1})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["generation"], state.generation());
}

#[tokio::test]
async fn test_failed_load_is_bad_gateway() {
    let (app, _state, _dir) = app_serving(None);

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/replay/load?wait=true",
        json!({"year": 2024, "round": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.starts_with("Stream error"), "unexpected body: {}", body);

    let replay = snapshot(&app).await;
    assert_eq!(replay["loadingStage"], "error");
    assert!(replay["currentFrame"].is_null());
    assert!(replay["error"].as_str().unwrap().contains("Race not found"));
}

#[tokio::test]
async fn test_undecodable_payload_is_unprocessable() {
    let (app, _state, _dir) = app_serving(Some("{\"frames\": 42}"));

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/replay/load?wait=true",
        json!({"year": 2024, "round": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_data_after_load() {
    let (app, _state, _dir) = app();
    load_and_wait(&app).await;

    let (status, body) = get(&app, "/api/replay/data").await;
    assert_eq!(status, StatusCode::OK);
    let data: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(data["frames"].as_array().unwrap().len(), 3);
    assert_eq!(data["frames"][2]["drivers"]["VER"]["drs"], 12);
}

// ==================== POST /api/replay/refresh ====================

#[tokio::test]
async fn test_refresh_without_race_is_404() {
    let (app, _state, _dir) = app();
    let (status, _) = send_json(&app, "POST", "/api/replay/refresh", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refresh_bypasses_cache() {
    let (app, _state, _dir) = app();
    load_and_wait(&app).await;

    let again = load_and_wait(&app).await;
    assert_eq!(again["replay"]["isFromCache"], true);

    let (status, body) = send_json(&app, "POST", "/api/replay/refresh?wait=true", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["replay"]["isFromCache"], false);
    assert_eq!(body["replay"]["loadingStage"], "ready");
}

// ==================== POST /api/replay/control ====================

#[tokio::test]
async fn test_control_requires_loaded_race() {
    let (app, _state, _dir) = app();
    let (status, _) = control(&app, json!({"action": "seek", "value": 1})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_seek_clamps_into_range() {
    let (app, _state, _dir) = app();
    load_and_wait(&app).await;

    let (status, _) = control(&app, json!({"action": "seek", "value": -5})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot(&app).await["playback"]["currentFrameIndex"], 0);

    control(&app, json!({"action": "seek", "value": 103})).await;
    let replay = snapshot(&app).await;
    assert_eq!(replay["playback"]["currentFrameIndex"], 2);
    assert_eq!(replay["playback"]["currentTime"], 2.0);
    assert_eq!(replay["playback"]["isPlaying"], false);
}

#[tokio::test]
async fn test_seek_lap_and_time() {
    let (app, _state, _dir) = app();
    load_and_wait(&app).await;

    let (status, _) = control(&app, json!({"action": "seek_lap", "value": 2})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot(&app).await["playback"]["currentFrameIndex"], 2);

    let (status, _) = control(&app, json!({"action": "seek_lap", "value": 7})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(snapshot(&app).await["playback"]["currentFrameIndex"], 2);

    control(&app, json!({"action": "seek_time", "value": 1.5})).await;
    let replay = snapshot(&app).await;
    assert_eq!(replay["playback"]["currentFrameIndex"], 1);
    assert_eq!(replay["playback"]["currentTime"], 1.5);
}

#[tokio::test]
async fn test_speed_validation() {
    let (app, _state, _dir) = app();
    load_and_wait(&app).await;

    let (status, body) = control(&app, json!({"action": "speed", "value": 5})).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "speed_set");
    assert_eq!(body["playback"]["playbackSpeed"], 5.0);

    let (status, _) = control(&app, json!({"action": "speed", "value": 0})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = control(&app, json!({"action": "speed"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_action() {
    let (app, _state, _dir) = app();
    let (status, body) = control(&app, json!({"action": "rewind"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Unknown action"));
}

#[tokio::test]
async fn test_toggle_and_pause() {
    let (app, state, _dir) = app();
    load_and_wait(&app).await;

    let (_, body) = control(&app, json!({"action": "toggle"})).await;
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "playing");
    assert!(state.playback_cancel.read().await.is_some());

    let (_, body) = control(&app, json!({"action": "pause"})).await;
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "paused");
    assert_eq!(body["playback"]["isPlaying"], false);
    assert!(state.playback_cancel.read().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rapid_play_pause_keeps_clock_running() {
    let (app, state, _dir) = app();
    load_and_wait(&app).await;

    let requests: Vec<_> = (0..40)
        .map(|i| {
            let app = app.clone();
            let action = if i % 2 == 0 { "pause" } else { "play" };
            tokio::spawn(async move { control(&app, json!({"action": action})).await })
        })
        .collect();
    for request in requests {
        request.await.unwrap();
    }

    control(&app, json!({"action": "play"})).await;
    let before = snapshot(&app).await["playback"]["currentTime"].as_f64().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let replay = snapshot(&app).await;

    assert_eq!(replay["playback"]["isPlaying"], true);
    assert!(replay["playback"]["currentTime"].as_f64().unwrap() > before);
    let clock = state.playback_cancel.read().await;
    assert!(clock.as_ref().is_some_and(|token| !token.is_cancelled()));
}

#[tokio::test]
async fn test_driver_selection_and_head_to_head() {
    let (app, _state, _dir) = app();
    load_and_wait(&app).await;

    control(&app, json!({"action": "select", "driver": "HAM"})).await;
    control(&app, json!({"action": "compare", "driver": "VER"})).await;

    let replay = snapshot(&app).await;
    assert_eq!(replay["playback"]["selectedDriver"], "HAM");
    assert_eq!(replay["playback"]["comparisonDriver"], "VER");
    assert_eq!(replay["headToHead"]["leader"], "VER");
    assert_eq!(replay["headToHead"]["position_diff"], 1);
    // Laps this short are too sparse for a ghost
    assert!(replay["ghostFrame"].is_null());

    control(&app, json!({"action": "select", "driver": null})).await;
    let replay = snapshot(&app).await;
    assert!(replay["playback"]["selectedDriver"].is_null());
    assert!(replay["headToHead"].is_null());
}

// ==================== GET /api/replay/laps/:driver ====================

#[tokio::test]
async fn test_laps_for_driver() {
    let (app, _state, _dir) = app();
    load_and_wait(&app).await;

    let (status, body) = get(&app, "/api/replay/laps/VER").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["driver"], "VER");
    assert!(body["laps"].is_array());

    let (status, _) = get(&app, "/api/replay/laps/XXX").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ==================== DELETE /api/replay ====================

#[tokio::test]
async fn test_delete_unloads() {
    let (app, _state, _dir) = app();

    let (status, _) = send_json(&app, "DELETE", "/api/replay", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    load_and_wait(&app).await;
    let (status, _) = send_json(&app, "DELETE", "/api/replay", json!({})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let replay = snapshot(&app).await;
    assert!(replay["year"].is_null());
    assert_eq!(replay["loadingStage"], "init");
}

// ==================== GET /api/race ====================

#[tokio::test]
async fn test_synthetic_race_endpoint() {
    let (app, _state, _dir) = app();

    let (status, body) = get(&app, "/api/race?year=2023&round=4").await;
    assert_eq!(status, StatusCode::OK);
    let data: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(data["metadata"]["year"], 2023);
    assert_eq!(data["metadata"]["round"], 4);
    assert_eq!(data["driver_colors"].as_object().unwrap().len(), 10);
    assert!(!data["frames"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_synthetic_race_requires_key() {
    let (app, _state, _dir) = app();
    let (status, _) = get(&app, "/api/race?year=2023").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
