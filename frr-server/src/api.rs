//! REST API and SSE routes

use crate::loader::LoadError;
use crate::playback;
use crate::session::ReplaySnapshot;
use crate::state::{AppState, LoadMode};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use frr_core::{RaceData, RaceKey};
use frr_sources::{generate_race, DemoConfig};
use futures::stream::{Stream, StreamExt as FuturesStreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

type ApiError = (StatusCode, String);

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/replay", get(replay_snapshot).delete(replay_delete))
        .route("/api/replay/data", get(replay_data))
        .route("/api/replay/load", post(replay_load))
        .route("/api/replay/refresh", post(replay_refresh))
        .route("/api/replay/control", post(replay_control))
        .route("/api/replay/stream", get(replay_stream))
        .route("/api/replay/laps/:driver", get(replay_laps))
        // Same-schema synthetic dataset, the loader's default fallback
        .route("/api/race", get(synthetic_race))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn load_error_response(err: LoadError) -> ApiError {
    let status = match err {
        LoadError::Unavailable { .. } => StatusCode::BAD_GATEWAY,
        LoadError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LoadError::Superseded => StatusCode::CONFLICT,
    };
    (status, err.to_string())
}

// === Session Endpoints ===

async fn replay_snapshot(State(state): State<AppState>) -> Json<ReplaySnapshot> {
    Json(state.session.read().await.snapshot())
}

async fn replay_data(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let data = state
        .session
        .read()
        .await
        .data()
        .cloned()
        .ok_or((StatusCode::NOT_FOUND, "No race loaded".to_string()))?;

    let body = serde_json::to_vec(data.as_ref())
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode race: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

#[derive(Deserialize, Default)]
struct WaitQuery {
    #[serde(default)]
    wait: bool,
}

impl WaitQuery {
    fn mode(&self) -> LoadMode {
        if self.wait {
            LoadMode::Wait
        } else {
            LoadMode::Background
        }
    }
}

#[derive(Deserialize)]
struct LoadRequest {
    year: u16,
    round: u8,
}

async fn replay_load(
    State(state): State<AppState>,
    Query(query): Query<WaitQuery>,
    Json(request): Json<LoadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = RaceKey::new(request.year, request.round);
    let mode = query.mode();
    let generation = state.load(key, mode).await.map_err(load_error_response)?;
    Ok(load_response(&state, mode, generation).await)
}

async fn replay_refresh(
    State(state): State<AppState>,
    Query(query): Query<WaitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mode = query.mode();
    let generation = state
        .refresh(mode)
        .await
        .ok_or((StatusCode::NOT_FOUND, "No race selected".to_string()))?
        .map_err(load_error_response)?;
    Ok(load_response(&state, mode, generation).await)
}

async fn load_response(state: &AppState, mode: LoadMode, generation: u64) -> impl IntoResponse {
    let snapshot = state.session.read().await.snapshot();
    let status = match mode {
        LoadMode::Wait => StatusCode::OK,
        LoadMode::Background => StatusCode::ACCEPTED,
    };
    (
        status,
        Json(serde_json::json!({
            "generation": generation,
            "replay": snapshot,
        })),
    )
}

async fn replay_delete(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if state.session.read().await.key().is_none() {
        return Err((StatusCode::NOT_FOUND, "No race selected".to_string()));
    }
    state.unload().await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ReplayControlRequest {
    action: String,
    value: Option<f64>,
    driver: Option<String>,
}

fn require_value(request: &ReplayControlRequest) -> Result<f64, ApiError> {
    request.value.ok_or((
        StatusCode::BAD_REQUEST,
        format!("Missing 'value' for {}", request.action),
    ))
}

async fn replay_control(
    State(state): State<AppState>,
    Json(request): Json<ReplayControlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = {
        let mut session = state.session.write().await;
        let was_playing = session.is_playing();
        let needs_data = matches!(
            request.action.as_str(),
            "play" | "toggle" | "seek" | "seek_lap" | "seek_time"
        );
        if needs_data && session.data().is_none() {
            return Err((StatusCode::CONFLICT, "No race loaded".to_string()));
        }

        let status = match request.action.as_str() {
            "play" => {
                session.play();
                "playing"
            }
            "pause" => {
                session.pause();
                "paused"
            }
            "toggle" => {
                if session.toggle_play() {
                    "playing"
                } else {
                    "paused"
                }
            }
            "seek" => {
                session.seek_to(require_value(&request)? as i64);
                "seeked"
            }
            "seek_time" => {
                session.seek_to_time(require_value(&request)?);
                "seeked"
            }
            "seek_lap" => {
                let lap = require_value(&request)?;
                if lap < 0.0 || !session.seek_to_lap(lap as u32) {
                    return Err((StatusCode::NOT_FOUND, format!("No frame reaches lap {}", lap)));
                }
                "seeked"
            }
            "speed" => {
                if !session.set_speed(require_value(&request)?) {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        "Speed must be a positive number".to_string(),
                    ));
                }
                "speed_set"
            }
            "select" => {
                session.select_driver(request.driver.clone());
                "selected"
            }
            "compare" => {
                session.select_comparison_driver(request.driver.clone());
                "selected"
            }
            _ => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("Unknown action: {}", request.action),
                ))
            }
        };

        // Clock changes happen under the session lock so they stay ordered
        // with the play state
        let is_playing = session.is_playing();
        if is_playing && !was_playing {
            playback::start(&state).await;
        } else if !is_playing && was_playing {
            playback::stop(&state).await;
        }
        status
    };

    let snapshot = state.publish().await;
    Ok(Json(serde_json::json!({
        "status": status,
        "playback": snapshot.playback,
    })))
}

async fn replay_laps(
    State(state): State<AppState>,
    Path(driver): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.session.read().await;
    let data = session
        .data()
        .ok_or((StatusCode::NOT_FOUND, "No race loaded".to_string()))?;
    if !data.frames.iter().any(|f| f.drivers.contains_key(&driver)) {
        return Err((StatusCode::NOT_FOUND, format!("Unknown driver: {}", driver)));
    }

    Ok(Json(serde_json::json!({
        "driver": driver,
        "laps": session.lap_times(&driver),
    })))
}

// === Stream Endpoint ===

async fn replay_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(snapshot) => match serde_json::to_string(&snapshot) {
                Ok(json) => Some(Ok(Event::default().data(json))),
                Err(e) => {
                    tracing::error!("Failed to serialize snapshot: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Broadcast stream error: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// === Synthetic Race Endpoint ===

#[derive(Deserialize)]
struct RaceQuery {
    year: u16,
    round: u8,
}

async fn synthetic_race(Query(query): Query<RaceQuery>) -> Result<Json<RaceData>, ApiError> {
    let key = RaceKey::new(query.year, query.round);
    tracing::debug!("Generating synthetic race for {}", key);
    let data = tokio::task::spawn_blocking(move || generate_race(key, &DemoConfig::default()))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(data))
}
