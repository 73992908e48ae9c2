//! HTTP route definitions

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::{Camp, MatchStatus, Stage};
use crate::link::frame::{self, FrameError};
use crate::util::time::{unix_millis, uptime_secs};
use crate::ws::handler::ws_handler;
use crate::ws::protocol::MatchSnapshot;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let cors = match state.config.client_origin.as_deref() {
        Some(origins) => {
            let allowed: Vec<header::HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/frame/info", get(frame_info_handler))
        .route("/frame/status", get(frame_status_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    match_status: MatchStatus,
    stage: Stage,
    score_a: f64,
    score_b: f64,
    last_tick_ms: i64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.engine.lock();
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        match_status: engine.status(),
        stage: engine.stage(),
        score_a: engine.score(Camp::A),
        score_b: engine.score(Camp::B),
        last_tick_ms: engine.last_tick_duration(),
    })
}

// ============================================================================
// Snapshot endpoint (JSON, for overlays and the operator console)
// ============================================================================

async fn snapshot_handler(State(state): State<AppState>) -> Json<MatchSnapshot> {
    Json(state.engine.lock().snapshot(unix_millis()))
}

// ============================================================================
// Controller frame endpoints (binary, fetched by the serial gateway)
// ============================================================================

#[derive(Deserialize)]
struct FrameQuery {
    camp: Camp,
}

async fn frame_info_handler(
    Query(query): Query<FrameQuery>,
    State(state): State<AppState>,
) -> Response {
    let snapshot = state.engine.lock().snapshot(unix_millis());
    frame_response(frame::encode_game_info(&snapshot, query.camp))
}

async fn frame_status_handler(
    Query(query): Query<FrameQuery>,
    State(state): State<AppState>,
) -> Response {
    let snapshot = state.engine.lock().snapshot(unix_millis());
    frame_response(frame::encode_status(&snapshot, query.camp))
}

/// Wire-format violations are rejected outright, never truncated
fn frame_response(result: Result<Bytes, FrameError>) -> Response {
    match result {
        Ok(payload) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            payload,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
