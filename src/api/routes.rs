//! API route definitions.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::debug;

use super::state::AppState;
use crate::config::DetectionConfig;
use crate::source::live::check_hardware;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/signals", get(signals))
        .route("/anomalies", get(anomalies))
        .route("/spectrogram", get(spectrogram))
        .route("/check-hardware", get(hardware))
        .route("/clear-anomalies", post(clear_anomalies))
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.monitor.status().await))
}

/// The body is optional; an empty body starts with the default configuration.
async fn start(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let config = if body.iter().all(u8::is_ascii_whitespace) {
        DetectionConfig::default()
    } else {
        serde_json::from_slice::<DetectionConfig>(&body).map_err(|e| {
            debug!(error = %e, "rejected start request");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid configuration: {e}") })),
            )
        })?
    };

    let status = state.monitor.start(config).await;
    Ok(Json(json!({ "status": status })))
}

async fn stop(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": state.monitor.stop().await }))
}

async fn signals(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "signals": state.monitor.recent_samples().await }))
}

async fn anomalies(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "anomalies": state.monitor.recent_anomalies().await }))
}

async fn spectrogram(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.monitor.spectrogram().await))
}

async fn hardware(State(state): State<AppState>) -> Json<Value> {
    let config = state.monitor.config().await;
    let report = check_hardware(state.receiver.as_deref(), &config, &state.dataset_path).await;
    Json(json!(report))
}

async fn clear_anomalies(State(state): State<AppState>) -> Json<Value> {
    state.monitor.clear_anomalies().await;
    Json(json!({ "status": "cleared" }))
}
