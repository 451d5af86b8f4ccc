//! Status, telemetry and metrics routes

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use rover_core::RoverStatus;

use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub rover_status: RoverStatus,
    /// `null` while the distance is unknown
    pub distance_cm: Option<f64>,
    pub detections_generation: u64,
    /// Connected WebSocket clients
    pub subscribers: usize,
}

/// Plain landing page
pub async fn banner() -> Html<&'static str> {
    Html("Rover Backend Online. <br> <a href='/video_feed'>View Raw Video Feed</a>")
}

/// Health check handler
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.state.snapshot();
    let status = match snapshot.status {
        RoverStatus::SensorFault => "degraded",
        _ => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        rover_status: snapshot.status,
        distance_cm: snapshot.distance_cm,
        detections_generation: snapshot.detections.generation,
        subscribers: state.telemetry.subscriber_count(),
    })
}

/// Latest telemetry snapshot
pub async fn latest(State(state): State<Arc<AppState>>) -> Response {
    match state.telemetry.latest() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no telemetry yet" })),
        )
            .into_response(),
    }
}

/// Prometheus exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
