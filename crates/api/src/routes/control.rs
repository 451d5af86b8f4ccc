//! Manual control route

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use rover_core::IngressOutcome;

use crate::AppState;

/// Apply one operator command.
///
/// The body is taken raw so malformed commands reach the ingress and are
/// reported as ignored instead of being rejected by the extractor.
pub async fn control(
    State(state): State<Arc<AppState>>,
    body: String,
) -> (StatusCode, Json<IngressOutcome>) {
    let outcome = state.ingress.handle_json(&body).await;
    let status = match outcome {
        IngressOutcome::Applied { .. } => StatusCode::OK,
        IngressOutcome::Ignored { .. } => StatusCode::BAD_REQUEST,
        IngressOutcome::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(outcome))
}
