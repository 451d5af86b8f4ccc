//! Camera preview routes

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::sync::Arc;

use crate::AppState;

const BOUNDARY: &str = "frame";

/// Wrap one JPEG as a multipart part
fn mjpeg_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Latest annotated frame as a single JPEG
pub async fn frame(State(state): State<Arc<AppState>>) -> Response {
    let latest = state.preview.borrow().clone();
    match latest {
        Some(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg.to_vec()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no frame yet").into_response(),
    }
}

/// Annotated frames as an MJPEG stream
pub async fn video_feed(State(state): State<Arc<AppState>>) -> Response {
    let mut preview = state.preview.clone();
    // Serve the current frame right away instead of waiting for the next one
    preview.mark_changed();

    let frames = futures::stream::unfold(preview, |mut preview| async move {
        loop {
            preview.changed().await.ok()?;
            let latest = preview.borrow_and_update().clone();
            if let Some(jpeg) = latest {
                return Some((Ok::<_, std::io::Error>(mjpeg_part(&jpeg)), preview));
            }
        }
    });

    let mut closing = state.closing.clone();
    let frames = frames.take_until(async move {
        let _ = closing.wait_for(|closing| *closing).await;
    });

    (
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
        )],
        Body::from_stream(frames),
    )
        .into_response()
}
