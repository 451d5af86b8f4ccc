//! WebSocket channel
//!
//! Pushes `telemetry` and `log` events to the dashboard and accepts control
//! commands, either bare (`{"action": "left"}`) or wrapped as
//! `{"event": "control", "data": {...}}`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use rover_core::{IngressOutcome, RoverEvent};

use crate::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

/// Extract the command payload from a client message
fn control_payload(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) if map.get("event").and_then(Value::as_str) == Some("control") => {
            map.get("data").map(Value::to_string).unwrap_or_default()
        }
        _ => text.to_string(),
    }
}

fn encode(event: &RoverEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            warn!("Failed to encode event: {}", e);
            None
        }
    }
}

async fn client_session(socket: WebSocket, state: Arc<AppState>) {
    info!("Client connected");
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.telemetry.subscribe();
    let mut closing = state.closing.clone();

    let greeting = RoverEvent::Log {
        msg: "Connected to Rover".to_string(),
    };
    if let Some(message) = encode(&greeting) {
        if sender.send(message).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(message) = encode(&event) {
                        if sender.send(message).await.is_err() {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Client lagging, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let outcome = state.ingress.handle_json(&control_payload(&text)).await;
                    if let IngressOutcome::Ignored { reason } | IngressOutcome::Failed { reason } = outcome {
                        let reply = RoverEvent::Log { msg: format!("Command rejected: {}", reason) };
                        if let Some(message) = encode(&reply) {
                            if sender.send(message).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket receive error: {}", e);
                    break;
                }
            },
            _ = async { closing.wait_for(|closing| *closing).await.map(|_| ()) } => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    info!("Client disconnected");
}
