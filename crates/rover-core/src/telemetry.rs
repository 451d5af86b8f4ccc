//! Telemetry and log event fan-out
//!
//! Events go to every live subscriber (WebSocket clients) over a broadcast
//! channel and are dropped when nobody listens. The latest snapshot is also
//! kept for polling readers.

use chrono::{DateTime, Utc};
use detector::Detection;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::decision::Decision;
use crate::state::RoverStatus;

/// Broadcast buffer; slow subscribers lag and skip older events
const EVENT_CAPACITY: usize = 64;

/// One automation cycle as seen by observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,

    /// `null` when the sensor failed this cycle
    pub distance_cm: Option<f64>,

    pub status: RoverStatus,

    pub detections: Vec<Detection>,

    /// Whether the detections were recent enough to act on
    pub detections_fresh: bool,

    /// Age of the detections, `null` if none were ever produced
    pub detections_age_ms: Option<u64>,

    pub detections_generation: u64,

    pub decision: Decision,

    /// Automation cycle counter
    pub cycle: u64,
}

/// Event pushed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RoverEvent {
    Telemetry(TelemetrySnapshot),
    Log { msg: String },
}

/// Fan-out point for telemetry and log events
pub struct TelemetryHub {
    events: broadcast::Sender<RoverEvent>,
    latest: watch::Sender<Option<TelemetrySnapshot>>,
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryHub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (latest, _) = watch::channel(None);
        Self { events, latest }
    }

    /// Store and broadcast a snapshot
    pub fn publish(&self, snapshot: TelemetrySnapshot) {
        self.latest.send_replace(Some(snapshot.clone()));
        // No subscribers is not an error
        let _ = self.events.send(RoverEvent::Telemetry(snapshot));
    }

    /// Broadcast a human-readable log line
    pub fn log(&self, msg: impl Into<String>) {
        let msg = msg.into();
        info!("{}", msg);
        if self.events.send(RoverEvent::Log { msg }).is_err() {
            debug!("Log event dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoverEvent> {
        self.events.subscribe()
    }

    pub fn latest(&self) -> Option<TelemetrySnapshot> {
        self.latest.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}
