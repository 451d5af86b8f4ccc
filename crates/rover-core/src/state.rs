//! Shared rover state
//!
//! Latest distance, machine status and detections. Distance and status have
//! one writer (the automation loop); detections are replaced wholesale by
//! the frame pipeline. Readers take a cloned snapshot and never hold the
//! lock across work.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use detector::Detection;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Observable machine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoverStatus {
    #[default]
    Idle,
    Scanning,
    Spraying,
    ObstacleBlocked,
    SensorFault,
}

impl RoverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoverStatus::Idle => "Idle",
            RoverStatus::Scanning => "Scanning",
            RoverStatus::Spraying => "Spraying",
            RoverStatus::ObstacleBlocked => "ObstacleBlocked",
            RoverStatus::SensorFault => "SensorFault",
        }
    }
}

/// One wholesale detections replacement
#[derive(Debug, Clone)]
pub struct DetectionSet {
    pub detections: Arc<Vec<Detection>>,

    /// Increments on every replacement; 0 means never produced
    pub generation: u64,

    /// When the set was produced
    pub produced_at: Option<Instant>,
}

impl DetectionSet {
    /// Age of the set, `None` if nothing was ever produced
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.produced_at
            .map(|produced| now.saturating_duration_since(produced))
    }
}

impl Default for DetectionSet {
    fn default() -> Self {
        Self {
            detections: Arc::new(Vec::new()),
            generation: 0,
            produced_at: None,
        }
    }
}

/// Point-in-time copy of the shared state
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    /// `None` when the last read failed
    pub distance_cm: Option<f64>,
    pub distance_at: Option<Instant>,
    pub status: RoverStatus,
    pub detections: DetectionSet,
}

#[derive(Debug, Default)]
struct Inner {
    distance_cm: Option<f64>,
    distance_at: Option<Instant>,
    status: RoverStatus,
    detections: DetectionSet,
}

/// Concurrently shared rover state
#[derive(Debug, Default)]
pub struct RoverState {
    inner: RwLock<Inner>,
}

impl RoverState {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a ranging result; `None` marks the distance unknown
    pub fn update_distance(&self, distance_cm: Option<f64>) {
        let mut inner = self.write();
        inner.distance_cm = distance_cm;
        inner.distance_at = Some(Instant::now());
    }

    pub fn update_status(&self, status: RoverStatus) {
        self.write().status = status;
    }

    /// Replace the detections wholesale, returning the new generation
    pub fn replace_detections(&self, detections: Vec<Detection>) -> u64 {
        let mut inner = self.write();
        let generation = inner.detections.generation + 1;
        inner.detections = DetectionSet {
            detections: Arc::new(detections),
            generation,
            produced_at: Some(Instant::now()),
        };
        generation
    }

    pub fn status(&self) -> RoverStatus {
        self.read().status
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.read();
        StateSnapshot {
            distance_cm: inner.distance_cm,
            distance_at: inner.distance_at,
            status: inner.status,
            detections: inner.detections.clone(),
        }
    }
}
