//! Spray decision engine

use std::time::Duration;

use detector::Detection;
use serde::{Deserialize, Serialize};

/// Control loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Closest distance at which spraying is effective (cm)
    pub min_spray_distance_cm: f64,

    /// Farthest distance at which spraying is effective (cm)
    pub max_spray_distance_cm: f64,

    /// Below this the rover is blocked and never sprays (cm)
    pub obstacle_stop_distance_cm: f64,

    /// Automation cycle period (ms)
    pub period_ms: u64,

    /// Detections older than this are treated as absent (ms)
    pub detection_max_age_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            min_spray_distance_cm: 20.0,
            max_spray_distance_cm: 100.0,
            obstacle_stop_distance_cm: 10.0,
            period_ms: 500,
            detection_max_age_ms: 2000,
        }
    }
}

impl ControlConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn detection_max_age(&self) -> Duration {
        Duration::from_millis(self.detection_max_age_ms)
    }
}

/// Spray verdict for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Spray,
    WithholdTooClose,
    WithholdOutOfRange,
    WithholdNoTarget,
}

/// Decide whether to spray.
///
/// Checked in priority order: unknown distance, obstacle, no target, range.
/// An obstacle always wins over a target, and an unknown distance never
/// sprays nor reports the path as blocked.
pub fn decide(distance_cm: Option<f64>, detections: &[Detection], config: &ControlConfig) -> Decision {
    let distance = match distance_cm {
        Some(d) if d.is_finite() => d,
        _ => return Decision::WithholdOutOfRange,
    };

    if distance < config.obstacle_stop_distance_cm {
        return Decision::WithholdTooClose;
    }
    if detections.is_empty() {
        return Decision::WithholdNoTarget;
    }
    if (config.min_spray_distance_cm..=config.max_spray_distance_cm).contains(&distance) {
        Decision::Spray
    } else {
        Decision::WithholdOutOfRange
    }
}
