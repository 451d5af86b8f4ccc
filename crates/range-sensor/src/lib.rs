//! Ultrasonic Ranging
//!
//! This crate provides the distance port used by the control loop, with an
//! implementation backed by the Linux IIO subsystem (the `srf04` driver for
//! HC-SR04 style sensors) and a simulated one for bench runs.

mod error;
mod iio;
mod simulated;

pub use error::SensorError;
pub use iio::IioRangeSensor;
pub use simulated::SimulatedRangeSensor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default upper bound on a single read
const DEFAULT_TIMEOUT_MS: u64 = 100;

/// A validated distance reading
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Distance(f64);

impl Distance {
    /// Validate a raw reading against the sensor's usable range
    pub fn from_cm(cm: f64, max_range_cm: f64) -> Result<Self, SensorError> {
        if !cm.is_finite() || cm < 0.0 || cm > max_range_cm {
            return Err(SensorError::OutOfRange(cm));
        }
        Ok(Self(cm))
    }

    /// Distance in centimeters
    pub fn cm(self) -> f64 {
        self.0
    }
}

/// Distance sensor capability.
///
/// Implementations report failures as [`SensorError`] and never return a
/// stale value in place of a failed read.
#[async_trait]
pub trait SensorPort: Send + Sync {
    /// Take one ranging measurement
    async fn read(&self) -> Result<Distance, SensorError>;
}

/// Ranging sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// IIO device directory of the ultrasonic sensor
    pub iio_device: PathBuf,
    /// Upper bound on one read (milliseconds)
    pub timeout_ms: u64,
    /// Readings beyond this are rejected (cm)
    pub max_range_cm: f64,
    /// Lower bound of simulated readings (cm)
    pub simulated_min_cm: f64,
    /// Upper bound of simulated readings (cm)
    pub simulated_max_cm: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            iio_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_range_cm: 400.0,
            simulated_min_cm: 5.0,
            simulated_max_cm: 150.0,
        }
    }
}

impl SensorConfig {
    /// Read timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
