//! Rover configuration
//!
//! Loaded once at startup: optional TOML file, then `ROVER_`-prefixed
//! environment overrides (`ROVER_CONTROL__PERIOD_MS=250`), then validated.
//! Read-only for the rest of the process.

use std::net::SocketAddr;
use std::path::Path;

use actuators::{MotorConfig, SprinklerConfig};
use camera_capture::{CameraConfig, CameraSource};
use config::{Config, Environment, File};
use detector::DetectorConfig;
use range_sensor::SensorConfig;
use rover_core::ControlConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "rover";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which hardware sits behind the ports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareBackend {
    /// Random sensor, in-memory relay, logging motors
    #[default]
    Simulated,
    /// IIO sensor, sysfs GPIO relay and motor driver
    Sysfs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub backend: HardwareBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete rover configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub hardware: HardwareConfig,
    pub sensor: SensorConfig,
    pub sprinkler: SprinklerConfig,
    pub motors: MotorConfig,
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub control: ControlConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(reason.into())
}

fn rover_environment() -> Environment {
    Environment::with_prefix("ROVER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("detector.target_classes")
        .with_list_parse_key("detector.class_names")
}

impl RoverConfig {
    /// Load from `path` (or `rover.toml` if present) plus environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, rover_environment())
    }

    fn load_with(path: Option<&Path>, environment: Environment) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: RoverConfig = Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let control = &self.control;
        let distances = [
            control.min_spray_distance_cm,
            control.max_spray_distance_cm,
            control.obstacle_stop_distance_cm,
        ];
        if distances.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(invalid("control distances must be finite and non-negative"));
        }
        if control.min_spray_distance_cm > control.max_spray_distance_cm {
            return Err(invalid(format!(
                "control.min_spray_distance_cm ({}) exceeds control.max_spray_distance_cm ({})",
                control.min_spray_distance_cm, control.max_spray_distance_cm
            )));
        }
        if control.period_ms == 0 {
            return Err(invalid("control.period_ms must be non-zero"));
        }

        if self.sprinkler.spray_duration_ms == 0 {
            return Err(invalid("sprinkler.spray_duration_ms must be non-zero"));
        }
        if self.sprinkler.spray_cooldown_ms < self.sprinkler.spray_duration_ms {
            return Err(invalid(format!(
                "sprinkler.spray_cooldown_ms ({}) is shorter than sprinkler.spray_duration_ms ({})",
                self.sprinkler.spray_cooldown_ms, self.sprinkler.spray_duration_ms
            )));
        }

        if self.sensor.timeout_ms == 0 {
            return Err(invalid("sensor.timeout_ms must be non-zero"));
        }
        if self.sensor.max_range_cm.is_nan() || self.sensor.max_range_cm <= 0.0 {
            return Err(invalid("sensor.max_range_cm must be positive"));
        }
        if self.sensor.simulated_min_cm > self.sensor.simulated_max_cm {
            return Err(invalid("sensor.simulated_min_cm exceeds sensor.simulated_max_cm"));
        }

        let detector = &self.detector;
        if !(0.0..=1.0).contains(&detector.confidence_threshold) {
            return Err(invalid("detector.confidence_threshold must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&detector.iou_threshold) {
            return Err(invalid("detector.iou_threshold must be within [0, 1]"));
        }
        if detector.input_size == 0 {
            return Err(invalid("detector.input_size must be non-zero"));
        }

        let camera = &self.camera;
        if camera.width == 0 || camera.height == 0 || camera.fps == 0 {
            return Err(invalid("camera width, height and fps must be non-zero"));
        }
        if camera.source == CameraSource::Directory && camera.directory.is_none() {
            return Err(invalid("camera.directory is required for the directory source"));
        }

        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| invalid(format!("server.bind '{}': {}", self.server.bind, e)))?;

        Ok(())
    }
}
