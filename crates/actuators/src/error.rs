//! Actuator Error Types

use thiserror::Error;

/// Errors raised by the spray actuator and its relay
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// GPIO line could not be exported, configured or written
    #[error("GPIO error on pin {pin}: {reason}")]
    Gpio { pin: u32, reason: String },

    /// Relay refused to switch
    #[error("Relay error: {0}")]
    Relay(String),
}

/// Errors raised by the motion driver
#[derive(Debug, Error)]
pub enum MotionError {
    /// Speed outside [0, 1]
    #[error("Invalid speed: {0}")]
    InvalidSpeed(f32),

    /// Pin or PWM write failed
    #[error("Motor hardware error: {0}")]
    Hardware(String),
}

impl From<std::io::Error> for MotionError {
    fn from(err: std::io::Error) -> Self {
        MotionError::Hardware(err.to_string())
    }
}
