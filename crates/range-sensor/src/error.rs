//! Ranging Error Types

use thiserror::Error;

/// Errors that can occur while taking a distance reading
#[derive(Debug, Error)]
pub enum SensorError {
    /// No echo within the read timeout
    #[error("Timeout waiting for ranging echo after {0}ms")]
    Timeout(u64),

    /// Reading outside the sensor's usable range
    #[error("Reading out of range: {0}cm")]
    OutOfRange(f64),

    /// Device reported an error or could not be accessed
    #[error("Ranging hardware error: {0}")]
    Hardware(String),

    /// Device returned something that is not a number
    #[error("Invalid reading: {0}")]
    InvalidReading(String),
}

impl From<std::io::Error> for SensorError {
    fn from(err: std::io::Error) -> Self {
        SensorError::Hardware(err.to_string())
    }
}
