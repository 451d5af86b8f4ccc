//! Camera Capture Library for the Rover
//!
//! Provides pull-model frame sources for the vision pipeline.
//! Supports:
//! - Synthetic frames (no camera attached, for bench testing)
//! - Still-image replay from a directory (field recordings)
//!
//! The camera device lifecycle stays with the source; callers only ask for
//! the next frame.

pub mod frame;
pub mod replay;
pub mod synthetic;

pub use frame::{VideoFrame, RGB_CHANNELS};
pub use replay::DirectoryReplay;
pub use synthetic::SyntheticCamera;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Frame grab failed: {0}")]
    Grab(String),

    #[error("No frames available in {0}")]
    Empty(String),
}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::Open(err.to_string())
    }
}

impl From<image::ImageError> for CameraError {
    fn from(err: image::ImageError) -> Self {
        CameraError::Format(err.to_string())
    }
}

/// A source of video frames, polled by the frame pipeline.
///
/// Sources are owned by exactly one pipeline thread, so `grab` takes
/// `&mut self` and may block for up to one frame interval.
pub trait FrameSource: Send {
    /// Grab the next frame
    fn grab(&mut self) -> Result<VideoFrame, CameraError>;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

/// Which frame source to construct
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraSource {
    /// Generated frames
    #[default]
    Synthetic,
    /// Replay still images from `directory`
    Directory,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Frame source kind
    pub source: CameraSource,
    /// Image directory for replay
    pub directory: Option<PathBuf>,
    /// Frame width delivered to the detector
    pub width: u32,
    /// Frame height delivered to the detector
    pub height: u32,
    /// Target frames per second
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSource::Synthetic,
            directory: None,
            width: 640,
            height: 480,
            fps: 10,
        }
    }
}

impl CameraConfig {
    /// Delay between two grabs at the configured rate
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }
}

/// Open the frame source selected by the configuration
pub fn open(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    let source: Box<dyn FrameSource> = match config.source {
        CameraSource::Synthetic => Box::new(SyntheticCamera::new(config.width, config.height)),
        CameraSource::Directory => {
            let dir = config
                .directory
                .as_ref()
                .ok_or_else(|| CameraError::Open("camera.directory is not set".to_string()))?;
            Box::new(DirectoryReplay::open(dir, config.width, config.height)?)
        }
    };
    info!("Opened frame source: {}", source.describe());
    Ok(source)
}
