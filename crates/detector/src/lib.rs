//! Target Detection
//!
//! Finds spray targets (plants, pests) in camera frames:
//! - YOLOv8 object detection from an ONNX model (tract)
//! - Excess-green vegetation segmentation when no model is configured
//!
//! Both apply the configured confidence threshold and target-class
//! allow-list, so callers only ever see actionable detections.

pub mod config;
pub mod detection;
pub mod onnx;
pub mod vegetation;

pub use config::DetectorConfig;
pub use detection::{non_max_suppression, BoundingBox, Detection, DetectionFilter};
pub use onnx::OnnxDetector;
pub use vegetation::VegetationIndexDetector;

use camera_capture::VideoFrame;
use thiserror::Error;
use tracing::warn;

/// Detection error types
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid frame format")]
    InvalidFrame,
}

/// Object detection capability.
///
/// Stateless per call; may be slow (model inference), so callers run it
/// off the async runtime and without holding shared locks.
pub trait DetectionPort: Send + Sync {
    /// Detect actionable targets in one frame
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<Detection>, DetectionError>;
}

/// Build the detector selected by the configuration
pub fn open(config: &DetectorConfig) -> Result<Box<dyn DetectionPort>, DetectionError> {
    match &config.model_path {
        Some(path) => Ok(Box::new(OnnxDetector::load(path, config)?)),
        None => {
            warn!("No detection model path configured. Using vegetation index detector.");
            Ok(Box::new(VegetationIndexDetector::new(config)))
        }
    }
}
