//! Detector configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// ONNX model path (YOLOv8 export); vegetation index when unset
    pub model_path: Option<PathBuf>,

    /// Square model input size (pixels)
    pub input_size: u32,

    /// Minimum confidence for a detection to be reported
    pub confidence_threshold: f32,

    /// IoU above which overlapping boxes of one class are merged
    pub iou_threshold: f32,

    /// Class ids that trigger spraying (e.g. 0 = plant, 1 = pest)
    pub target_classes: Vec<u32>,

    /// Class names indexed by class id
    pub class_names: Vec<String>,

    /// Excess-green index above which a pixel counts as vegetation
    pub vegetation_threshold: i32,

    /// Minimum vegetation pixels before a patch is reported
    pub min_vegetation_pixels: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 640,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            target_classes: vec![0, 1],
            class_names: vec!["plant".to_string(), "pest".to_string()],
            vegetation_threshold: 40,
            min_vegetation_pixels: 64,
        }
    }
}

impl DetectorConfig {
    /// Display name of a class id
    pub fn label_for(&self, class_id: u32) -> String {
        self.class_names
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}
