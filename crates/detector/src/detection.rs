//! Detection results, filtering and non-maximum suppression

use serde::{Deserialize, Serialize};

use crate::DetectorConfig;

/// Axis-aligned box in frame pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box from YOLO centre/size format
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Clamp to a `width` x `height` frame
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self::new(
            self.x1.clamp(0.0, w),
            self.y1.clamp(0.0, h),
            self.x2.clamp(0.0, w),
            self.y2.clamp(0.0, h),
        )
    }
}

/// One detected target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class display name
    pub label: String,

    /// Detection confidence (0-1)
    pub confidence: f32,

    /// Bounding box in frame pixels
    #[serde(rename = "box")]
    pub bbox: BoundingBox,

    /// Model class id
    pub class_id: u32,
}

/// Confidence threshold plus target-class allow-list
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFilter {
    pub confidence_threshold: f32,
    pub target_classes: Vec<u32>,
}

impl DetectionFilter {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            target_classes: config.target_classes.clone(),
        }
    }

    /// Whether a candidate is actionable; an empty allow-list admits nothing
    pub fn admits(&self, class_id: u32, confidence: f32) -> bool {
        confidence >= self.confidence_threshold && self.target_classes.contains(&class_id)
    }
}

/// Class-wise greedy NMS, highest confidence first
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let overlaps = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
