//! Excess-green vegetation detector
//!
//! Classic model-free plant segmentation: a pixel is vegetation when
//! `2G - R - B` exceeds a threshold. All vegetation pixels are reported as
//! one "plant" box whose confidence is the green fill ratio of that box.

use camera_capture::{VideoFrame, RGB_CHANNELS};
use tracing::debug;

use crate::detection::{BoundingBox, Detection, DetectionFilter};
use crate::{DetectionError, DetectionPort, DetectorConfig};

/// Class id reported for vegetation patches
const PLANT_CLASS: u32 = 0;

pub struct VegetationIndexDetector {
    threshold: i32,
    min_pixels: u32,
    filter: DetectionFilter,
    label: String,
}

impl VegetationIndexDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            threshold: config.vegetation_threshold,
            min_pixels: config.min_vegetation_pixels.max(1),
            filter: DetectionFilter::new(config),
            label: config.label_for(PLANT_CLASS),
        }
    }
}

fn excess_green(pixel: &[u8]) -> i32 {
    2 * i32::from(pixel[1]) - i32::from(pixel[0]) - i32::from(pixel[2])
}

impl DetectionPort for VegetationIndexDetector {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<Detection>, DetectionError> {
        if !frame.has_valid_layout() {
            return Err(DetectionError::InvalidFrame);
        }

        let mut count = 0u32;
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);

        for (i, pixel) in frame.data.chunks_exact(RGB_CHANNELS).enumerate() {
            if excess_green(pixel) <= self.threshold {
                continue;
            }
            let x = (i as u32) % frame.width;
            let y = (i as u32) / frame.width;
            count += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        if count < self.min_pixels {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::new(
            min_x as f32,
            min_y as f32,
            (max_x + 1) as f32,
            (max_y + 1) as f32,
        );
        let confidence = (count as f32 / bbox.area().max(1.0)).min(1.0);
        debug!(
            "Frame {}: {} vegetation pixels, fill {:.2}",
            frame.sequence, count, confidence
        );

        if !self.filter.admits(PLANT_CLASS, confidence) {
            return Ok(Vec::new());
        }

        Ok(vec![Detection {
            label: self.label.clone(),
            confidence,
            bbox,
            class_id: PLANT_CLASS,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOIL: [u8; 3] = [110, 82, 56];
    const LEAF: [u8; 3] = [46, 139, 60];

    fn frame_with_patch(width: u32, height: u32, patch: (u32, u32, u32, u32)) -> VideoFrame {
        let (px, py, pw, ph) = patch;
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let inside = x >= px && x < px + pw && y >= py && y < py + ph;
                data.extend_from_slice(if inside { &LEAF } else { &SOIL });
            }
        }
        VideoFrame::new(data, width, height, 0, 0)
    }

    #[test]
    fn test_finds_green_patch() {
        let detector = VegetationIndexDetector::new(&DetectorConfig::default());
        let frame = frame_with_patch(64, 48, (10, 20, 12, 8));

        let detections = detector.detect(&frame).unwrap();
        assert_eq!(detections.len(), 1);
        let plant = &detections[0];
        assert_eq!(plant.label, "plant");
        assert_eq!(plant.bbox, BoundingBox::new(10.0, 20.0, 22.0, 28.0));
        assert!((plant.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bare_soil_has_no_targets() {
        let detector = VegetationIndexDetector::new(&DetectorConfig::default());
        let frame = frame_with_patch(32, 32, (0, 0, 0, 0));
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_small_patch_ignored() {
        let detector = VegetationIndexDetector::new(&DetectorConfig::default());
        let frame = frame_with_patch(32, 32, (4, 4, 5, 5));
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_plant_class_must_be_targeted() {
        let config = DetectorConfig {
            target_classes: vec![1],
            ..Default::default()
        };
        let detector = VegetationIndexDetector::new(&config);
        let frame = frame_with_patch(64, 48, (10, 20, 12, 8));
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let detector = VegetationIndexDetector::new(&DetectorConfig::default());
        let frame = VideoFrame::new(vec![0; 10], 4, 4, 0, 0);
        assert!(matches!(detector.detect(&frame), Err(DetectionError::InvalidFrame)));
    }
}
