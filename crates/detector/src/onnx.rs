//! YOLOv8 detector on an ONNX model (tract)

use std::path::Path;
use std::time::Instant;

use camera_capture::VideoFrame;
use image::imageops::FilterType;
use tract_onnx::prelude::*;
use tracing::{debug, error, info};

use crate::detection::{non_max_suppression, BoundingBox, Detection, DetectionFilter};
use crate::{DetectionError, DetectionPort, DetectorConfig};

/// Object detector running a YOLOv8 export.
///
/// Expects the standard output layout `[1, 4 + classes, anchors]` where the
/// first four rows are centre-x, centre-y, width and height in model input
/// pixels and the remaining rows are per-class scores.
pub struct OnnxDetector {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    filter: DetectionFilter,
    config: DetectorConfig,
}

impl OnnxDetector {
    /// Load and optimise the model
    pub fn load(path: &Path, config: &DetectorConfig) -> Result<Self, DetectionError> {
        info!("Loading detection model from {}", path.display());
        let size = config.input_size as usize;

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                error!("Failed to load detection model: {}", e);
                DetectionError::ModelLoad(e.to_string())
            })?;

        Ok(Self {
            model,
            input_size: config.input_size,
            filter: DetectionFilter::new(config),
            config: config.clone(),
        })
    }

    /// Resize to the model input and build a normalised NCHW tensor
    fn preprocess(&self, frame: &VideoFrame) -> Result<Tensor, DetectionError> {
        let image = frame.to_image().ok_or(DetectionError::InvalidFrame)?;
        let resized = image::imageops::resize(
            &image,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );

        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
        });
        Ok(input.into())
    }
}

/// Decode raw YOLOv8 output into filtered, frame-space detections
fn decode_predictions(
    output: &Tensor,
    input_size: u32,
    frame_width: u32,
    frame_height: u32,
    filter: &DetectionFilter,
    config: &DetectorConfig,
) -> Result<Vec<Detection>, DetectionError> {
    let view = output
        .to_array_view::<f32>()
        .map_err(|e| DetectionError::Inference(e.to_string()))?
        .into_dimensionality::<tract_ndarray::Ix3>()
        .map_err(|e| DetectionError::Inference(format!("unexpected output rank: {}", e)))?;

    let (_, attributes, anchors) = view.dim();
    if attributes < 5 {
        return Err(DetectionError::Inference(format!(
            "output has {} attributes, expected at least 5",
            attributes
        )));
    }

    let scale_x = frame_width as f32 / input_size as f32;
    let scale_y = frame_height as f32 / input_size as f32;

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (4..attributes)
            .map(|row| (row - 4, view[[0, row, anchor]]))
            .fold((0usize, f32::MIN), |best, current| {
                if current.1 > best.1 {
                    current
                } else {
                    best
                }
            });

        let class_id = class_id as u32;
        if !filter.admits(class_id, score) {
            continue;
        }

        let bbox = BoundingBox::from_center(
            view[[0, 0, anchor]] * scale_x,
            view[[0, 1, anchor]] * scale_y,
            view[[0, 2, anchor]] * scale_x,
            view[[0, 3, anchor]] * scale_y,
        )
        .clamp_to(frame_width, frame_height);

        candidates.push(Detection {
            label: config.label_for(class_id),
            confidence: score.clamp(0.0, 1.0),
            bbox,
            class_id,
        });
    }

    Ok(non_max_suppression(candidates, config.iou_threshold))
}

impl DetectionPort for OnnxDetector {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<Detection>, DetectionError> {
        let start = Instant::now();
        let input = self.preprocess(frame)?;

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| DetectionError::Inference("model produced no outputs".to_string()))?;

        let detections = decode_predictions(
            output,
            self.input_size,
            frame.width,
            frame.height,
            &self.filter,
            &self.config,
        )?;
        debug!(
            "Frame {}: {} detections in {}ms",
            frame.sequence,
            detections.len(),
            start.elapsed().as_millis()
        );
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_fails_to_load() {
        let result = OnnxDetector::load(Path::new("/nonexistent/yolov8n.onnx"), &DetectorConfig::default());
        assert!(matches!(result, Err(DetectionError::ModelLoad(_))));
    }

    /// Build a `[1, 4 + classes, anchors]` tensor from per-anchor rows
    fn yolo_output(anchors: &[[f32; 6]]) -> Tensor {
        let n = anchors.len();
        tract_ndarray::Array3::from_shape_fn((1, 6, n), |(_, row, anchor)| anchors[anchor][row]).into()
    }

    #[test]
    fn test_decode_scales_filters_and_suppresses() {
        let config = DetectorConfig {
            input_size: 100,
            target_classes: vec![0],
            ..Default::default()
        };
        let filter = DetectionFilter::new(&config);

        // cx, cy, w, h, plant score, pest score
        let output = yolo_output(&[
            [50.0, 50.0, 20.0, 10.0, 0.90, 0.05],
            [51.0, 50.0, 20.0, 10.0, 0.70, 0.05],
            [10.0, 10.0, 4.0, 4.0, 0.30, 0.10],
            [80.0, 80.0, 10.0, 10.0, 0.10, 0.95],
        ]);

        let detections = decode_predictions(&output, 100, 200, 100, &filter, &config).unwrap();
        assert_eq!(detections.len(), 1);

        let plant = &detections[0];
        assert_eq!(plant.label, "plant");
        assert_eq!(plant.class_id, 0);
        assert!((plant.confidence - 0.9).abs() < 1e-6);
        assert!((plant.bbox.x1 - 80.0).abs() < 1e-4);
        assert!((plant.bbox.x2 - 120.0).abs() < 1e-4);
        assert!((plant.bbox.y1 - 45.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_rejects_bad_layout() {
        let config = DetectorConfig::default();
        let filter = DetectionFilter::new(&config);
        let output: Tensor = tract_ndarray::Array3::<f32>::zeros((1, 3, 8)).into();
        assert!(matches!(
            decode_predictions(&output, 640, 640, 480, &filter, &config),
            Err(DetectionError::Inference(_))
        ));
    }
}
