//! Camera-paced frame pipeline
//!
//! Runs on a dedicated thread: grab, detect, replace the shared detections,
//! then publish an annotated JPEG preview. Detection may take longer than a
//! frame interval; the thread simply falls behind and the automation loop
//! sees older detections, which telemetry marks as stale.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use camera_capture::{FrameSource, VideoFrame};
use detector::{Detection, DetectionPort};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::state::RoverState;

/// Encoded JPEG preview frame
pub type JpegFrame = Arc<Vec<u8>>;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Box outline thickness (px)
const BOX_THICKNESS: u32 = 2;

/// Draw detection boxes onto a frame
pub fn annotate(image: &mut RgbImage, detections: &[Detection]) {
    let (width, height) = image.dimensions();
    for detection in detections {
        let bbox = detection.bbox.clamp_to(width, height);
        for inset in 0..BOX_THICKNESS {
            let x = bbox.x1 as i32 + inset as i32;
            let y = bbox.y1 as i32 + inset as i32;
            let w = (bbox.width() as u32).saturating_sub(2 * inset);
            let h = (bbox.height() as u32).saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w, h), BOX_COLOR);
        }
    }
}

/// Annotate and JPEG-encode one frame
pub fn render_preview(frame: &VideoFrame, detections: &[Detection]) -> Option<Vec<u8>> {
    let mut image = frame.to_image()?;
    annotate(&mut image, detections);

    let mut buffer = Vec::new();
    match DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg) {
        Ok(()) => Some(buffer),
        Err(e) => {
            warn!("Preview encoding failed: {}", e);
            None
        }
    }
}

/// Detect on one frame and publish the result to the shared state
pub fn process_frame(
    frame: &VideoFrame,
    detector: &dyn DetectionPort,
    state: &RoverState,
) -> Vec<Detection> {
    let detections = match detector.detect(frame) {
        Ok(detections) => detections,
        Err(e) => {
            warn!("Detection failed on frame {}: {}", frame.sequence, e);
            counter!("rover_detection_failures_total").increment(1);
            Vec::new()
        }
    };
    let generation = state.replace_detections(detections.clone());
    debug!(
        "Frame {}: {} detections (generation {})",
        frame.sequence,
        detections.len(),
        generation
    );
    detections
}

/// Handle to the running pipeline thread
pub struct FramePipeline {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    preview: watch::Receiver<Option<JpegFrame>>,
}

impl FramePipeline {
    /// Start grabbing from `source` every `interval`
    pub fn spawn(
        mut source: Box<dyn FrameSource>,
        detector: Box<dyn DetectionPort>,
        state: Arc<RoverState>,
        interval: Duration,
    ) -> Self {
        let (preview_tx, preview_rx) = watch::channel(None);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();

        let thread = std::thread::spawn(move || {
            info!("Frame pipeline started on {}", source.describe());

            while !shutdown_flag.load(Ordering::SeqCst) {
                let started = Instant::now();

                match source.grab() {
                    Ok(frame) => {
                        let detections = process_frame(&frame, detector.as_ref(), &state);
                        if let Some(jpeg) = render_preview(&frame, &detections) {
                            preview_tx.send_replace(Some(Arc::new(jpeg)));
                        }
                    }
                    Err(e) => {
                        warn!("Frame grab failed: {}", e);
                        state.replace_detections(Vec::new());
                    }
                }

                if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }

            info!("Frame pipeline stopped");
        });

        Self {
            shutdown,
            thread: Some(thread),
            preview: preview_rx,
        }
    }

    /// Latest annotated preview
    pub fn preview(&self) -> watch::Receiver<Option<JpegFrame>> {
        self.preview.clone()
    }

    /// Stop the thread and wait for it (blocking)
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Frame pipeline thread panicked");
            }
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
