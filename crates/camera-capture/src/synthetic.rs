//! Synthetic frame source for bench runs without a camera

use std::time::Instant;

use crate::{CameraError, FrameSource, VideoFrame};

const SOIL: [u8; 3] = [110, 82, 56];
const LEAF: [u8; 3] = [46, 139, 60];

/// Generates a soil-coloured frame with a green patch drifting left to right
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    sequence: u32,
    started: Instant,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            sequence: 0,
            started: Instant::now(),
        }
    }

    fn render(&self) -> Vec<u8> {
        let patch_w = (self.width / 5).max(1);
        let patch_h = (self.height / 4).max(1);
        let travel = self.width.saturating_sub(patch_w).max(1);
        let patch_x = (self.sequence.wrapping_mul(8)) % travel;
        let patch_y = self.height / 2 - patch_h / 2;

        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let inside = x >= patch_x
                    && x < patch_x + patch_w
                    && y >= patch_y
                    && y < patch_y + patch_h;
                data.extend_from_slice(if inside { &LEAF } else { &SOIL });
            }
        }
        data
    }
}

impl FrameSource for SyntheticCamera {
    fn grab(&mut self) -> Result<VideoFrame, CameraError> {
        let frame = VideoFrame::new(
            self.render(),
            self.width,
            self.height,
            self.started.elapsed().as_nanos() as u64,
            self.sequence,
        );
        self.sequence = self.sequence.wrapping_add(1);
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}
