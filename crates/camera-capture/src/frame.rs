//! Video frame type

use image::RgbImage;

/// Bytes per packed RGB pixel
pub const RGB_CHANNELS: usize = 3;

/// One captured RGB frame, row-major, tightly packed
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since source start)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Take ownership of a decoded image's pixels
    pub fn from_image(image: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Copy into an `image` buffer for drawing or encoding
    pub fn to_image(&self) -> Option<RgbImage> {
        if !self.has_valid_layout() {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Non-empty and `data` holds exactly `width * height` RGB pixels
    pub fn has_valid_layout(&self) -> bool {
        let pixels = self.width as usize * self.height as usize;
        pixels > 0 && self.data.len() == pixels * RGB_CHANNELS
    }

    /// Pixel at (x, y), `None` outside the frame
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        self.data.get(idx..idx + RGB_CHANNELS).map(|p| [p[0], p[1], p[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gradient(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        VideoFrame::new(data, width, height, 0, 0)
    }

    #[test]
    fn test_get_pixel_bounds() {
        let frame = gradient(4, 3);
        assert_eq!(frame.get_pixel(2, 1), Some([2, 1, 0]));
        assert_eq!(frame.get_pixel(4, 0), None);
        assert_eq!(frame.get_pixel(0, 3), None);
    }

    #[test]
    fn test_layout_validation() {
        assert!(gradient(5, 2).has_valid_layout());
        assert!(!VideoFrame::new(vec![0; 10], 4, 4, 0, 0).has_valid_layout());
        assert!(!VideoFrame::new(Vec::new(), 0, 0, 0, 0).has_valid_layout());
        assert!(VideoFrame::new(vec![0; 10], 4, 4, 0, 0).to_image().is_none());
    }

    #[test]
    fn test_image_conversion_keeps_pixels() {
        let frame = gradient(5, 2);
        let image = frame.to_image().unwrap();
        assert_eq!(image.get_pixel(3, 1).0, [3, 1, 0]);

        let back = VideoFrame::from_image(image, 10, 3);
        assert_eq!(back.data, frame.data);
        assert_eq!((back.timestamp_ns, back.sequence), (10, 3));
    }

    proptest! {
        #[test]
        fn pixel_lookup_matches_layout(w in 1u32..32, h in 1u32..32, x in 0u32..40, y in 0u32..40) {
            let frame = gradient(w, h);
            let pixel = frame.get_pixel(x, y);
            if x < w && y < h {
                prop_assert_eq!(pixel, Some([x as u8, y as u8, 0]));
            } else {
                prop_assert_eq!(pixel, None);
            }
        }
    }
}
