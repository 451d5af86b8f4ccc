//! Still-image replay from a directory

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::imageops::FilterType;
use tracing::{debug, warn};

use crate::{CameraError, FrameSource, VideoFrame};

const EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Cycles through the images of a directory in file-name order
pub struct DirectoryReplay {
    directory: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    width: u32,
    height: u32,
    sequence: u32,
    started: Instant,
}

impl DirectoryReplay {
    /// Scan `directory` for images; frames are resized to `width` x `height`
    pub fn open(directory: &Path, width: u32, height: u32) -> Result<Self, CameraError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Empty(directory.display().to_string()));
        }
        debug!("Replay source found {} images in {}", files.len(), directory.display());

        Ok(Self {
            directory: directory.to_path_buf(),
            files,
            next: 0,
            width,
            height,
            sequence: 0,
            started: Instant::now(),
        })
    }

    /// Number of images in the replay set
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectoryReplay {
    fn grab(&mut self) -> Result<VideoFrame, CameraError> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();

        let decoded = image::open(path).map_err(|e| {
            warn!("Failed to decode {}: {}", path.display(), e);
            CameraError::Grab(format!("{}: {}", path.display(), e))
        })?;
        let mut rgb = decoded.to_rgb8();
        if rgb.dimensions() != (self.width, self.height) {
            rgb = image::imageops::resize(&rgb, self.width, self.height, FilterType::Triangle);
        }

        let frame = VideoFrame::from_image(rgb, self.started.elapsed().as_nanos() as u64, self.sequence);
        self.sequence = self.sequence.wrapping_add(1);
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("replay of {} ({} images)", self.directory.display(), self.files.len())
    }
}
