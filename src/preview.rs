//! Optional observation side-channels
//!
//! The recorder can be handed a preview surface (sees the live frame and
//! change map once per cycle) and a live threshold control (polled once per
//! cycle). Both are injectable capabilities; when absent the recorder skips
//! them entirely. Neither feeds back into the detection pipeline.

use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;
use crate::video::types::{ChangeMap, Frame};

/// Receives the live frame and raw change map once per cycle
pub trait PreviewSurface {
    fn present(&mut self, frame: &Frame, change: &ChangeMap) -> Result<()>;
}

/// Externally adjustable detection threshold, polled between cycles
pub trait ThresholdControl {
    /// The replacement threshold (0-100), or `None` to leave it unchanged
    fn current_threshold(&mut self) -> Option<u8>;
}

/// Preview surface that keeps the latest frame pair on disk as PNGs
///
/// Overwrites `live.png` and `change.png` in the target directory every
/// cycle, so any image viewer pointed at them acts as a poor man's monitor
/// window.
pub struct SnapshotPreview {
    directory: PathBuf,
    initialized: bool,
}

impl SnapshotPreview {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            initialized: false,
        }
    }
}

impl PreviewSurface for SnapshotPreview {
    fn present(&mut self, frame: &Frame, change: &ChangeMap) -> Result<()> {
        if !self.initialized {
            std::fs::create_dir_all(&self.directory)?;
            self.initialized = true;
        }

        frame
            .save_png(self.directory.join("live.png"))
            .map_err(|e| crate::error::SentinelError::generic(e.to_string()))?;
        change
            .save_png(self.directory.join("change.png"))
            .map_err(|e| crate::error::SentinelError::generic(e.to_string()))?;
        Ok(())
    }
}

/// Threshold control backed by a small text file
///
/// The file holds a single integer 0-100 and is re-read every cycle, so
/// `echo 15 > threshold` adjusts a running recorder. A missing or malformed
/// file leaves the threshold alone.
pub struct FileThresholdControl {
    path: PathBuf,
}

impl FileThresholdControl {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ThresholdControl for FileThresholdControl {
    fn current_threshold(&mut self) -> Option<u8> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match content.trim().parse::<u8>() {
            Ok(value) => Some(value.min(100)),
            Err(_) => {
                debug!("Ignoring malformed threshold file {:?}", self.path);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::types::UNCHANGED;
    use image::GrayImage;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_snapshot_preview_writes_both_images() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("preview");
        let mut preview = SnapshotPreview::new(target.clone());

        let frame = Frame::new_black(4, 4, Duration::ZERO);
        let change = ChangeMap::new(GrayImage::from_pixel(4, 4, image::Luma([UNCHANGED])));

        preview.present(&frame, &change).unwrap();
        assert!(target.join("live.png").is_file());
        assert!(target.join("change.png").is_file());
    }

    #[test]
    fn test_file_threshold_control_reads_and_clamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("threshold");

        let mut control = FileThresholdControl::new(path.clone());
        assert_eq!(control.current_threshold(), None);

        std::fs::write(&path, "15\n").unwrap();
        assert_eq!(control.current_threshold(), Some(15));

        std::fs::write(&path, "250").unwrap();
        assert_eq!(control.current_threshold(), Some(100));

        std::fs::write(&path, "not a number").unwrap();
        assert_eq!(control.current_threshold(), None);
    }
}
