use std::time::Duration;

use image::{GrayImage, ImageBuffer, Rgb, RgbImage};

/// Represents a single video frame
///
/// A simple wrapper around an RGB image buffer plus the capture timestamp,
/// measured from the start of the stream. Frames are handed off between the
/// source, the pre-record buffer, and the sink; they are never shared.
#[derive(Clone, Debug)]
pub struct Frame {
    buffer: RgbImage,
    timestamp: Duration,
}

impl Frame {
    /// Create a new frame from an RGB image buffer and its capture timestamp
    pub fn new(buffer: RgbImage, timestamp: Duration) -> Self {
        Self { buffer, timestamp }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32, timestamp: Duration) -> Self {
        let buffer = ImageBuffer::new(width, height);
        Self { buffer, timestamp }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3], timestamp: Duration) -> Self {
        let buffer = ImageBuffer::from_fn(width, height, |_, _| Rgb(color));
        Self { buffer, timestamp }
    }

    /// Get the width of the frame
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Get the height of the frame
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Capture timestamp, relative to the start of the stream
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let pixel = self.buffer.get_pixel(x, y);
        [pixel[0], pixel[1], pixel[2]]
    }

    /// Set a pixel at the given coordinates
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        self.buffer.put_pixel(x, y, Rgb(color));
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Single-channel intensity copy of this frame
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.buffer)
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp: Duration,
    ) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer, timestamp })
    }

    /// Save the frame as a PNG file
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.buffer.save(path)
    }
}

/// Per-pixel binary change map produced by the frame differencer
///
/// Same dimensions as the input frame. The polarity is inverted: a changed
/// pixel holds 0 and an unchanged pixel holds 255, and the classifier counts
/// the zero-valued pixels as motion.
#[derive(Clone, Debug)]
pub struct ChangeMap {
    map: GrayImage,
}

/// Marker value for a changed pixel
pub const CHANGED: u8 = 0;
/// Marker value for an unchanged pixel
pub const UNCHANGED: u8 = 255;

impl ChangeMap {
    pub fn new(map: GrayImage) -> Self {
        Self { map }
    }

    pub fn width(&self) -> u32 {
        self.map.width()
    }

    pub fn height(&self) -> u32 {
        self.map.height()
    }

    /// Total number of cells in the map
    pub fn area(&self) -> u64 {
        self.map.width() as u64 * self.map.height() as u64
    }

    /// Number of cells carrying the "changed" marker
    pub fn changed_pixels(&self) -> u64 {
        self.map.pixels().filter(|p| p[0] == CHANGED).count() as u64
    }

    /// Get the underlying single-channel buffer
    pub fn as_image(&self) -> &GrayImage {
        &self.map
    }

    /// Save the change map as a PNG file
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.map.save(path)
    }
}

/// Stream parameters reported by a frame source when it opens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate of the stream
    pub fps: f64,
}

impl StreamInfo {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self { width, height, fps }
    }

    /// Number of pixels per frame
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Summary of a finalized clip, returned when a writer is closed
#[derive(Debug, Clone)]
pub struct ClipInfo {
    /// Where the clip ended up on disk
    pub path: std::path::PathBuf,
    /// Number of frames written, pre-roll included
    pub frame_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip_through_raw_bytes() {
        let mut frame = Frame::new_black(4, 3, Duration::from_secs(1));
        frame.set_pixel(2, 1, [10, 20, 30]);

        let bytes = frame.as_image().as_raw().clone();
        let restored = Frame::from_rgb_bytes(4, 3, bytes, frame.timestamp()).unwrap();

        assert_eq!(restored.get_pixel(2, 1), [10, 20, 30]);
        assert_eq!(restored.timestamp(), Duration::from_secs(1));
    }

    #[test]
    fn test_change_map_counts_changed_pixels() {
        let mut map = GrayImage::from_pixel(4, 4, image::Luma([UNCHANGED]));
        map.put_pixel(0, 0, image::Luma([CHANGED]));
        map.put_pixel(3, 3, image::Luma([CHANGED]));

        let change = ChangeMap::new(map);
        assert_eq!(change.area(), 16);
        assert_eq!(change.changed_pixels(), 2);
    }
}
