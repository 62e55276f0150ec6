use image::{GrayImage, Luma};

use crate::config::DetectionConfig;
use crate::video::types::{ChangeMap, Frame, CHANGED, UNCHANGED};

/// Frame differencer: turns each incoming frame into a binary change map
///
/// Keeps the previous frame's intensity image as the comparison baseline and
/// runs the classic difference pipeline on every call: grayscale, absolute
/// difference, box blur, morphological open, morphological close, inverted
/// binary threshold. The reference frame is replaced only after the change
/// map has been computed from it, so it is always exactly one cycle old.
pub struct FrameDifferencer {
    blur_window: u32,
    open_radius: u32,
    close_radius: u32,
    diff_cutoff: u8,
    reference: GrayImage,
    change: ChangeMap,
}

impl FrameDifferencer {
    /// Create a differencer seeded with the first frame of the stream
    ///
    /// The first frame only establishes the reference; no change map is
    /// produced for it.
    pub fn new(first_frame: &Frame, config: &DetectionConfig) -> Self {
        let reference = first_frame.to_gray();
        let blank = GrayImage::from_pixel(reference.width(), reference.height(), Luma([UNCHANGED]));
        Self {
            blur_window: config.blur_window,
            open_radius: config.open_radius,
            close_radius: config.close_radius,
            diff_cutoff: config.diff_cutoff,
            reference,
            change: ChangeMap::new(blank),
        }
    }

    /// Compute the change map for `frame` against the retained reference
    ///
    /// Panics if the frame dimensions differ from the reference: frame size
    /// is fixed for the lifetime of a stream, and a mismatch is a broken
    /// caller contract, not a recoverable condition.
    pub fn compute_change(&mut self, frame: &Frame) -> &ChangeMap {
        let gray = frame.to_gray();
        assert_eq!(
            (gray.width(), gray.height()),
            (self.reference.width(), self.reference.height()),
            "frame dimensions changed mid-stream"
        );

        let mut work = absolute_difference(&gray, &self.reference);

        if self.blur_window > 1 {
            work = box_blur(&work, self.blur_window);
        }
        if self.open_radius > 0 {
            work = erode(&work, self.open_radius);
            work = dilate(&work, self.open_radius);
        }
        if self.close_radius > 0 {
            work = dilate(&work, self.close_radius);
            work = erode(&work, self.close_radius);
        }

        // Inverted polarity: changed pixels go to 0, background to 255.
        let cutoff = self.diff_cutoff;
        for pixel in work.pixels_mut() {
            pixel[0] = if pixel[0] > cutoff { CHANGED } else { UNCHANGED };
        }

        self.reference = gray;
        self.change = ChangeMap::new(work);
        &self.change
    }
}

/// Per-pixel absolute difference of two equally-sized intensity images
fn absolute_difference(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].abs_diff(b.get_pixel(x, y)[0])])
    })
}

/// Mean filter with a square window, borders clamped
fn box_blur(src: &GrayImage, window: u32) -> GrayImage {
    let radius = (window / 2) as i64;
    let norm = (2 * radius + 1) as u32;
    let horizontal = separable_pass(src, radius, true, |acc, v| acc + v as u32, 0, |sum| {
        (sum / norm) as u8
    });
    separable_pass(&horizontal, radius, false, |acc, v| acc + v as u32, 0, |sum| {
        (sum / norm) as u8
    })
}

/// Morphological erosion with a square structuring element of the given radius
fn erode(src: &GrayImage, radius: u32) -> GrayImage {
    let r = radius as i64;
    let horizontal = separable_pass(src, r, true, |acc, v| acc.min(v as u32), u32::MAX, |m| m as u8);
    separable_pass(&horizontal, r, false, |acc, v| acc.min(v as u32), u32::MAX, |m| m as u8)
}

/// Morphological dilation with a square structuring element of the given radius
fn dilate(src: &GrayImage, radius: u32) -> GrayImage {
    let r = radius as i64;
    let horizontal = separable_pass(src, r, true, |acc, v| acc.max(v as u32), 0, |m| m as u8);
    separable_pass(&horizontal, r, false, |acc, v| acc.max(v as u32), 0, |m| m as u8)
}

/// One axis of a separable window operation, sampling with clamped coordinates
///
/// A square structuring element factors into a horizontal and a vertical run
/// of the same fold, which keeps the window loops one-dimensional.
fn separable_pass(
    src: &GrayImage,
    radius: i64,
    horizontal: bool,
    fold: impl Fn(u32, u8) -> u32,
    init: u32,
    finish: impl Fn(u32) -> u8,
) -> GrayImage {
    let (width, height) = (src.width() as i64, src.height() as i64);
    GrayImage::from_fn(src.width(), src.height(), |x, y| {
        let mut acc = init;
        for offset in -radius..=radius {
            let (sx, sy) = if horizontal {
                ((x as i64 + offset).clamp(0, width - 1), y as i64)
            } else {
                (x as i64, (y as i64 + offset).clamp(0, height - 1))
            };
            acc = fold(acc, src.get_pixel(sx as u32, sy as u32)[0]);
        }
        Luma([finish(acc)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> DetectionConfig {
        DetectionConfig::default()
    }

    fn black(ts: u64) -> Frame {
        Frame::new_black(64, 64, Duration::from_secs(ts))
    }

    #[test]
    fn test_identical_frames_produce_no_change() {
        let mut differencer = FrameDifferencer::new(&black(0), &config());
        let change = differencer.compute_change(&black(1));
        assert_eq!(change.changed_pixels(), 0);
    }

    #[test]
    fn test_large_block_survives_noise_suppression() {
        let mut differencer = FrameDifferencer::new(&black(0), &config());

        let mut moved = black(1);
        for y in 16..48 {
            for x in 16..48 {
                moved.set_pixel(x, y, [255, 255, 255]);
            }
        }

        let change = differencer.compute_change(&moved);
        // The 32x32 block shrinks under blur and open but its core remains.
        assert!(change.changed_pixels() >= 18 * 18);
    }

    #[test]
    fn test_single_pixel_speck_is_suppressed() {
        let mut differencer = FrameDifferencer::new(&black(0), &config());

        let mut moved = black(1);
        moved.set_pixel(30, 30, [255, 255, 255]);

        let change = differencer.compute_change(&moved);
        assert_eq!(change.changed_pixels(), 0);
    }

    #[test]
    fn test_reference_advances_every_cycle() {
        let mut differencer = FrameDifferencer::new(&black(0), &config());

        let mut moved = black(1);
        for y in 10..50 {
            for x in 10..50 {
                moved.set_pixel(x, y, [255, 255, 255]);
            }
        }

        assert!(differencer.compute_change(&moved).changed_pixels() > 0);
        // Same content again: the reference is now the moved frame, so the
        // second cycle sees no difference.
        let again = moved.clone();
        assert_eq!(differencer.compute_change(&again).changed_pixels(), 0);
    }

    #[test]
    #[should_panic(expected = "frame dimensions changed")]
    fn test_dimension_mismatch_is_a_contract_violation() {
        let mut differencer = FrameDifferencer::new(&black(0), &config());
        differencer.compute_change(&Frame::new_black(32, 32, Duration::from_secs(1)));
    }
}
