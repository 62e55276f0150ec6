use crate::video::types::ChangeMap;

/// Reduces a change map to a single moved / not-moved decision
///
/// The decision is a percentage-of-changed-pixels test: strictly more than
/// `threshold_percent` percent of the frame area must carry the changed
/// marker. The threshold is passed in on every call rather than stored, so a
/// live control can adjust it between cycles without the classifier caching
/// a stale value.
#[derive(Debug, Default, Clone, Copy)]
pub struct MotionClassifier;

impl MotionClassifier {
    pub fn new() -> Self {
        Self
    }

    /// True when the changed fraction of `change` exceeds `threshold_percent`
    pub fn is_motion(&self, change: &ChangeMap, threshold_percent: u8) -> bool {
        let area = change.area();
        if area == 0 {
            return false;
        }
        let percent = change.changed_pixels() as f64 * 100.0 / area as f64;
        percent > threshold_percent as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::types::{CHANGED, UNCHANGED};
    use image::{GrayImage, Luma};

    fn map_with_changed(changed: u32) -> ChangeMap {
        // 10x10 map: each changed pixel is exactly one percent of the area.
        let mut map = GrayImage::from_pixel(10, 10, Luma([UNCHANGED]));
        for i in 0..changed {
            map.put_pixel(i % 10, i / 10, Luma([CHANGED]));
        }
        ChangeMap::new(map)
    }

    #[test]
    fn test_zero_change_is_never_motion() {
        let classifier = MotionClassifier::new();
        assert!(!classifier.is_motion(&map_with_changed(0), 0));
    }

    #[test]
    fn test_threshold_comparison_is_strict() {
        let classifier = MotionClassifier::new();
        // Exactly 8% changed: not motion at threshold 8.
        assert!(!classifier.is_motion(&map_with_changed(8), 8));
        // 9% changed: motion at threshold 8.
        assert!(classifier.is_motion(&map_with_changed(9), 8));
    }

    #[test]
    fn test_threshold_is_reread_per_call() {
        let classifier = MotionClassifier::new();
        let map = map_with_changed(50);
        assert!(classifier.is_motion(&map, 8));
        assert!(!classifier.is_motion(&map, 75));
    }
}
