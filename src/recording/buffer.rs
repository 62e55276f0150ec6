use std::collections::VecDeque;
use std::time::Duration;

use crate::video::types::Frame;

/// Bounded sliding window of recent frames used to backfill clip pre-roll
///
/// Holds the last `window` seconds of frames, oldest first, regardless of
/// recording state. When a clip opens, the buffered frames are written ahead
/// of the live ones; the buffer itself keeps rolling so the *next* clip can
/// be backfilled too.
pub struct PreRecordBuffer {
    frames: VecDeque<Frame>,
    window: Duration,
}

impl PreRecordBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            frames: VecDeque::new(),
            window,
        }
    }

    /// Length of the trailing window this buffer represents
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Append a frame at the tail
    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    /// Drop head entries with timestamps before `cutoff`
    ///
    /// Called once per cycle with `now - window`, so the oldest entry is
    /// never more than the window length behind the newest.
    pub fn evict_older_than(&mut self, cutoff: Duration) {
        while self
            .frames
            .front()
            .map(|frame| frame.timestamp() < cutoff)
            .unwrap_or(false)
        {
            self.frames.pop_front();
        }
    }

    /// All buffered frames, oldest first
    ///
    /// Does not clear the buffer: the rolling window keeps evicting on its
    /// own cadence after a clip has been seeded from it.
    pub fn drain(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
