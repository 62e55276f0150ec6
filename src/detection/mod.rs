//! # Motion Detection Module
//!
//! Frame differencing and the moved / not-moved decision. The differencer
//! keeps the one-cycle-old reference frame and produces a binary change map;
//! the classifier reduces that map to a boolean.

pub mod classifier;
pub mod differencer;

pub use classifier::MotionClassifier;
pub use differencer::FrameDifferencer;
