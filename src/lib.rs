//! # Motion-Sentinel
//!
//! Watch a live camera or a file-backed video stream, detect motion between
//! consecutive frames, and record motion-bounded clips with pre-roll context
//! and a post-motion hold period.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use motion_sentinel::{
//!     config::Config,
//!     recording::MotionRecorder,
//!     video::{open_source, FfmpegClipSink},
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let source = open_source(&config.source);
//! let sink = Box::new(FfmpegClipSink::new(&config.recording));
//!
//! let mut recorder = MotionRecorder::new(&config, source, sink)?;
//! let stop = AtomicBool::new(false);
//! let summary = recorder.run(&stop)?;
//! println!("{} clips recorded", summary.clips_recorded);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`detection`] - Frame differencing and the moved / not-moved decision
//! - [`recording`] - Pre-record buffer and the recording state machine
//! - [`video`] - Frame sources, clip sinks, and the frame types
//! - [`preview`] - Optional preview and live-threshold side-channels
//! - [`config`] - Configuration management
//!
//! The pipeline is a single synchronous pull loop: every cycle reads one
//! frame, computes a binary change map against the previous frame, classifies
//! it as motion or not, rolls the pre-record buffer, and updates the
//! Idle/Recording state machine. A clip opens with the buffered pre-roll
//! already written and stays open until motion has been absent for the hold
//! period.

pub mod config;
pub mod detection;
pub mod error;
pub mod preview;
pub mod recording;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    detection::{FrameDifferencer, MotionClassifier},
    error::{Result, SentinelError},
    recording::{MotionRecorder, PreRecordBuffer, RunSummary},
    video::{Frame, SourceKind},
};
