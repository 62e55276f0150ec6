//! # Recording Module
//!
//! The pre-record buffer and the recording controller that drives the whole
//! detect -> classify -> buffer -> write pipeline.

pub mod buffer;
pub mod controller;

pub use buffer::PreRecordBuffer;
pub use controller::{MotionRecorder, RunSummary};
