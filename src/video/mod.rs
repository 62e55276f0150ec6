//! # Video I/O Module
//!
//! Frame and change-map types, the pull-based frame sources (camera and
//! file), and the clip sinks that turn recorded frames into files on disk.

pub mod sink;
pub mod source;
pub mod types;

pub use sink::{ClipSink, ClipWriter, FfmpegClipSink, ImageSequenceSink};
pub use source::{open_source, FfmpegFrameSource, FrameSource, ImageDirSource, SourceKind};
pub use types::{ChangeMap, ClipInfo, Frame, StreamInfo};
