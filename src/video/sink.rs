use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::config::RecordingConfig;
use crate::error::{Result, SinkError};
use crate::video::types::{ClipInfo, Frame, StreamInfo};

/// An open clip being written
pub trait ClipWriter {
    /// Append one frame to the clip
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Finalize the clip; must be called exactly once per clip
    fn finish(self: Box<Self>) -> Result<ClipInfo>;
}

/// Factory for clip writers, one writer per detected motion event
pub trait ClipSink {
    fn create(&mut self, identity: &str, info: &StreamInfo) -> Result<Box<dyn ClipWriter>>;
}

/// Human-readable clip identity for the given instant, safe for filenames
///
/// ctime-style timestamp with the time separators swapped out, e.g.
/// `Mon Aug 24 14-03-05 2026`.
pub fn clip_identity(now: DateTime<Local>) -> String {
    sanitize_identity(&now.format("%a %b %e %H:%M:%S %Y").to_string())
}

/// Replace characters that are illegal or awkward in filenames
pub fn sanitize_identity(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '-',
            c => c,
        })
        .collect()
}

fn quality_to_crf(quality: u8) -> u8 {
    (51 - ((quality as f32 / 100.0) * 51.0) as u8).clamp(0, 51)
}

// ---------------------------------------------------------------------------
// FFmpeg-encoded MP4 clips
// ---------------------------------------------------------------------------

/// Sink producing one MP4 per motion event via external FFmpeg
///
/// Frames are staged as PNGs in a per-clip temp directory while the clip is
/// open; `finish` concatenates them with a frame list and encodes
/// `<output_dir>/<identity>.mp4`.
pub struct FfmpegClipSink {
    output_dir: PathBuf,
    codec: String,
    quality: u8,
}

impl FfmpegClipSink {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            codec: config.codec.clone(),
            quality: config.quality,
        }
    }

    pub fn check_ffmpeg_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl ClipSink for FfmpegClipSink {
    fn create(&mut self, identity: &str, info: &StreamInfo) -> Result<Box<dyn ClipWriter>> {
        if !Self::check_ffmpeg_available() {
            return Err(SinkError::FfmpegMissing.into());
        }

        create_dir_all(&self.output_dir)?;

        let staging_dir = std::env::temp_dir().join(format!(
            "motion_sentinel_{}_{}",
            std::process::id(),
            identity.replace(' ', "_")
        ));
        create_dir_all(&staging_dir).map_err(|e| SinkError::CreateFailed {
            identity: identity.to_string(),
            reason: e.to_string(),
        })?;

        let output_path = self.output_dir.join(format!("{}.mp4", identity));
        debug!("Staging clip '{}' in {:?}", identity, staging_dir);

        Ok(Box::new(FfmpegClipWriter {
            staging_dir: Some(staging_dir),
            output_path,
            frame_paths: Vec::new(),
            fps: info.fps,
            codec: self.codec.clone(),
            crf: quality_to_crf(self.quality),
        }))
    }
}

struct FfmpegClipWriter {
    /// Cleared by `finish`; `Drop` removes it if the clip was abandoned
    staging_dir: Option<PathBuf>,
    output_path: PathBuf,
    frame_paths: Vec<PathBuf>,
    fps: f64,
    codec: String,
    crf: u8,
}

impl FfmpegClipWriter {
    fn create_frame_list(&self, staging_dir: &Path) -> Result<PathBuf> {
        let list_path = staging_dir.join("frame_list.txt");
        let mut file = File::create(&list_path)?;

        let frame_duration = 1.0 / self.fps;
        for frame_path in &self.frame_paths {
            writeln!(file, "file '{}'", frame_path.display())?;
            writeln!(file, "duration {:.6}", frame_duration)?;
        }
        // Concat demuxer quirk: the last entry needs repeating so the final
        // frame keeps its duration.
        if let Some(last) = self.frame_paths.last() {
            writeln!(file, "file '{}'", last.display())?;
        }

        Ok(list_path)
    }

    fn encode(&self, frame_list: &Path) -> Result<()> {
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0"])
            .arg("-i")
            .arg(frame_list)
            .args(["-c:v", &self.codec])
            .args(["-r", &self.fps.to_string()])
            .args(["-pix_fmt", "yuv420p"])
            .args(["-crf", &self.crf.to_string()])
            .arg("-y")
            .arg(&self.output_path)
            .output()
            .map_err(|e| SinkError::EncodingFailed {
                reason: format!("failed to run ffmpeg: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SinkError::EncodingFailed {
                reason: format!("ffmpeg failed: {}", stderr.trim()),
            }
            .into());
        }

        Ok(())
    }
}

impl ClipWriter for FfmpegClipWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let staging_dir = self.staging_dir.as_ref().ok_or_else(|| {
            SinkError::WriteFailed {
                reason: "writer already finished".to_string(),
            }
        })?;

        let frame_path = staging_dir.join(format!("frame_{:06}.png", self.frame_paths.len()));
        frame.save_png(&frame_path).map_err(|e| SinkError::WriteFailed {
            reason: format!("failed to stage frame: {}", e),
        })?;
        self.frame_paths.push(frame_path);
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<ClipInfo> {
        let staging_dir = self.staging_dir.take().ok_or_else(|| {
            SinkError::EncodingFailed {
                reason: "writer already finished".to_string(),
            }
        })?;

        let frame_list = self.create_frame_list(&staging_dir)?;
        self.encode(&frame_list)?;

        if let Err(e) = std::fs::remove_dir_all(&staging_dir) {
            warn!("Failed to remove staging directory: {}", e);
        }

        info!(
            "Encoded clip {:?} ({} frames)",
            self.output_path,
            self.frame_paths.len()
        );

        Ok(ClipInfo {
            path: self.output_path.clone(),
            frame_count: self.frame_paths.len(),
        })
    }
}

impl Drop for FfmpegClipWriter {
    fn drop(&mut self) {
        if let Some(staging_dir) = self.staging_dir.take() {
            let _ = std::fs::remove_dir_all(staging_dir);
        }
    }
}

// ---------------------------------------------------------------------------
// PNG image-sequence clips (FFmpeg-free fallback)
// ---------------------------------------------------------------------------

/// Sink writing each clip as a directory of numbered PNG frames
pub struct ImageSequenceSink {
    output_dir: PathBuf,
}

impl ImageSequenceSink {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
        }
    }
}

impl ClipSink for ImageSequenceSink {
    fn create(&mut self, identity: &str, _info: &StreamInfo) -> Result<Box<dyn ClipWriter>> {
        let clip_dir = self.output_dir.join(identity);
        create_dir_all(&clip_dir).map_err(|e| SinkError::CreateFailed {
            identity: identity.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Box::new(ImageSequenceWriter {
            clip_dir,
            frame_count: 0,
        }))
    }
}

struct ImageSequenceWriter {
    clip_dir: PathBuf,
    frame_count: usize,
}

impl ClipWriter for ImageSequenceWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let frame_path = self.clip_dir.join(format!("frame_{:06}.png", self.frame_count));
        frame.save_png(&frame_path).map_err(|e| SinkError::WriteFailed {
            reason: format!("failed to write frame: {}", e),
        })?;
        self.frame_count += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<ClipInfo> {
        info!(
            "Wrote clip {:?} ({} frames)",
            self.clip_dir, self.frame_count
        );
        Ok(ClipInfo {
            path: self.clip_dir,
            frame_count: self.frame_count,
        })
    }
}
