use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::{Result, SourceError};
use crate::video::types::{Frame, StreamInfo};

/// Which stream to watch: a live camera device or an input path
///
/// One recorder parameterized by this selector replaces separate
/// camera/file detector variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Live capture device (e.g. `/dev/video0`)
    Camera { device: String },
    /// A video file, or a directory of ordered image frames
    File { path: PathBuf },
}

impl Default for SourceKind {
    fn default() -> Self {
        Self::Camera {
            device: "/dev/video0".to_string(),
        }
    }
}

impl SourceKind {
    /// Human-readable description for logs and errors
    pub fn describe(&self) -> String {
        match self {
            Self::Camera { device } => format!("camera {}", device),
            Self::File { path } => path.display().to_string(),
        }
    }
}

/// A pull-based frame source
///
/// `open` must be called exactly once before `read_next`; `read_next`
/// returning `Ok(None)` signals end-of-stream and is a normal terminal
/// condition, not an error.
pub trait FrameSource {
    /// Open the stream and report its parameters
    fn open(&mut self) -> Result<StreamInfo>;

    /// Blocking read of the next frame; `None` at end-of-stream
    fn read_next(&mut self) -> Result<Option<Frame>>;

    /// Human-readable description of the stream for logs and errors
    fn describe(&self) -> String;
}

/// Build the right source implementation for the configured kind
pub fn open_source(config: &SourceConfig) -> Box<dyn FrameSource> {
    match &config.kind {
        SourceKind::File { path } if path.is_dir() => {
            Box::new(ImageDirSource::new(path.clone(), config.capture_fps))
        }
        kind => Box::new(FfmpegFrameSource::new(kind.clone(), config.clone())),
    }
}

// ---------------------------------------------------------------------------
// Image directory source
// ---------------------------------------------------------------------------

/// Frame source backed by a directory of ordered image files
///
/// Files are sorted by name and replayed at a configured synthetic frame
/// rate, so frame timestamps are deterministic. Useful for development and
/// for driving the pipeline from pre-extracted frames.
pub struct ImageDirSource {
    directory: PathBuf,
    fps: f64,
    files: Vec<PathBuf>,
    next_index: usize,
}

impl ImageDirSource {
    pub fn new(directory: PathBuf, fps: f64) -> Self {
        Self {
            directory,
            fps,
            files: Vec::new(),
            next_index: 0,
        }
    }

    fn is_image_file(path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png" | "bmp"),
            None => false,
        }
    }

    fn is_hidden_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
    }
}

impl FrameSource for ImageDirSource {
    fn open(&mut self) -> Result<StreamInfo> {
        if !self.directory.is_dir() {
            return Err(SourceError::OpenFailed {
                source_desc: self.directory.display().to_string(),
            }
            .into());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.is_file() && !Self::is_hidden_file(&path) && Self::is_image_file(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(SourceError::OpenFailed {
                source_desc: format!("no image files in {}", self.directory.display()),
            }
            .into());
        }

        // Frame size comes from the first image; later frames must match it.
        let first = image::open(&files[0]).map_err(|e| SourceError::OpenFailed {
            source_desc: format!("{}: {}", files[0].display(), e),
        })?;

        info!(
            "Opened image directory source: {} frames at {:.1} fps",
            files.len(),
            self.fps
        );

        let info = StreamInfo::new(first.width(), first.height(), self.fps);
        self.files = files;
        self.next_index = 0;
        Ok(info)
    }

    fn read_next(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next_index) else {
            return Ok(None);
        };

        let image = image::open(path).map_err(|e| SourceError::ReadFailed {
            reason: format!("{}: {}", path.display(), e),
        })?;

        let timestamp = Duration::from_secs_f64(self.next_index as f64 / self.fps);
        self.next_index += 1;
        debug!("Read frame {} from {:?}", self.next_index, path);

        Ok(Some(Frame::new(image.to_rgb8(), timestamp)))
    }

    fn describe(&self) -> String {
        format!("image directory {}", self.directory.display())
    }
}

// ---------------------------------------------------------------------------
// FFmpeg-backed source (camera capture and video file decode)
// ---------------------------------------------------------------------------

/// Frame source that drives an external `ffmpeg` process
///
/// The child emits raw rgb24 frames on stdout and this source slices them
/// into `Frame`s. Cameras are captured via v4l2 at the configured size and
/// rate; files are decoded at their native parameters, probed with
/// `ffprobe` before the decoder starts.
pub struct FfmpegFrameSource {
    kind: SourceKind,
    config: SourceConfig,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    info: Option<StreamInfo>,
    frame_index: u64,
    opened_at: Option<Instant>,
}

impl FfmpegFrameSource {
    pub fn new(kind: SourceKind, config: SourceConfig) -> Self {
        Self {
            kind,
            config,
            child: None,
            stdout: None,
            info: None,
            frame_index: 0,
            opened_at: None,
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

    /// Ask ffprobe for the first video stream's width, height and frame rate
    fn probe_file(path: &Path) -> Result<StreamInfo> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .output()
            .map_err(|e| SourceError::ProbeFailed {
                reason: format!("failed to run ffprobe: {}", e),
            })?;

        if !output.status.success() {
            return Err(SourceError::ProbeFailed {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let text = String::from_utf8_lossy(&output.stdout);
        parse_probe_line(text.trim()).ok_or_else(|| {
            SourceError::ProbeFailed {
                reason: format!("unexpected ffprobe output: {}", text.trim()),
            }
            .into()
        })
    }

    fn spawn_decoder(&self, info: &StreamInfo) -> Result<Child> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"]);

        match &self.kind {
            SourceKind::Camera { device } => {
                cmd.args(["-f", "v4l2"])
                    .args(["-framerate", &format!("{}", info.fps)])
                    .args(["-video_size", &format!("{}x{}", info.width, info.height)])
                    .args(["-i", device]);
            }
            SourceKind::File { path } => {
                cmd.arg("-i").arg(path);
            }
        }

        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        cmd.spawn().map_err(|e| {
            SourceError::OpenFailed {
                source_desc: format!("{}: {}", self.kind.describe(), e),
            }
            .into()
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self) -> Result<StreamInfo> {
        if !Self::check_ffmpeg_available() {
            return Err(SourceError::OpenFailed {
                source_desc: "ffmpeg not found on PATH".to_string(),
            }
            .into());
        }

        let info = match &self.kind {
            SourceKind::Camera { .. } => StreamInfo::new(
                self.config.capture_width,
                self.config.capture_height,
                self.config.capture_fps,
            ),
            SourceKind::File { path } => {
                if !path.is_file() {
                    return Err(SourceError::UnsupportedPath {
                        path: path.display().to_string(),
                    }
                    .into());
                }
                Self::probe_file(path)?
            }
        };

        let mut child = self.spawn_decoder(&info)?;
        let stdout = child.stdout.take().ok_or_else(|| SourceError::OpenFailed {
            source_desc: format!("{}: no stdout pipe", self.kind.describe()),
        })?;

        info!(
            "Opened {}: {}x{} at {:.1} fps",
            self.kind.describe(),
            info.width,
            info.height,
            info.fps
        );

        self.child = Some(child);
        self.stdout = Some(BufReader::new(stdout));
        self.info = Some(info);
        self.frame_index = 0;
        self.opened_at = Some(Instant::now());
        Ok(info)
    }

    fn read_next(&mut self) -> Result<Option<Frame>> {
        let info = self.info.ok_or_else(|| SourceError::ReadFailed {
            reason: "source not opened".to_string(),
        })?;
        let stdout = self.stdout.as_mut().ok_or_else(|| SourceError::ReadFailed {
            reason: "source not opened".to_string(),
        })?;

        let mut data = vec![0u8; info.width as usize * info.height as usize * 3];
        match stdout.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Decoder finished; reap the child so it doesn't linger.
                if let Some(mut child) = self.child.take() {
                    let _ = child.wait();
                }
                self.stdout = None;
                return Ok(None);
            }
            Err(e) => {
                return Err(SourceError::ReadFailed {
                    reason: e.to_string(),
                }
                .into())
            }
        }

        let timestamp = match &self.kind {
            // Live capture: real elapsed time since the stream opened.
            SourceKind::Camera { .. } => self
                .opened_at
                .map(|t| t.elapsed())
                .unwrap_or_default(),
            // File decode: deterministic index-based time.
            SourceKind::File { .. } => {
                Duration::from_secs_f64(self.frame_index as f64 / info.fps)
            }
        };

        self.frame_index += 1;
        Frame::from_rgb_bytes(info.width, info.height, data, timestamp)
            .map(Some)
            .ok_or_else(|| {
                SourceError::ReadFailed {
                    reason: "frame buffer size mismatch".to_string(),
                }
                .into()
            })
    }

    fn describe(&self) -> String {
        self.kind.describe()
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                warn!("Failed to stop ffmpeg child: {}", e);
            }
            let _ = child.wait();
        }
    }
}

/// Parse an ffprobe csv line like `640,480,30000/1001`
fn parse_probe_line(line: &str) -> Option<StreamInfo> {
    let mut parts = line.split(',');
    let width: u32 = parts.next()?.trim().parse().ok()?;
    let height: u32 = parts.next()?.trim().parse().ok()?;
    let fps = parse_frame_rate(parts.next()?.trim())?;
    Some(StreamInfo::new(width, height, fps))
}

/// Parse an ffprobe rational frame rate (`30/1`, `30000/1001`) or a bare number
fn parse_frame_rate(text: &str) -> Option<f64> {
    let fps = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => text.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
