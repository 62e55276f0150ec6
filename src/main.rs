use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::task;
use tracing::{info, Level};

use motion_sentinel::{
    config::Config,
    preview::{FileThresholdControl, SnapshotPreview},
    recording::{MotionRecorder, RunSummary},
    video::{open_source, ClipSink, FfmpegClipSink, ImageSequenceSink, SourceKind},
};

#[derive(Parser)]
#[command(
    name = "motion-sentinel",
    version,
    about = "Record motion-bounded video clips from a camera or video file",
    long_about = "Motion-Sentinel watches a live camera or a video file, detects motion by \
differencing consecutive frames, and writes one clip per motion event, including a \
configurable pre-roll before the motion starts and a hold period after it stops."
)]
struct Cli {
    /// Input video file or directory of image frames (watches a camera when absent)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Camera device to capture from
    #[arg(long, conflicts_with = "input")]
    camera: Option<String>,

    /// Output directory for recorded clips
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Detection threshold: percentage of changed pixels that counts as motion
    #[arg(short, long)]
    threshold: Option<u8>,

    /// Seconds of pre-motion context prepended to each clip
    #[arg(long)]
    prerecord: Option<f64>,

    /// Seconds to keep recording after motion stops (defaults to the pre-roll length)
    #[arg(long)]
    postrecord: Option<f64>,

    /// Clip output format
    #[arg(long, value_enum, default_value_t = SinkChoice::Mp4)]
    sink: SinkChoice,

    /// Write live preview snapshots (live.png, change.png) into this directory
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Poll this file for live threshold adjustments (a single integer 0-100)
    #[arg(long)]
    threshold_file: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SinkChoice {
    /// One MP4 file per clip, encoded with external FFmpeg
    Mp4,
    /// One directory of numbered PNG frames per clip
    ImageDir,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("Starting Motion-Sentinel v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration, then let CLI flags override it
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };

    if let Some(input) = cli.input {
        config.source.kind = SourceKind::File { path: input };
    } else if let Some(device) = cli.camera {
        config.source.kind = SourceKind::Camera { device };
    }
    if let Some(output) = cli.output {
        config.recording.output_dir = output;
    }
    if let Some(threshold) = cli.threshold {
        config.detection.threshold_percent = threshold;
    }
    if let Some(prerecord) = cli.prerecord {
        config.recording.prerecord_secs = prerecord;
    }
    if let Some(postrecord) = cli.postrecord {
        config.recording.postrecord_secs = Some(postrecord);
    }
    config.validate()?;

    info!("Source: {}", config.source.kind.describe());
    info!("Output: {:?}", config.recording.output_dir);
    info!(
        "Pre-roll: {:.1}s, hold: {:.1}s, threshold: {}%",
        config.recording.prerecord().as_secs_f64(),
        config.recording.postrecord().as_secs_f64(),
        config.detection.threshold_percent
    );

    // Ctrl-C raises the stop flag; the run loop polls it once per frame and
    // finalizes any open clip before returning.
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, finishing up");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    // The pipeline is a synchronous pull loop; keep it off the async runtime.
    let sink_choice = cli.sink;
    let preview_dir = cli.preview_dir;
    let threshold_file = cli.threshold_file;
    let summary = task::spawn_blocking(move || -> Result<RunSummary> {
        let source = open_source(&config.source);
        let sink: Box<dyn ClipSink> = match sink_choice {
            SinkChoice::Mp4 => Box::new(FfmpegClipSink::new(&config.recording)),
            SinkChoice::ImageDir => Box::new(ImageSequenceSink::new(&config.recording)),
        };

        let mut recorder = MotionRecorder::new(&config, source, sink)?;
        if let Some(dir) = preview_dir {
            recorder = recorder.with_preview(Box::new(SnapshotPreview::new(dir)));
        }
        if let Some(file) = threshold_file {
            recorder = recorder.with_threshold_control(Box::new(FileThresholdControl::new(file)));
        }

        Ok(recorder.run(&stop)?)
    })
    .await??;

    info!(
        "Run complete: {} frames processed, {} clips recorded",
        summary.frames_processed, summary.clips_recorded
    );
    Ok(())
}
