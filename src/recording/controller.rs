use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Local;
use tracing::{debug, info};

use crate::config::Config;
use crate::detection::{FrameDifferencer, MotionClassifier};
use crate::error::{Result, SourceError};
use crate::preview::{PreviewSurface, ThresholdControl};
use crate::recording::buffer::PreRecordBuffer;
use crate::video::sink::{clip_identity, ClipSink, ClipWriter};
use crate::video::source::FrameSource;
use crate::video::types::{Frame, StreamInfo};

/// Counters reported when a run terminates
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub clips_recorded: usize,
}

/// Live clip state; exists only while recording
struct RecordingSession {
    identity: String,
    writer: Box<dyn ClipWriter>,
    /// Set when motion stops, cleared whenever motion is re-observed. The
    /// clip closes once the current timestamp passes this deadline.
    hold_deadline: Option<Duration>,
}

/// The recording controller: detector, classifier, pre-record buffer and the
/// Idle/Recording state machine in one synchronous pull loop
///
/// Each cycle runs detect -> classify -> buffer -> state update to completion
/// before the next frame is requested. The controller owns the sink writer
/// exclusively while recording, and guarantees the open clip is finalized on
/// end-of-stream and on cancellation.
pub struct MotionRecorder {
    source: Box<dyn FrameSource>,
    sink: Box<dyn ClipSink>,
    preview: Option<Box<dyn PreviewSurface>>,
    threshold_control: Option<Box<dyn ThresholdControl>>,
    stream: StreamInfo,
    differencer: FrameDifferencer,
    classifier: MotionClassifier,
    buffer: PreRecordBuffer,
    session: Option<RecordingSession>,
    threshold_percent: u8,
    prerecord: Duration,
    postrecord: Duration,
}

impl MotionRecorder {
    /// Open the source and prime the detector with its first frame
    ///
    /// Failure to open the source, or an immediately empty stream, is a
    /// fatal initialization error: it is reported once and the run never
    /// starts.
    pub fn new(
        config: &Config,
        mut source: Box<dyn FrameSource>,
        sink: Box<dyn ClipSink>,
    ) -> Result<Self> {
        config.validate()?;

        let stream = source.open()?;
        let first_frame = source.read_next()?.ok_or_else(|| SourceError::EmptyStream {
            source_desc: source.describe(),
        })?;

        let differencer = FrameDifferencer::new(&first_frame, &config.detection);

        Ok(Self {
            source,
            sink,
            preview: None,
            threshold_control: None,
            stream,
            differencer,
            classifier: MotionClassifier::new(),
            buffer: PreRecordBuffer::new(config.recording.prerecord()),
            session: None,
            threshold_percent: config.detection.threshold_percent,
            prerecord: config.recording.prerecord(),
            postrecord: config.recording.postrecord(),
        })
    }

    /// Attach a preview surface
    pub fn with_preview(mut self, preview: Box<dyn PreviewSurface>) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Attach a live threshold control
    pub fn with_threshold_control(mut self, control: Box<dyn ThresholdControl>) -> Self {
        self.threshold_control = Some(control);
        self
    }

    /// Stream parameters of the opened source
    pub fn stream_info(&self) -> StreamInfo {
        self.stream
    }

    /// Process frames until end-of-stream or until `stop` is raised
    ///
    /// Returns normally in both cases. Any clip open when the loop exits is
    /// finalized before this returns, including on the error path.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<RunSummary> {
        info!(
            "Watching {} ({}x{} at {:.1} fps, threshold {}%)",
            self.source.describe(),
            self.stream.width,
            self.stream.height,
            self.stream.fps,
            self.threshold_percent
        );

        let result = self.run_loop(stop);
        let finalize = self.finalize();
        match (result, finalize) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(summary), Ok(())) => Ok(summary),
        }
    }

    fn run_loop(&mut self, stop: &AtomicBool) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        loop {
            // Cooperative cancellation, polled once per iteration.
            if stop.load(Ordering::Relaxed) {
                info!("Stop requested");
                break;
            }

            let Some(frame) = self.source.read_next()? else {
                info!("End of stream");
                break;
            };

            summary.frames_processed += 1;
            if self.process_frame(frame)? {
                summary.clips_recorded += 1;
            }
        }

        Ok(summary)
    }

    /// One full detection cycle; returns true when a new clip was opened
    fn process_frame(&mut self, frame: Frame) -> Result<bool> {
        if let Some(control) = self.threshold_control.as_mut() {
            if let Some(threshold) = control.current_threshold() {
                if threshold != self.threshold_percent {
                    info!("Detection threshold adjusted to {}%", threshold);
                    self.threshold_percent = threshold;
                }
            }
        }

        let now = frame.timestamp();
        let change = self.differencer.compute_change(&frame);
        let moved = self.classifier.is_motion(change, self.threshold_percent);

        if let Some(preview) = self.preview.as_mut() {
            preview.present(&frame, change)?;
        }

        // The rolling window keeps covering "the last prerecord seconds from
        // right now" regardless of recording state.
        self.buffer.push(frame.clone());
        self.buffer.evict_older_than(now.saturating_sub(self.prerecord));

        if self.session.is_none() {
            if moved {
                self.open_clip()?;
                return Ok(true);
            }
            return Ok(false);
        }

        let mut close = false;
        if let Some(session) = self.session.as_mut() {
            // The live frame always goes to the open clip. On the cycle the
            // clip opened, the triggering frame arrived via the buffer flush
            // instead.
            session.writer.write(&frame)?;

            if moved {
                session.hold_deadline = None;
            } else if session.hold_deadline.is_none() {
                let deadline = now + self.postrecord;
                debug!("Motion stopped at {:?}, holding until {:?}", now, deadline);
                session.hold_deadline = Some(deadline);
            } else if session.hold_deadline.is_some_and(|deadline| now > deadline) {
                close = true;
            }
        }

        if close {
            self.close_clip()?;
        }
        Ok(false)
    }

    /// Idle -> Recording: open a sink writer and seed it with the pre-roll
    fn open_clip(&mut self) -> Result<()> {
        let identity = clip_identity(Local::now());
        info!("{}: motion detected, opening clip", identity);

        let mut writer = self.sink.create(&identity, &self.stream)?;
        for buffered in self.buffer.drain() {
            writer.write(buffered)?;
        }
        debug!("Seeded clip with {} buffered frames", self.buffer.len());

        self.session = Some(RecordingSession {
            identity,
            writer,
            hold_deadline: None,
        });
        Ok(())
    }

    /// Recording -> Idle: finalize the open clip
    fn close_clip(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            let clip = session.writer.finish()?;
            info!(
                "{}: stop recording ({} frames -> {:?})",
                session.identity, clip.frame_count, clip.path
            );
        }
        Ok(())
    }

    /// Close any open clip; never leaves a clip unflushed on exit
    fn finalize(&mut self) -> Result<()> {
        if self.session.is_some() {
            debug!("Finalizing clip left open at shutdown");
            self.close_clip()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Result;
    use crate::video::types::ClipInfo;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SIZE: u32 = 64;

    fn black(secs: u64) -> Frame {
        Frame::new_black(SIZE, SIZE, Duration::from_secs(secs))
    }

    /// Frame with a large bright block: differs heavily from a black frame,
    /// and from the block-free frame that follows it.
    fn block(secs: u64) -> Frame {
        let mut frame = black(secs);
        for y in 8..56 {
            for x in 8..56 {
                frame.set_pixel(x, y, [255, 255, 255]);
            }
        }
        frame
    }

    struct ScriptedSource {
        frames: Vec<Frame>,
        next: usize,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Frame>) -> Self {
            Self { frames, next: 0 }
        }
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<StreamInfo> {
            Ok(StreamInfo::new(SIZE, SIZE, 1.0))
        }

        fn read_next(&mut self) -> Result<Option<Frame>> {
            let frame = self.frames.get(self.next).cloned();
            self.next += 1;
            Ok(frame)
        }

        fn describe(&self) -> String {
            "scripted source".to_string()
        }
    }

    #[derive(Debug, Clone, Default)]
    struct RecordedClip {
        identity: String,
        timestamps: Vec<u64>,
        closed: bool,
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        clips: Rc<RefCell<Vec<RecordedClip>>>,
    }

    struct RecordingWriter {
        clips: Rc<RefCell<Vec<RecordedClip>>>,
        index: usize,
    }

    impl ClipSink for RecordingSink {
        fn create(&mut self, identity: &str, _info: &StreamInfo) -> Result<Box<dyn ClipWriter>> {
            let mut clips = self.clips.borrow_mut();
            clips.push(RecordedClip {
                identity: identity.to_string(),
                ..RecordedClip::default()
            });
            Ok(Box::new(RecordingWriter {
                clips: Rc::clone(&self.clips),
                index: clips.len() - 1,
            }))
        }
    }

    impl ClipWriter for RecordingWriter {
        fn write(&mut self, frame: &Frame) -> Result<()> {
            self.clips.borrow_mut()[self.index]
                .timestamps
                .push(frame.timestamp().as_secs());
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<ClipInfo> {
            let mut clips = self.clips.borrow_mut();
            let clip = &mut clips[self.index];
            assert!(!clip.closed, "clip closed twice");
            clip.closed = true;
            Ok(ClipInfo {
                path: std::path::PathBuf::from(&clip.identity),
                frame_count: clip.timestamps.len(),
            })
        }
    }

    /// 1 fps, 2 s pre-roll, 2 s hold
    fn test_config() -> Config {
        let mut config = Config::default();
        config.detection.threshold_percent = 10;
        config.recording.prerecord_secs = 2.0;
        config.recording.postrecord_secs = Some(2.0);
        config
    }

    fn recorder(frames: Vec<Frame>, sink: &RecordingSink) -> MotionRecorder {
        MotionRecorder::new(
            &test_config(),
            Box::new(ScriptedSource::new(frames)),
            Box::new(sink.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_no_motion_records_nothing() {
        let sink = RecordingSink::default();
        let frames = (0..10).map(black).collect();
        let mut recorder = recorder(frames, &sink);

        let summary = recorder.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(summary.frames_processed, 9); // first frame seeds the detector
        assert_eq!(summary.clips_recorded, 0);
        assert!(sink.clips.borrow().is_empty());
    }

    #[test]
    fn test_single_motion_event_round_trip() {
        // Motion appears at t=5 and the scene then stays static (the block
        // keeps its place), so t=5 is the only moved frame.
        let mut frames: Vec<Frame> = (0..5).map(black).collect();
        for t in 5..10 {
            frames.push(block(t));
        }

        let sink = RecordingSink::default();
        let mut recorder = recorder(frames, &sink);
        let summary = recorder.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(summary.clips_recorded, 1);
        let clips = sink.clips.borrow();
        assert_eq!(clips.len(), 1);

        // Pre-roll [3,4], motion frame [5], hold frames until t > 5+2.
        assert_eq!(clips[0].timestamps, vec![3, 4, 5, 6, 7, 8, 9]);
        assert!(clips[0].closed);
        assert!(recorder.session.is_none());
    }

    #[test]
    fn test_retrigger_during_hold_keeps_clip_open() {
        // Motion at t=5 (block appears) and again at t=7 (block vanishes,
        // inside the 2 s hold window armed at t=6).
        let mut frames: Vec<Frame> = (0..5).map(black).collect();
        frames.push(block(5));
        frames.push(block(6));
        for t in 7..12 {
            frames.push(black(t));
        }

        let sink = RecordingSink::default();
        let mut recorder = recorder(frames, &sink);
        let summary = recorder.run(&AtomicBool::new(false)).unwrap();

        // One clip: the re-trigger reset the hold timer instead of opening a
        // second clip.
        assert_eq!(summary.clips_recorded, 1);
        let clips = sink.clips.borrow();
        assert_eq!(clips.len(), 1);
        // Deadline re-armed at t=8 for 8+2; the t=11 cycle closes the clip.
        assert_eq!(clips[0].timestamps, vec![3, 4, 5, 6, 7, 8, 9, 10, 11]);
        assert!(clips[0].closed);
    }

    #[test]
    fn test_end_of_stream_finalizes_open_clip_once() {
        let mut frames: Vec<Frame> = (0..3).map(black).collect();
        frames.push(block(3));
        frames.push(block(4));

        let sink = RecordingSink::default();
        let mut recorder = recorder(frames, &sink);
        recorder.run(&AtomicBool::new(false)).unwrap();

        let clips = sink.clips.borrow();
        assert_eq!(clips.len(), 1);
        // Stream ended mid-hold; the writer must still be closed (the
        // recording fake panics on a double close).
        assert!(clips[0].closed);
        assert_eq!(clips[0].timestamps, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_cancellation_finalizes_open_clip() {
        use std::sync::Arc;

        struct StopAfterSource {
            inner: ScriptedSource,
            stop: Arc<AtomicBool>,
            stop_after: usize,
        }

        impl FrameSource for StopAfterSource {
            fn open(&mut self) -> Result<StreamInfo> {
                self.inner.open()
            }

            fn read_next(&mut self) -> Result<Option<Frame>> {
                if self.inner.next >= self.stop_after {
                    self.stop.store(true, Ordering::Relaxed);
                }
                self.inner.read_next()
            }

            fn describe(&self) -> String {
                self.inner.describe()
            }
        }

        let mut frames: Vec<Frame> = (0..3).map(black).collect();
        for t in 3..20 {
            frames.push(block(t));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let source = StopAfterSource {
            inner: ScriptedSource::new(frames),
            stop: Arc::clone(&stop),
            stop_after: 6,
        };

        let sink = RecordingSink::default();
        let mut recorder = MotionRecorder::new(
            &test_config(),
            Box::new(source),
            Box::new(sink.clone()),
        )
        .unwrap();

        recorder.run(&stop).unwrap();

        let clips = sink.clips.borrow();
        assert_eq!(clips.len(), 1);
        assert!(clips[0].closed, "interrupt must close the open clip");
    }

    #[test]
    fn test_empty_stream_is_fatal_initialization() {
        let result = MotionRecorder::new(
            &test_config(),
            Box::new(ScriptedSource::new(Vec::new())),
            Box::new(RecordingSink::default()),
        );
        assert!(matches!(
            result,
            Err(crate::error::SentinelError::Source(
                SourceError::EmptyStream { .. }
            ))
        ));
    }

    #[test]
    fn test_threshold_control_overrides_configured_threshold() {
        struct FixedControl(u8);
        impl ThresholdControl for FixedControl {
            fn current_threshold(&mut self) -> Option<u8> {
                Some(self.0)
            }
        }

        let mut frames: Vec<Frame> = (0..5).map(black).collect();
        for t in 5..10 {
            frames.push(block(t));
        }

        let sink = RecordingSink::default();
        let mut recorder =
            recorder(frames, &sink).with_threshold_control(Box::new(FixedControl(100)));

        // At 100% no frame can cross the strict threshold, so nothing records.
        let summary = recorder.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(summary.clips_recorded, 0);
        assert!(sink.clips.borrow().is_empty());
    }

    #[test]
    fn test_prerecord_window_limits_seeded_frames() {
        // Long quiet lead-in: only the trailing 2 s may seed the clip.
        let mut frames: Vec<Frame> = (0..9).map(black).collect();
        frames.push(block(9));

        let sink = RecordingSink::default();
        let mut recorder = recorder(frames, &sink);
        recorder.run(&AtomicBool::new(false)).unwrap();

        let clips = sink.clips.borrow();
        assert_eq!(clips[0].timestamps, vec![7, 8, 9]);
    }
}
