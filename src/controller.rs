//! Input controller: the public control surface of the kernel.
//!
//! Owns the open source and its producer, exposes the command API
//! (open/close, record, transport), and emits status events. Exactly
//! one source is open at a time: opening always closes the previous
//! source first, joining its producer before the new one starts, so
//! two worker threads never run concurrently in steady state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Local;

use crate::config::CaptureConfig;
use crate::events::{EventBus, PipelineEvent};
use crate::frame::Frame;
use crate::metadata::{MetadataRecord, RecordingParams};
use crate::producer::FrameProducer;
use crate::source::camera::CameraConfig;
use crate::source::{CameraSource, FileOpenError, FileSource, InputSource, InputType};

/// Controller lifecycle state, derived from the open/recording flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Closed,
    OpenIdle,
    OpenRecording,
}

pub struct InputController {
    config: CaptureConfig,
    events: EventBus,
    producer: Option<FrameProducer>,
    input_type: Option<InputType>,
    is_opened: bool,
    current_filename: Option<PathBuf>,
    /// Monotonic start for elapsed time plus the wall-clock ISO stamp
    /// that ends up in the metadata record.
    session_started: Option<(Instant, String)>,
    ticker: Option<RecordingTicker>,
}

impl InputController {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            events: EventBus::new(),
            producer: None,
            input_type: None,
            is_opened: false,
            current_filename: None,
            session_started: None,
            ticker: None,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Open a capture device. Any previously open source is fully
    /// closed first, even when nothing is open.
    pub fn open_camera(&mut self, device: &str) -> bool {
        self.close_input();

        let camera_config = CameraConfig {
            device: device.to_string(),
            ..self.config.camera.clone()
        };
        let mut camera = match CameraSource::new(camera_config) {
            Ok(camera) => camera,
            Err(err) => {
                self.events
                    .emit(PipelineEvent::Status(format!("camera unavailable: {}", err)));
                return false;
            }
        };
        if !camera.open() {
            self.events.emit(PipelineEvent::Status(format!(
                "failed to open camera {}",
                device
            )));
            return false;
        }

        let negotiated_fps = camera.negotiated_fps();
        let fps = if negotiated_fps > 0 {
            negotiated_fps
        } else {
            self.config.camera.target_fps
        };
        self.producer = Some(FrameProducer::spawn(
            InputSource::Camera(camera),
            self.events.clone(),
            fps,
            false,
        ));
        self.is_opened = true;
        self.input_type = Some(InputType::Camera);
        self.events
            .emit(PipelineEvent::Status("camera connected".to_string()));
        self.events
            .emit(PipelineEvent::InputTypeChanged(InputType::Camera));
        true
    }

    /// Open a video file. The producer starts in the paused sub-state
    /// (autoplay off) with frame 0 primed for display.
    pub fn open_video_file(&mut self, path: &str) -> bool {
        self.close_input();

        let mut source = FileSource::new(path);
        if let Err(err) = source.open() {
            let message = match &err {
                FileOpenError::NotFound(_) => "video file not found",
                FileOpenError::UnsupportedExtension(_) => "unsupported video format",
                FileOpenError::DecoderFailed(_) => "failed to open video decoder",
            };
            self.events
                .emit(PipelineEvent::Status(format!("{}: {}", message, path)));
            log::error!("open video file failed: {}", err);
            return false;
        }

        // Autoplay off: the producer starts in the paused sub-state,
        // so the priming read below cannot race the worker loop.
        let producer = FrameProducer::spawn(
            InputSource::File(source),
            self.events.clone(),
            self.config.camera.target_fps,
            true,
        );
        // Prime the display with frame 0, then rewind so playback
        // starts from the beginning when resumed.
        let primed = producer.with_source(|source| {
            let frame = source.read_frame();
            if let Some(file) = source.as_file_mut() {
                file.seek_to_frame(0);
            }
            frame
        });
        if let Some(frame) = primed {
            self.events.emit(PipelineEvent::Frame(Arc::new(frame)));
        }

        self.producer = Some(producer);
        self.is_opened = true;
        self.input_type = Some(InputType::File);
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        self.events.emit(PipelineEvent::Status(format!(
            "video loaded (paused): {}",
            name
        )));
        self.events
            .emit(PipelineEvent::InputTypeChanged(InputType::File));
        true
    }

    /// Close the open source, if any. An active recording is
    /// finalized first and surfaced as a `RecordingFinalized` event
    /// (and in the return value) rather than dropped. Idempotent.
    pub fn close_input(&mut self) -> Option<MetadataRecord> {
        let record = self.finish_recording();
        if let Some(record) = record.as_ref() {
            log::warn!(
                "recording auto-finalized while closing input: {}",
                record.filename
            );
            self.events
                .emit(PipelineEvent::RecordingFinalized(record.clone()));
        }

        if let Some(mut producer) = self.producer.take() {
            producer.stop();
            producer.with_source(|source| source.close());
        }
        self.is_opened = false;
        self.input_type = None;
        self.events
            .emit(PipelineEvent::Status("input disconnected".to_string()));
        self.events.emit(PipelineEvent::InputClosed);
        record
    }

    pub fn is_opened(&self) -> bool {
        self.is_opened
    }

    pub fn input_type(&self) -> Option<InputType> {
        self.input_type
    }

    pub fn state(&self) -> ControllerState {
        if !self.is_opened {
            ControllerState::Closed
        } else if self.is_recording() {
            ControllerState::OpenRecording
        } else {
            ControllerState::OpenIdle
        }
    }

    /// Begin recording the open source to `filename`.
    ///
    /// Creates the destination directory, delegates to the producer,
    /// and on success starts the once-per-second elapsed time events.
    pub fn start_recording(&mut self, filename: &Path) -> bool {
        let Some(producer) = self.producer.as_ref() else {
            return false;
        };
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    log::error!(
                        "cannot create recording directory {}: {}",
                        parent.display(),
                        err
                    );
                    return false;
                }
            }
        }
        if !producer.start_recording(
            filename,
            self.config.recording.fps,
            &self.config.recording.codec,
        ) {
            return false;
        }

        let started = Instant::now();
        self.current_filename = Some(filename.to_path_buf());
        self.session_started = Some((started, Local::now().to_rfc3339()));
        self.ticker = Some(RecordingTicker::spawn(started, self.events.clone()));
        self.events
            .emit(PipelineEvent::Status("recording started".to_string()));
        true
    }

    /// Stop recording and return the finalized record, or `None` when
    /// no session was active.
    pub fn stop_recording(&mut self) -> Option<MetadataRecord> {
        let record = self.finish_recording()?;
        self.events
            .emit(PipelineEvent::Status("recording stopped".to_string()));
        Some(record)
    }

    pub fn is_recording(&self) -> bool {
        self.producer
            .as_ref()
            .map(|producer| producer.is_recording())
            .unwrap_or(false)
    }

    fn finish_recording(&mut self) -> Option<MetadataRecord> {
        let producer = self.producer.as_ref()?;
        let filename = self.current_filename.take()?;
        let duration = producer.stop_recording();
        if let Some(ticker) = self.ticker.take() {
            ticker.stop();
        }
        let start_time = self.session_started.take().map(|(_, iso)| iso);
        let source_info = producer.with_source(|source| source.info());
        Some(MetadataRecord {
            filename: filename.to_string_lossy().to_string(),
            start_time,
            end_time: Local::now().to_rfc3339(),
            duration,
            input_type: self
                .input_type
                .map(|input_type| input_type.as_str().to_string())
                .unwrap_or_default(),
            source_info,
            recording_params: RecordingParams {
                fps: self.config.recording.fps,
                codec: self.config.recording.codec.clone(),
                container: self.config.recording.container.clone(),
            },
        })
    }

    // ------------------------------------------------------------------
    // Transport controls (file sources only)
    // ------------------------------------------------------------------

    fn file_producer(&self) -> Option<&FrameProducer> {
        if self.input_type == Some(InputType::File) {
            self.producer.as_ref()
        } else {
            None
        }
    }

    pub fn pause_playback(&self) -> bool {
        match self.file_producer() {
            Some(producer) => {
                producer.pause();
                true
            }
            None => false,
        }
    }

    pub fn resume_playback(&self) -> bool {
        match self.file_producer() {
            Some(producer) => {
                producer.resume();
                true
            }
            None => false,
        }
    }

    /// Flip play/pause; returns `true` when now playing. Not a file
    /// source: no-op returning `false`.
    pub fn toggle_play_pause(&self) -> bool {
        match self.file_producer() {
            Some(producer) => producer.toggle_pause(),
            None => false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.producer
            .as_ref()
            .map(|producer| producer.is_paused())
            .unwrap_or(false)
    }

    pub fn seek_to_time(&self, seconds: f64) -> bool {
        self.with_file(|file| file.seek_to_time(seconds))
            .unwrap_or(false)
    }

    pub fn seek_to_progress(&self, progress: f64) -> bool {
        self.with_file(|file| file.seek_to_progress(progress))
            .unwrap_or(false)
    }

    pub fn reset_video(&self) -> bool {
        self.with_file(|file| {
            file.reset_to_beginning();
            true
        })
        .unwrap_or(false)
    }

    /// Playback fraction of the open file, 0.0 otherwise.
    pub fn video_progress(&self) -> f64 {
        self.with_file(|file| file.progress()).unwrap_or(0.0)
    }

    fn with_file<R>(&self, f: impl FnOnce(&mut FileSource) -> R) -> Option<R> {
        self.file_producer()
            .and_then(|producer| producer.with_source(|source| source.as_file_mut().map(f)))
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Read one frame directly from the source (for "analyze current
    /// frame" collaborators). Consumes a frame from the stream.
    pub fn current_frame(&self) -> Option<Frame> {
        self.producer
            .as_ref()
            .and_then(|producer| producer.with_source(|source| source.read_frame()))
    }

    pub fn input_info(&self) -> Option<serde_json::Value> {
        self.producer
            .as_ref()
            .map(|producer| producer.with_source(|source| source.info()))
    }
}

impl Drop for InputController {
    fn drop(&mut self) {
        self.close_input();
    }
}

/// Once-per-second elapsed-time emitter for the active session.
///
/// Same request-then-join handshake as the producer: the flag is
/// cooperative and `stop` blocks until the thread exits.
struct RecordingTicker {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RecordingTicker {
    fn spawn(started: Instant, events: EventBus) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let join = std::thread::spawn(move || loop {
            for _ in 0..10 {
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            events.emit(PipelineEvent::RecordingTime(format_elapsed(
                started.elapsed(),
            )));
        });
        Self {
            shutdown,
            join: Some(join),
        }
    }

    fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// `HH:MM:SS` rendering of an elapsed duration.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> InputController {
        let mut config = CaptureConfig::default();
        config.camera.width = 64;
        config.camera.height = 48;
        config.camera.target_fps = 50;
        InputController::new(config)
    }

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(61)), "00:01:01");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "01:02:03");
    }

    #[test]
    fn failed_opens_leave_the_controller_closed() {
        let mut controller = controller();
        assert!(!controller.open_video_file("/no/such/clip.mp4"));
        assert!(!controller.is_opened());
        assert_eq!(controller.state(), ControllerState::Closed);

        #[cfg(not(feature = "camera-v4l2"))]
        {
            assert!(!controller.open_camera("/dev/video9"));
            assert!(!controller.is_opened());
        }
    }

    #[test]
    fn distinct_open_failures_emit_distinct_status() {
        let mut controller = controller();
        let rx = controller.subscribe();

        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "x").unwrap();

        assert!(!controller.open_video_file("/no/such/clip.mp4"));
        assert!(!controller.open_video_file(&text.to_string_lossy()));

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::Status(s) = event {
                statuses.push(s);
            }
        }
        assert!(statuses.iter().any(|s| s.starts_with("video file not found")));
        assert!(statuses
            .iter()
            .any(|s| s.starts_with("unsupported video format")));
    }

    #[test]
    fn file_open_starts_paused_with_frame_zero_primed() {
        let mut controller = controller();
        let rx = controller.subscribe();
        assert!(controller.open_video_file("stub://clip?frames=30&fps=30"));
        assert!(controller.is_opened());
        assert_eq!(controller.input_type(), Some(InputType::File));
        assert_eq!(controller.state(), ControllerState::OpenIdle);
        assert!(controller.is_paused());
        assert_eq!(controller.video_progress(), 0.0);

        let mut saw_frame = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, PipelineEvent::Frame(_)) {
                saw_frame = true;
            }
        }
        assert!(saw_frame, "frame 0 was not primed for display");
    }

    #[test]
    fn transport_is_a_no_op_on_camera_sources() {
        let mut controller = controller();
        assert!(controller.open_camera("stub://cam"));
        assert!(!controller.pause_playback());
        assert!(!controller.resume_playback());
        assert!(!controller.toggle_play_pause());
        assert!(!controller.seek_to_time(1.0));
        assert!(!controller.seek_to_progress(0.5));
        assert!(!controller.reset_video());
        assert_eq!(controller.video_progress(), 0.0);
        controller.close_input();
    }

    #[test]
    fn toggle_pair_restores_the_original_substate() {
        let mut controller = controller();
        assert!(controller.open_video_file("stub://clip?frames=300&fps=30"));
        let initially_paused = controller.is_paused();
        // First toggle: paused -> playing.
        assert!(controller.toggle_play_pause());
        // Second toggle: playing -> paused again.
        assert!(!controller.toggle_play_pause());
        assert_eq!(controller.is_paused(), initially_paused);
        controller.close_input();
    }

    #[test]
    fn opening_a_new_source_closes_the_previous_one() {
        let mut controller = controller();
        let rx = controller.subscribe();
        assert!(controller.open_video_file("stub://clip?frames=30&fps=30"));
        assert!(controller.open_camera("stub://cam"));
        assert_eq!(controller.input_type(), Some(InputType::Camera));
        assert_eq!(controller.state(), ControllerState::OpenIdle);

        let mut closed_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, PipelineEvent::InputClosed) {
                closed_events += 1;
            }
        }
        // One for the initial (idempotent) close, one for the switch.
        assert!(closed_events >= 2);
        controller.close_input();
    }

    #[test]
    fn recording_lifecycle_produces_a_record() {
        let mut controller = controller();
        assert!(controller.open_camera("stub://cam"));
        assert!(!controller.is_recording());
        assert!(controller.stop_recording().is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captures").join("out.mp4");
        assert!(controller.start_recording(&path));
        assert_eq!(controller.state(), ControllerState::OpenRecording);
        std::thread::sleep(Duration::from_millis(200));

        let record = controller.stop_recording().expect("record");
        assert_eq!(controller.state(), ControllerState::OpenIdle);
        assert!(record.duration > 0.0);
        assert_eq!(record.input_type, "camera");
        assert!(record.start_time.is_some());
        assert_eq!(record.recording_params.codec, "mp4v");
        assert_eq!(record.source_info["resolution"], "64x48");
        assert!(path.exists());

        // A second stop is a no-op.
        assert!(controller.stop_recording().is_none());
        controller.close_input();
    }

    #[test]
    fn closing_while_recording_finalizes_instead_of_dropping() {
        let mut controller = controller();
        let rx = controller.subscribe();
        assert!(controller.open_camera("stub://cam"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        assert!(controller.start_recording(&path));
        std::thread::sleep(Duration::from_millis(150));

        let record = controller.close_input().expect("auto-finalized record");
        assert!(record.duration > 0.0);
        assert_eq!(controller.state(), ControllerState::Closed);
        assert!(path.exists());

        let mut finalized = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, PipelineEvent::RecordingFinalized(_)) {
                finalized = true;
            }
        }
        assert!(finalized, "auto-finalized recording was not surfaced");
    }

    #[test]
    fn switching_sources_while_recording_auto_finalizes() {
        let mut controller = controller();
        assert!(controller.open_camera("stub://cam"));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        assert!(controller.start_recording(&path));
        std::thread::sleep(Duration::from_millis(100));

        assert!(controller.open_video_file("stub://clip?frames=30&fps=30"));
        assert!(!controller.is_recording());
        assert!(path.exists());
        controller.close_input();
    }
}
