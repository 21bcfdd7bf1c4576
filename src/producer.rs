//! Frame producer: the worker loop behind an open source.
//!
//! One producer thread runs per open source. It pulls frames, fans
//! them out to event subscribers and, while a recording is active,
//! writes each frame into the sink synchronously in the same loop
//! iteration — a slow write stalls display delivery, which keeps the
//! recorded stream and the displayed stream identical.
//!
//! Control operations are cooperative flag flips observed once per
//! iteration: a command issued from the control context takes effect
//! within one poll interval, never atomically with the issuing call.
//! `stop` is the only teardown path; it finalizes any active
//! recording, clears the run flag, and blocks until the thread has
//! exited, so no orphaned thread or dangling writer can survive it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::events::{EventBus, PipelineEvent};
use crate::sink::RecordingSink;
use crate::source::InputSource;

/// Poll granularity while paused.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fallback pacing when no rate is configured or reported.
const DEFAULT_FRAME_INTERVAL_MS: u64 = 33;

struct ProducerShared {
    active: AtomicBool,
    paused: AtomicBool,
    recording: AtomicBool,
    /// Pacing for camera sources, millis between reads. File sources
    /// pace from their own reported frame rate instead.
    camera_interval_ms: AtomicU64,
    source: Mutex<InputSource>,
    sink: Mutex<Option<RecordingSink>>,
    recording_started: Mutex<Option<Instant>>,
    events: EventBus,
}

pub struct FrameProducer {
    shared: Arc<ProducerShared>,
    join: Option<JoinHandle<()>>,
}

impl FrameProducer {
    /// Start the worker loop over an already-opened source.
    ///
    /// `start_paused` spawns the loop already in the paused sub-state,
    /// so no frame is read before the first resume.
    pub fn spawn(
        source: InputSource,
        events: EventBus,
        target_fps: u32,
        start_paused: bool,
    ) -> Self {
        let shared = Arc::new(ProducerShared {
            active: AtomicBool::new(true),
            paused: AtomicBool::new(start_paused),
            recording: AtomicBool::new(false),
            camera_interval_ms: AtomicU64::new(interval_ms_for(target_fps)),
            source: Mutex::new(source),
            sink: Mutex::new(None),
            recording_started: Mutex::new(None),
            events,
        });
        let worker = shared.clone();
        let join = std::thread::spawn(move || run_loop(&worker));
        Self {
            shared,
            join: Some(join),
        }
    }

    /// Adjust camera pacing. No effect on file sources.
    pub fn set_frame_rate(&self, fps: u32) {
        self.shared
            .camera_interval_ms
            .store(interval_ms_for(fps), Ordering::SeqCst);
    }

    /// Begin recording to `path`.
    ///
    /// Reads one frame to learn the output dimensions (that frame is
    /// consumed, not displayed). Returns `false` without side effects
    /// when no frame is available, when the sink cannot be opened, or
    /// when a recording is already active — an in-progress session is
    /// never implicitly stopped.
    pub fn start_recording(&self, path: &Path, fps: f64, codec: &str) -> bool {
        if self.shared.recording.load(Ordering::SeqCst) {
            log::warn!(
                "recording already active, rejecting start for {}",
                path.display()
            );
            return false;
        }
        let Some(frame) = self
            .shared
            .source
            .lock()
            .expect("source lock poisoned")
            .read_frame()
        else {
            log::warn!("no frame available, cannot start recording");
            return false;
        };
        let sink = match RecordingSink::open(path, fps, codec, frame.width, frame.height) {
            Ok(sink) => sink,
            Err(err) => {
                log::error!("failed to open recording sink: {}", err);
                return false;
            }
        };
        *self.shared.sink.lock().expect("sink lock poisoned") = Some(sink);
        *self
            .shared
            .recording_started
            .lock()
            .expect("session lock poisoned") = Some(Instant::now());
        self.shared.recording.store(true, Ordering::SeqCst);
        log::info!("recording started: {}", path.display());
        true
    }

    /// Stop recording, finalize the writer, and return the elapsed
    /// duration in seconds (0.0 when no session was active).
    pub fn stop_recording(&self) -> f64 {
        self.shared.recording.store(false, Ordering::SeqCst);
        if let Some(sink) = self
            .shared
            .sink
            .lock()
            .expect("sink lock poisoned")
            .take()
        {
            if let Err(err) = sink.finalize() {
                log::error!("failed to finalize recording: {}", err);
            }
        }
        self.shared
            .recording_started
            .lock()
            .expect("session lock poisoned")
            .take()
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    /// Elapsed time of the active recording, live from session start.
    pub fn recording_elapsed(&self) -> Option<Duration> {
        self.shared
            .recording_started
            .lock()
            .expect("session lock poisoned")
            .map(|started| started.elapsed())
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    /// Flip the pause flag; returns `true` when now playing.
    pub fn toggle_pause(&self) -> bool {
        let was_paused = self.shared.paused.load(Ordering::SeqCst);
        self.shared.paused.store(!was_paused, Ordering::SeqCst);
        was_paused
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Run a closure against the source under the producer's lock.
    ///
    /// This is how the controller issues transport commands (seek,
    /// reset, info) without racing the worker's reads.
    pub fn with_source<R>(&self, f: impl FnOnce(&mut InputSource) -> R) -> R {
        let mut source = self.shared.source.lock().expect("source lock poisoned");
        f(&mut source)
    }

    /// Stop the worker: finalize any active recording, clear the run
    /// flag, and block until the loop has exited. The sole teardown
    /// path; afterwards the source can be released safely.
    pub fn stop(&mut self) {
        if self.shared.recording.load(Ordering::SeqCst) {
            self.stop_recording();
        }
        self.shared.active.store(false, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("frame producer thread panicked");
            }
        }
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn interval_ms_for(fps: u32) -> u64 {
    if fps == 0 {
        DEFAULT_FRAME_INTERVAL_MS
    } else {
        (1000 / fps).max(1) as u64
    }
}

fn run_loop(shared: &ProducerShared) {
    while shared.active.load(Ordering::SeqCst) {
        if shared.paused.load(Ordering::SeqCst) {
            std::thread::sleep(PAUSE_POLL_INTERVAL);
            continue;
        }

        let (frame, interval, info) = {
            let mut source = shared.source.lock().expect("source lock poisoned");
            let frame = source.read_frame();
            let interval = source.frame_interval();
            let info = frame.as_ref().map(|_| source.info());
            (frame, interval, info)
        };

        if let Some(frame) = frame {
            let frame = Arc::new(frame);
            shared.events.emit(PipelineEvent::Frame(frame.clone()));
            if shared.recording.load(Ordering::SeqCst) {
                let mut sink = shared.sink.lock().expect("sink lock poisoned");
                if let Some(sink) = sink.as_mut() {
                    // Synchronous by design: the frame is not
                    // considered delivered until it is on disk.
                    if let Err(err) = sink.write(&frame) {
                        log::warn!("recording write failed: {}", err);
                    }
                }
            }
            if let Some(info) = info {
                shared.events.emit(PipelineEvent::SourceInfo(info));
            }
        }
        // Cameras skip transient failures and keep polling; files have
        // already rewound themselves at end-of-stream.

        let delay = interval.unwrap_or_else(|| {
            Duration::from_millis(shared.camera_interval_ms.load(Ordering::SeqCst).max(1))
        });
        std::thread::sleep(delay);
    }
}
