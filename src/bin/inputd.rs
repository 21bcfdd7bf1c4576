//! inputd - media input pipeline daemon
//!
//! This daemon:
//! 1. Opens the configured input source (camera by default, or a video
//!    file named by CAPTURE_INPUT)
//! 2. Streams frames through the producer and logs pipeline events
//! 3. Optionally records for CAPTURE_RECORD_SECS seconds and persists
//!    the resulting metadata record
//! 4. Shuts down cleanly on Ctrl-C, joining the producer thread

use anyhow::{ensure, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use capture_kernel::{CaptureConfig, InputController, InputType, MetadataStore, PipelineEvent};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = CaptureConfig::load()?;
    let mut store = MetadataStore::open(&cfg.data_dir)?;
    let mut controller = InputController::new(cfg.clone());
    let events = controller.subscribe();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    let opened = match std::env::var("CAPTURE_INPUT") {
        Ok(path) if !path.trim().is_empty() => controller.open_video_file(&path),
        _ => {
            let device = cfg.camera.device.clone();
            controller.open_camera(&device)
        }
    };
    ensure!(opened, "failed to open input source");
    if controller.input_type() == Some(InputType::File) {
        // Files open paused; a headless daemon plays them immediately.
        controller.resume_playback();
    }

    let record_secs: Option<u64> = std::env::var("CAPTURE_RECORD_SECS")
        .ok()
        .and_then(|value| value.parse().ok());
    let record_deadline = record_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
    if record_secs.is_some() {
        let path = store.generate_filename(&cfg.recording.prefix, &cfg.recording.container);
        ensure!(
            controller.start_recording(&path),
            "failed to start recording to {}",
            path.display()
        );
    }

    log::info!("inputd running, data dir {}", cfg.data_dir.display());

    let mut frame_count = 0u64;
    let mut last_health_log = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(PipelineEvent::Frame(_)) => frame_count += 1,
            Ok(PipelineEvent::Status(status)) => log::info!("status: {}", status),
            Ok(PipelineEvent::RecordingTime(elapsed)) => log::info!("recording {}", elapsed),
            Ok(PipelineEvent::RecordingFinalized(record)) => {
                store.save_metadata(&record)?;
                log::warn!("auto-finalized recording saved: {}", record.filename);
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(deadline) = record_deadline {
            if controller.is_recording() && Instant::now() >= deadline {
                if let Some(record) = controller.stop_recording() {
                    store.save_metadata(&record)?;
                    log::info!(
                        "recording saved: {} ({:.1}s)",
                        record.filename,
                        record.duration
                    );
                }
            }
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            if let Some(info) = controller.input_info() {
                log::info!("pipeline health: {} frames, source {}", frame_count, info);
            }
            last_health_log = Instant::now();
        }
    }

    if let Some(record) = controller.stop_recording() {
        store.save_metadata(&record)?;
        log::info!("recording saved on shutdown: {}", record.filename);
    }
    controller.close_input();
    log::info!("inputd stopped after {} frames", frame_count);
    Ok(())
}
