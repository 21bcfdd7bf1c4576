use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::source::camera::CameraConfig;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_CAMERA_DEVICE: &str = "stub://camera0";
const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_RECORDING_FPS: f64 = 30.0;
const DEFAULT_RECORDING_CODEC: &str = "mp4v";
const DEFAULT_RECORDING_CONTAINER: &str = "mp4";
const DEFAULT_RECORDING_PREFIX: &str = "recording";

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    data_dir: Option<String>,
    camera: Option<CameraConfigFile>,
    recording: Option<RecordingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordingConfigFile {
    fps: Option<f64>,
    codec: Option<String>,
    container: Option<String>,
    prefix: Option<String>,
}

/// Recording output parameters applied to every session.
#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub fps: f64,
    pub codec: String,
    pub container: String,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub data_dir: PathBuf,
    pub camera: CameraConfig,
    pub recording: RecordingSettings,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            camera: CameraConfig {
                device: DEFAULT_CAMERA_DEVICE.to_string(),
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
                target_fps: DEFAULT_CAMERA_FPS,
            },
            recording: RecordingSettings {
                fps: DEFAULT_RECORDING_FPS,
                codec: DEFAULT_RECORDING_CODEC.to_string(),
                container: DEFAULT_RECORDING_CONTAINER.to_string(),
                prefix: DEFAULT_RECORDING_PREFIX.to_string(),
            },
        }
    }
}

impl CaptureConfig {
    /// Load configuration: optional JSON file named by `CAPTURE_CONFIG`,
    /// then environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAPTURE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CaptureConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: file
                .data_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            camera: CameraConfig {
                device: file
                    .camera
                    .as_ref()
                    .and_then(|camera| camera.device.clone())
                    .unwrap_or(defaults.camera.device),
                width: file
                    .camera
                    .as_ref()
                    .and_then(|camera| camera.width)
                    .unwrap_or(defaults.camera.width),
                height: file
                    .camera
                    .as_ref()
                    .and_then(|camera| camera.height)
                    .unwrap_or(defaults.camera.height),
                target_fps: file
                    .camera
                    .as_ref()
                    .and_then(|camera| camera.target_fps)
                    .unwrap_or(defaults.camera.target_fps),
            },
            recording: RecordingSettings {
                fps: file
                    .recording
                    .as_ref()
                    .and_then(|recording| recording.fps)
                    .unwrap_or(defaults.recording.fps),
                codec: file
                    .recording
                    .as_ref()
                    .and_then(|recording| recording.codec.clone())
                    .unwrap_or(defaults.recording.codec),
                container: file
                    .recording
                    .as_ref()
                    .and_then(|recording| recording.container.clone())
                    .unwrap_or(defaults.recording.container),
                prefix: file
                    .recording
                    .and_then(|recording| recording.prefix)
                    .unwrap_or(defaults.recording.prefix),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("CAPTURE_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(device) = std::env::var("CAPTURE_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(fps) = std::env::var("CAPTURE_CAMERA_FPS") {
            self.camera.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("CAPTURE_CAMERA_FPS must be an integer frame rate"))?;
        }
        if let Ok(fps) = std::env::var("CAPTURE_RECORDING_FPS") {
            self.recording.fps = fps
                .parse()
                .map_err(|_| anyhow!("CAPTURE_RECORDING_FPS must be a frame rate"))?;
        }
        if let Ok(prefix) = std::env::var("CAPTURE_RECORDING_PREFIX") {
            if !prefix.trim().is_empty() {
                self.recording.prefix = prefix;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.recording.fps <= 0.0 {
            return Err(anyhow!("recording fps must be greater than zero"));
        }
        if self.recording.codec.trim().is_empty() {
            return Err(anyhow!("recording codec must not be empty"));
        }
        if self.recording.container.trim().is_empty() {
            return Err(anyhow!("recording container must not be empty"));
        }
        if self.recording.prefix.trim().is_empty() {
            return Err(anyhow!("recording prefix must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CaptureConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
