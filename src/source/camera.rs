//! Live capture device source.
//!
//! `CameraSource` opens a capture device, requests the configured
//! resolution and frame rate, and then reports the *negotiated* values
//! the device actually granted. Transient read failures yield `None`
//! from `read_frame` and the caller keeps polling; a camera never
//! signals end-of-stream.

use serde_json::json;

use crate::frame::Frame;
#[cfg(feature = "camera-v4l2")]
use crate::source::camera_v4l2::V4l2CameraSource;

/// Configuration for a capture device.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or a `stub://` name.
    pub device: String,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Requested frame rate (frames per second).
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://camera0".to_string(),
            width: 1280,
            height: 720,
            target_fps: 30,
        }
    }
}

/// Live capture source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCameraSource),
    #[cfg(feature = "camera-v4l2")]
    V4l2(V4l2CameraSource),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> anyhow::Result<Self> {
        if config.device.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCameraSource::new(config)),
            })
        } else {
            #[cfg(feature = "camera-v4l2")]
            {
                Ok(Self {
                    backend: CameraBackend::V4l2(V4l2CameraSource::new(config)),
                })
            }
            #[cfg(not(feature = "camera-v4l2"))]
            {
                Err(anyhow::anyhow!(
                    "capture device access requires the camera-v4l2 feature"
                ))
            }
        }
    }

    /// Open the device and negotiate capture parameters.
    ///
    /// Returns `false` on failure; the cause is logged, never raised.
    pub fn open(&mut self) -> bool {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.open(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::V4l2(source) => source.open(),
        }
    }

    /// Release the device handle. Idempotent.
    pub fn close(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.close(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::V4l2(source) => source.close(),
        }
    }

    /// Capture the next frame, or `None` on a transient failure.
    pub fn read_frame(&mut self) -> Option<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.read_frame(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::V4l2(source) => source.read_frame(),
        }
    }

    pub fn info(&self) -> serde_json::Value {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.info(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::V4l2(source) => source.info(),
        }
    }

    /// Frame rate granted by the device, valid after `open`.
    pub fn negotiated_fps(&self) -> u32 {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.negotiated_fps,
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::V4l2(source) => source.negotiated_fps(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and headless runs
// ----------------------------------------------------------------------------

struct SyntheticCameraSource {
    config: CameraConfig,
    opened: bool,
    frame_count: u64,
    negotiated_width: u32,
    negotiated_height: u32,
    negotiated_fps: u32,
    /// Every n-th read fails transiently when set (from the stub URL's
    /// `fail_every` parameter), exercising the skip-tolerance path.
    fail_every: Option<u64>,
}

impl SyntheticCameraSource {
    fn new(config: CameraConfig) -> Self {
        let fail_every = stub_param(&config.device, "fail_every");
        Self {
            negotiated_width: config.width,
            negotiated_height: config.height,
            negotiated_fps: config.target_fps,
            config,
            opened: false,
            frame_count: 0,
            fail_every,
        }
    }

    fn open(&mut self) -> bool {
        // Synthetic devices grant whatever was requested.
        self.negotiated_width = self.config.width;
        self.negotiated_height = self.config.height;
        self.negotiated_fps = self.config.target_fps;
        self.opened = true;
        log::info!(
            "CameraSource: connected to {} ({}x{} @ {} fps, synthetic)",
            self.config.device,
            self.negotiated_width,
            self.negotiated_height,
            self.negotiated_fps
        );
        true
    }

    fn close(&mut self) {
        self.opened = false;
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if !self.opened {
            return None;
        }
        self.frame_count += 1;
        if let Some(n) = self.fail_every {
            if n > 0 && self.frame_count % n == 0 {
                return None;
            }
        }
        let pixels = self.generate_synthetic_pixels();
        Some(Frame::new(
            pixels,
            self.negotiated_width,
            self.negotiated_height,
            self.frame_count,
        ))
    }

    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.negotiated_width * self.negotiated_height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        pixels
    }

    fn info(&self) -> serde_json::Value {
        json!({
            "type": "camera",
            "device": self.config.device,
            "resolution": format!("{}x{}", self.negotiated_width, self.negotiated_height),
            "fps": self.negotiated_fps,
            "backend": "synthetic",
        })
    }
}

/// Parse an integer query parameter out of a `stub://name?k=v&...` URL.
pub(crate) fn stub_param(device: &str, key: &str) -> Option<u64> {
    let query = device.split_once('?')?.1;
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == key {
                return v.parse().ok();
            }
        }
    }
    None
}
