//! Frame input sources.
//!
//! This module provides the two interchangeable frame origins behind
//! one adapter surface:
//! - Live capture devices (synthetic `stub://` backend always built,
//!   V4L2 devices behind the `camera-v4l2` feature)
//! - Seekable local video files (synthetic `stub://` clips always
//!   built, FFmpeg decoding behind the `file-ffmpeg` feature)
//!
//! Sources produce [`Frame`](crate::frame::Frame) values that flow into
//! the producer loop. A source is owned exclusively by the controller
//! that opened it; at most one source is open at a time.

pub mod camera;
#[cfg(feature = "camera-v4l2")]
pub(crate) mod camera_v4l2;
pub mod file;
#[cfg(feature = "file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use camera::{CameraConfig, CameraSource};
pub use file::{FileOpenError, FileSource, SUPPORTED_EXTENSIONS};

use std::time::Duration;

use crate::frame::Frame;

/// Which kind of source is currently open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputType {
    Camera,
    File,
}

impl InputType {
    /// Stable label used in status events and persisted metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Camera => "camera",
            InputType::File => "video",
        }
    }
}

impl std::fmt::Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame origin: live capture device or seekable file.
///
/// Variant dispatch keeps the capability split explicit: seeking and
/// progress reporting exist only on the `File` arm, queried through
/// [`InputSource::is_seekable`] rather than probed at call sites.
pub enum InputSource {
    Camera(CameraSource),
    File(FileSource),
}

impl InputSource {
    /// Open the underlying device or file.
    ///
    /// Failures are logged and reported as `false`; they never
    /// propagate as errors past the adapter boundary. Callers that
    /// need the distinct file-open failure causes should call
    /// [`FileSource::open`] before wrapping.
    pub fn open(&mut self) -> bool {
        match self {
            InputSource::Camera(source) => source.open(),
            InputSource::File(source) => match source.open() {
                Ok(()) => true,
                Err(err) => {
                    log::error!("file source open failed: {}", err);
                    false
                }
            },
        }
    }

    /// Release the underlying handle. Idempotent.
    pub fn close(&mut self) {
        match self {
            InputSource::Camera(source) => source.close(),
            InputSource::File(source) => source.close(),
        }
    }

    /// Read the next frame.
    ///
    /// `None` from a camera is a transient read failure and the caller
    /// must keep polling; `None` from a file marks end-of-stream (the
    /// file has already rewound itself to frame 0).
    pub fn read_frame(&mut self) -> Option<Frame> {
        match self {
            InputSource::Camera(source) => source.read_frame(),
            InputSource::File(source) => source.read_frame(),
        }
    }

    /// Source description: type, resolution, fps, variant fields.
    pub fn info(&self) -> serde_json::Value {
        match self {
            InputSource::Camera(source) => source.info(),
            InputSource::File(source) => source.info(),
        }
    }

    pub fn input_type(&self) -> InputType {
        match self {
            InputSource::Camera(_) => InputType::Camera,
            InputSource::File(_) => InputType::File,
        }
    }

    /// Capability query: only file sources support transport control.
    pub fn is_seekable(&self) -> bool {
        matches!(self, InputSource::File(_))
    }

    /// Frame-rate hint from the source itself.
    ///
    /// File sources report their own decode rate; cameras return
    /// `None` and are paced by the producer's configured target rate.
    pub fn frame_interval(&self) -> Option<Duration> {
        match self {
            InputSource::Camera(_) => None,
            InputSource::File(source) => source.frame_interval(),
        }
    }

    pub fn as_file(&self) -> Option<&FileSource> {
        match self {
            InputSource::File(source) => Some(source),
            InputSource::Camera(_) => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileSource> {
        match self {
            InputSource::File(source) => Some(source),
            InputSource::Camera(_) => None,
        }
    }
}
