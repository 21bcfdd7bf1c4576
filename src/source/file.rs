//! Seekable local file frame source.
//!
//! `FileSource` decodes a local video file and adds the transport
//! capabilities a live camera cannot offer: a known frame count, a
//! frame rate, a current position, and the seek family. On reaching
//! end-of-stream the source rewinds itself to frame 0 and returns
//! `None` for that one read, so playback loops from the start.
//!
//! Open failures are surfaced as three distinct causes (missing file,
//! unsupported extension, decoder failure) so the controller can emit
//! a specific status message for each.

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use crate::frame::Frame;
#[cfg(feature = "file-ffmpeg")]
use crate::source::file_ffmpeg::FfmpegFileSource;

/// Extensions the kernel will attempt to decode.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".mp4", ".avi", ".mov", ".mkv", ".flv", ".wmv", ".webm", ".m4v", ".3gp", ".mpg", ".mpeg",
];

const DEFAULT_STUB_FRAMES: u64 = 300;
const DEFAULT_STUB_FPS: f64 = 30.0;
const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;

/// Why a video file failed to open.
#[derive(Debug, Error)]
pub enum FileOpenError {
    #[error("video file not found: {0}")]
    NotFound(String),

    #[error("unsupported video format: {0}")]
    UnsupportedExtension(String),

    #[error("failed to open video decoder: {0}")]
    DecoderFailed(String),
}

/// Seekable file frame source.
pub struct FileSource {
    path: String,
    backend: Option<FileBackend>,
    total_frames: u64,
    fps: f64,
    position: u64,
}

enum FileBackend {
    Synthetic(SyntheticClipSource),
    #[cfg(feature = "file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileBackend {
    fn read_next(&mut self) -> Option<(Vec<u8>, u32, u32)> {
        match self {
            FileBackend::Synthetic(clip) => clip.read_next(),
            #[cfg(feature = "file-ffmpeg")]
            FileBackend::Ffmpeg(decoder) => decoder.read_next(),
        }
    }

    fn seek_to_frame(&mut self, frame: u64) -> bool {
        match self {
            FileBackend::Synthetic(clip) => clip.seek(frame),
            #[cfg(feature = "file-ffmpeg")]
            FileBackend::Ffmpeg(decoder) => decoder.seek_to_frame(frame),
        }
    }

    fn resolution(&self) -> (u32, u32) {
        match self {
            FileBackend::Synthetic(clip) => (clip.width, clip.height),
            #[cfg(feature = "file-ffmpeg")]
            FileBackend::Ffmpeg(decoder) => decoder.resolution(),
        }
    }
}

impl FileSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            backend: None,
            total_frames: 0,
            fps: 0.0,
            position: 0,
        }
    }

    /// Open and probe the file.
    ///
    /// The extension allow-list is checked before any decode attempt;
    /// `stub://` clips bypass the filesystem checks entirely.
    pub fn open(&mut self) -> Result<(), FileOpenError> {
        self.close();

        if self.path.starts_with("stub://") {
            let clip = SyntheticClipSource::from_stub_url(&self.path);
            self.total_frames = clip.total_frames;
            self.fps = clip.fps;
            self.position = 0;
            log::info!(
                "FileSource: opened {} ({} frames @ {} fps, synthetic)",
                self.path,
                self.total_frames,
                self.fps
            );
            self.backend = Some(FileBackend::Synthetic(clip));
            return Ok(());
        }

        if !Path::new(&self.path).exists() {
            return Err(FileOpenError::NotFound(self.path.clone()));
        }
        if !Self::is_supported_format(&self.path) {
            return Err(FileOpenError::UnsupportedExtension(self.path.clone()));
        }

        #[cfg(feature = "file-ffmpeg")]
        {
            let decoder = FfmpegFileSource::open(&self.path)
                .map_err(|err| FileOpenError::DecoderFailed(err.to_string()))?;
            self.total_frames = decoder.total_frames();
            self.fps = decoder.fps();
            self.position = 0;
            log::info!(
                "FileSource: opened {} ({} frames @ {} fps, ffmpeg)",
                self.path,
                self.total_frames,
                self.fps
            );
            self.backend = Some(FileBackend::Ffmpeg(decoder));
            Ok(())
        }
        #[cfg(not(feature = "file-ffmpeg"))]
        {
            Err(FileOpenError::DecoderFailed(
                "file decoding requires the file-ffmpeg feature".to_string(),
            ))
        }
    }

    /// Release the decoder. Idempotent.
    pub fn close(&mut self) {
        self.backend = None;
        self.position = 0;
    }

    /// Read the frame at the current position and advance.
    ///
    /// At end-of-stream the source seeks back to frame 0 and returns
    /// `None` for this call; the next read yields frame 0 again.
    pub fn read_frame(&mut self) -> Option<Frame> {
        let backend = self.backend.as_mut()?;
        match backend.read_next() {
            Some((pixels, width, height)) => {
                let frame = Frame::new(pixels, width, height, self.position);
                self.position += 1;
                Some(frame)
            }
            None => {
                if backend.seek_to_frame(0) {
                    self.position = 0;
                }
                None
            }
        }
    }

    /// Seek to a frame index, clamped into `[0, total_frames)`.
    pub fn seek_to_frame(&mut self, frame: i64) -> bool {
        if self.total_frames == 0 {
            return false;
        }
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        let clamped = frame.clamp(0, self.total_frames as i64 - 1) as u64;
        if backend.seek_to_frame(clamped) {
            self.position = clamped;
            true
        } else {
            false
        }
    }

    /// Seek to a timestamp, converting through the file's frame rate.
    pub fn seek_to_time(&mut self, seconds: f64) -> bool {
        if self.fps <= 0.0 {
            return false;
        }
        self.seek_to_frame((seconds * self.fps) as i64)
    }

    /// Seek to a playback fraction in `[0.0, 1.0]`.
    ///
    /// The target frame is `progress * total_frames` with halves
    /// rounding down, then clamped like `seek_to_frame`.
    pub fn seek_to_progress(&mut self, progress: f64) -> bool {
        if self.total_frames == 0 {
            return false;
        }
        let target = progress * self.total_frames as f64;
        self.seek_to_frame((target - 0.5).ceil() as i64)
    }

    pub fn reset_to_beginning(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            if backend.seek_to_frame(0) {
                self.position = 0;
            }
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Frames per second reported by the file; may be fractional.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Playback fraction in `[0.0, 1.0]`; 0.0 for an empty file.
    pub fn progress(&self) -> f64 {
        if self.total_frames == 0 {
            0.0
        } else {
            self.position as f64 / self.total_frames as f64
        }
    }

    pub fn current_time(&self) -> f64 {
        if self.fps > 0.0 {
            self.position as f64 / self.fps
        } else {
            0.0
        }
    }

    pub fn duration(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }

    pub fn has_more_frames(&self) -> bool {
        self.position < self.total_frames
    }

    /// Hint for the producer's pacing, from the file's own frame rate.
    pub fn frame_interval(&self) -> Option<Duration> {
        if self.fps > 0.0 {
            Some(Duration::from_secs_f64(1.0 / self.fps))
        } else {
            None
        }
    }

    pub fn info(&self) -> serde_json::Value {
        let (width, height) = self
            .backend
            .as_ref()
            .map(|b| b.resolution())
            .unwrap_or((0, 0));
        json!({
            "type": "video_file",
            "path": self.path,
            "resolution": format!("{}x{}", width, height),
            "fps": self.fps,
            "total_frames": self.total_frames,
            "duration": self.duration(),
            "position": self.position,
            "current_time": self.current_time(),
            "progress": self.progress(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Extension allow-list check, applied before any decode attempt.
    pub fn is_supported_format(path: &str) -> bool {
        let Some(ext) = Path::new(path).extension() else {
            return false;
        };
        let dotted = format!(".{}", ext.to_string_lossy().to_lowercase());
        SUPPORTED_EXTENSIONS.contains(&dotted.as_str())
    }
}

// ----------------------------------------------------------------------------
// Synthetic clip (stub://) for tests and headless runs
// ----------------------------------------------------------------------------

/// Deterministic in-memory clip: `stub://name?frames=N&fps=F`.
///
/// Frame content is a pure function of the frame index, so seek tests
/// can assert frame identity by content.
struct SyntheticClipSource {
    total_frames: u64,
    fps: f64,
    width: u32,
    height: u32,
    cursor: u64,
}

impl SyntheticClipSource {
    fn from_stub_url(url: &str) -> Self {
        Self {
            total_frames: stub_param_u64(url, "frames").unwrap_or(DEFAULT_STUB_FRAMES),
            fps: stub_param_f64(url, "fps").unwrap_or(DEFAULT_STUB_FPS),
            width: stub_param_u64(url, "width").unwrap_or(DEFAULT_STUB_WIDTH as u64) as u32,
            height: stub_param_u64(url, "height").unwrap_or(DEFAULT_STUB_HEIGHT as u64) as u32,
            cursor: 0,
        }
    }

    fn read_next(&mut self) -> Option<(Vec<u8>, u32, u32)> {
        if self.cursor >= self.total_frames {
            return None;
        }
        let pixels = self.pixels_for(self.cursor);
        self.cursor += 1;
        Some((pixels, self.width, self.height))
    }

    fn seek(&mut self, frame: u64) -> bool {
        self.cursor = frame;
        true
    }

    fn pixels_for(&self, index: u64) -> Vec<u8> {
        let pixel_count = (self.width * self.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 * 31 + index * 131) % 256) as u8;
        }
        pixels
    }
}

fn stub_param_u64(url: &str, key: &str) -> Option<u64> {
    stub_param_str(url, key)?.parse().ok()
}

fn stub_param_f64(url: &str, key: &str) -> Option<f64> {
    stub_param_str(url, key)?.parse().ok()
}

fn stub_param_str<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    let query = url.split_once('?')?.1;
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == key {
                return Some(v);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_stub(url: &str) -> FileSource {
        let mut source = FileSource::new(url);
        source.open().expect("stub clip opens");
        source
    }

    #[test]
    fn stub_clip_reports_probed_properties() {
        let source = open_stub("stub://clip?frames=120&fps=24");
        assert_eq!(source.total_frames(), 120);
        assert_eq!(source.fps(), 24.0);
        assert_eq!(source.position(), 0);
        assert_eq!(source.duration(), 5.0);
    }

    #[test]
    fn read_advances_position() {
        let mut source = open_stub("stub://clip?frames=10&fps=10");
        let frame = source.read_frame().expect("frame 0");
        assert_eq!(frame.index, 0);
        assert_eq!(source.position(), 1);
    }

    #[test]
    fn end_of_stream_rewinds_and_returns_none_once() {
        let mut source = open_stub("stub://clip?frames=3&fps=10");
        for expected in 0..3 {
            let frame = source.read_frame().expect("frame");
            assert_eq!(frame.index, expected);
        }
        // The read past the last frame rewinds and yields nothing.
        assert!(source.read_frame().is_none());
        assert_eq!(source.position(), 0);
        // Playback then loops from frame 0.
        let frame = source.read_frame().expect("frame after rewind");
        assert_eq!(frame.index, 0);
    }

    #[test]
    fn seek_then_read_returns_that_frame() {
        let mut source = open_stub("stub://clip?frames=100&fps=25");
        assert!(source.seek_to_frame(42));
        let frame = source.read_frame().expect("frame 42");
        assert_eq!(frame.index, 42);
        assert_eq!(source.position(), 43);

        // Content identity: re-seeking produces the same pixels.
        assert!(source.seek_to_frame(42));
        let again = source.read_frame().expect("frame 42 again");
        assert_eq!(again.pixels, frame.pixels);
    }

    #[test]
    fn seek_clamps_to_valid_range() {
        let mut source = open_stub("stub://clip?frames=50&fps=10");
        assert!(source.seek_to_frame(-20));
        assert_eq!(source.position(), 0);
        assert!(source.seek_to_frame(5_000));
        assert_eq!(source.position(), 49);
    }

    #[test]
    fn seek_to_time_converts_through_fps() {
        let mut source = open_stub("stub://clip?frames=300&fps=30");
        assert!(source.seek_to_time(5.0));
        assert_eq!(source.position(), 150);
    }

    #[test]
    fn seek_to_progress_rounds_halves_down() {
        let mut source = open_stub("stub://clip?frames=100&fps=30");
        assert!(source.seek_to_progress(0.5));
        assert_eq!(source.position(), 50);
        // 0.505 * 100 = 50.5 rounds down to 50.
        assert!(source.seek_to_progress(0.505));
        assert_eq!(source.position(), 50);
        // The far edge clamps inside the frame range.
        assert!(source.seek_to_progress(1.0));
        assert_eq!(source.position(), 99);
    }

    #[test]
    fn progress_is_zero_for_empty_files() {
        let mut source = open_stub("stub://clip?frames=0&fps=30");
        assert_eq!(source.progress(), 0.0);
        assert!(source.read_frame().is_none());
        assert!(!source.seek_to_frame(0));
        assert!(!source.seek_to_progress(0.5));
    }

    #[test]
    fn open_failures_are_distinct() {
        let mut missing = FileSource::new("/no/such/dir/clip.mp4");
        assert!(matches!(missing.open(), Err(FileOpenError::NotFound(_))));

        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "not a video").unwrap();
        let mut unsupported = FileSource::new(text.to_string_lossy().to_string());
        assert!(matches!(
            unsupported.open(),
            Err(FileOpenError::UnsupportedExtension(_))
        ));

        #[cfg(not(feature = "file-ffmpeg"))]
        {
            let clip = dir.path().join("clip.mp4");
            std::fs::write(&clip, b"\x00\x00").unwrap();
            let mut undecodable = FileSource::new(clip.to_string_lossy().to_string());
            assert!(matches!(
                undecodable.open(),
                Err(FileOpenError::DecoderFailed(_))
            ));
        }
    }

    #[test]
    fn extension_allow_list() {
        assert!(FileSource::is_supported_format("movie.mp4"));
        assert!(FileSource::is_supported_format("MOVIE.MKV"));
        assert!(FileSource::is_supported_format("clip.webm"));
        assert!(!FileSource::is_supported_format("notes.txt"));
        assert!(!FileSource::is_supported_format("archive"));
    }

    #[test]
    fn reset_returns_to_frame_zero() {
        let mut source = open_stub("stub://clip?frames=20&fps=10");
        assert!(source.seek_to_frame(10));
        source.reset_to_beginning();
        assert_eq!(source.position(), 0);
        assert!(source.has_more_frames());
    }
}
