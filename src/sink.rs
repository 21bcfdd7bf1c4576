//! Recording sink.
//!
//! A `RecordingSink` owns one open output writer bound to a single
//! file, accepts frames of the dimensions fixed at open, and releases
//! the handle on `finalize`. Finalization consumes the sink, so a
//! writer can never be finalized twice or written after release.
//!
//! The on-disk layout is a minimal length-prefixed container: a header
//! carrying dimensions, frame rate and codec tag, followed by raw
//! frame payloads. Encoding guarantees beyond the recorded metadata
//! are outside the kernel's contract.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::frame::Frame;

const SINK_MAGIC: &[u8; 4] = b"CKR1";

pub struct RecordingSink {
    path: PathBuf,
    fps: f64,
    codec: String,
    width: u32,
    height: u32,
    frames_written: u64,
    writer: BufWriter<File>,
}

impl RecordingSink {
    /// Open a writer bound to `(path, fps, codec)` with frame
    /// dimensions fixed for the lifetime of the sink.
    pub fn open(path: &Path, fps: f64, codec: &str, width: u32, height: u32) -> Result<Self> {
        if fps <= 0.0 {
            return Err(anyhow!("recording fps must be positive, got {}", fps));
        }
        let file = File::create(path)
            .with_context(|| format!("create recording output {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        let codec_bytes = codec.as_bytes();
        writer.write_all(SINK_MAGIC)?;
        writer.write_all(&width.to_le_bytes())?;
        writer.write_all(&height.to_le_bytes())?;
        writer.write_all(&fps.to_le_bytes())?;
        writer.write_all(&(codec_bytes.len() as u32).to_le_bytes())?;
        writer.write_all(codec_bytes)?;

        Ok(Self {
            path: path.to_path_buf(),
            fps,
            codec: codec.to_string(),
            width,
            height,
            frames_written: 0,
            writer,
        })
    }

    /// Append one frame. Frames must match the dimensions fixed at open.
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame size {}x{} does not match sink {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }
        self.writer
            .write_all(&(frame.pixels.len() as u32).to_le_bytes())?;
        self.writer.write_all(&frame.pixels)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Flush buffered frames and release the file handle.
    pub fn finalize(mut self) -> Result<()> {
        self.writer.flush().context("flush recording output")?;
        self.writer
            .get_ref()
            .sync_all()
            .context("sync recording output")?;
        log::info!(
            "RecordingSink: finalized {} ({} frames, {} fps, codec {})",
            self.path.display(),
            self.frames_written,
            self.fps,
            self.codec
        );
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame(width: u32, height: u32, index: u64) -> Frame {
        Frame::new(vec![7u8; (width * height * 3) as usize], width, height, index)
    }

    #[test]
    fn sink_writes_and_finalizes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.mp4");
        let mut sink = RecordingSink::open(&path, 30.0, "mp4v", 64, 48)?;
        sink.write(&test_frame(64, 48, 0))?;
        sink.write(&test_frame(64, 48, 1))?;
        assert_eq!(sink.frames_written(), 2);
        sink.finalize()?;

        let written = std::fs::read(&path)?;
        assert!(written.starts_with(SINK_MAGIC));
        // Header plus two length-prefixed frame payloads.
        let frame_bytes = 64 * 48 * 3;
        assert!(written.len() > 2 * frame_bytes);
        Ok(())
    }

    #[test]
    fn sink_rejects_mismatched_dimensions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.mp4");
        let mut sink = RecordingSink::open(&path, 30.0, "mp4v", 64, 48)?;
        assert!(sink.write(&test_frame(32, 32, 0)).is_err());
        Ok(())
    }

    #[test]
    fn sink_rejects_nonpositive_fps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        assert!(RecordingSink::open(&path, 0.0, "mp4v", 64, 48).is_err());
    }
}
