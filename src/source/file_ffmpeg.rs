//! FFmpeg file decode backend (feature `file-ffmpeg`).
//!
//! Probes stream properties at open, decodes sequentially into RGB24,
//! and seeks by converting a frame index through the stream frame rate.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    total_frames: u64,
    fps: f64,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("open file input '{}' with ffmpeg", path))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .context("file has no video track")?;
        let stream_index = stream.index();

        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            f64::from(rate.numerator()) / f64::from(rate.denominator())
        } else {
            0.0
        };
        let mut total_frames = stream.frames().max(0) as u64;
        if total_frames == 0 && fps > 0.0 {
            // Some containers omit the frame count; estimate from duration.
            let duration_s =
                stream.duration().max(0) as f64 * f64::from(stream.time_base());
            total_frames = (duration_s * fps) as u64;
        }

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            total_frames,
            fps,
        })
    }

    /// Decode the next frame; `None` at end-of-stream or decode error.
    pub(crate) fn read_next(&mut self) -> Option<(Vec<u8>, u32, u32)> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            if let Err(err) = self.decoder.send_packet(&packet) {
                log::warn!("FileSource: decode error in {}: {}", self.path, err);
                return None;
            }
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                if let Err(err) = self.scaler.run(&decoded, &mut rgb_frame) {
                    log::warn!("FileSource: scale error in {}: {}", self.path, err);
                    return None;
                }
                return frame_to_pixels(&rgb_frame);
            }
        }
        None
    }

    pub(crate) fn seek_to_frame(&mut self, frame: u64) -> bool {
        if self.fps <= 0.0 {
            return false;
        }
        let ts = (frame as f64 / self.fps * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
        match self.input.seek(ts, ..ts) {
            Ok(()) => {
                self.decoder.flush();
                true
            }
            Err(err) => {
                log::warn!("FileSource: seek in {} failed: {}", self.path, err);
                false
            }
        }
    }

    pub(crate) fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub(crate) fn fps(&self) -> f64 {
        self.fps
    }

    pub(crate) fn resolution(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Option<(Vec<u8>, u32, u32)> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let row_bytes = width * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Some((data.to_vec(), width as u32, height as u32));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(data.get(start..end)?);
    }
    Some((pixels, width as u32, height as u32))
}
