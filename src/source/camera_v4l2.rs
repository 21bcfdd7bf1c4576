//! V4L2 capture backend (feature `camera-v4l2`).
//!
//! Requests the configured format and frame rate, then records whatever
//! the device actually granted. Capture failures after open are treated
//! as transient by the caller.

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use crate::frame::Frame;
use crate::source::camera::CameraConfig;

pub(crate) struct V4l2CameraSource {
    config: CameraConfig,
    state: Option<V4l2State>,
    frame_count: u64,
    negotiated_width: u32,
    negotiated_height: u32,
    negotiated_fps: u32,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2CameraSource {
    pub(crate) fn new(config: CameraConfig) -> Self {
        Self {
            negotiated_width: config.width,
            negotiated_height: config.height,
            negotiated_fps: config.target_fps,
            config,
            state: None,
            frame_count: 0,
        }
    }

    pub(crate) fn open(&mut self) -> bool {
        match self.try_open() {
            Ok(()) => true,
            Err(err) => {
                log::error!("CameraSource: open {} failed: {}", self.config.device, err);
                self.state = None;
                false
            }
        }
    }

    fn try_open(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;

        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");
        // The device may refuse the request; keep whatever it grants.
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.negotiated_width = format.width;
        self.negotiated_height = format.height;

        self.negotiated_fps = self.config.target_fps;
        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
            if let Ok(params) = device.params() {
                let interval = params.interval;
                if interval.numerator > 0 {
                    self.negotiated_fps = interval.denominator / interval.numerator;
                }
            }
        }

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "CameraSource: connected to {} ({}x{} @ {} fps)",
            self.config.device,
            self.negotiated_width,
            self.negotiated_height,
            self.negotiated_fps
        );
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.state = None;
    }

    pub(crate) fn read_frame(&mut self) -> Option<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut()?;
        match state.with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec())) {
            Ok(pixels) => {
                self.frame_count += 1;
                Some(Frame::new(
                    pixels,
                    self.negotiated_width,
                    self.negotiated_height,
                    self.frame_count,
                ))
            }
            Err(err) => {
                log::warn!(
                    "CameraSource: capture on {} failed (skipping frame): {}",
                    self.config.device,
                    err
                );
                None
            }
        }
    }

    pub(crate) fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "camera",
            "device": self.config.device,
            "resolution": format!("{}x{}", self.negotiated_width, self.negotiated_height),
            "fps": self.negotiated_fps,
            "backend": "v4l2",
        })
    }

    pub(crate) fn negotiated_fps(&self) -> u32 {
        self.negotiated_fps
    }
}
