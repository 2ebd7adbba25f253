//! V4L2 capture source.
//!
//! Opens a local device node (e.g., /dev/video0), memory-maps its capture buffers
//! and converts whatever pixel format the driver settles on (RGB3, YUYV, NV12) to
//! RGB24 frames.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::{normalize_to_rgb, CameraConfig, CaptureStats, PixelFormat};
use crate::frame::Frame;

pub struct V4l2Source {
    config: CameraConfig,
    state: Option<V4l2State>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    active_format: PixelFormat,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

fn pixel_format_for(fourcc: v4l::FourCC) -> Result<PixelFormat> {
    match &fourcc.repr {
        b"RGB3" => Ok(PixelFormat::Rgb24),
        b"YUYV" => Ok(PixelFormat::Yuyv),
        b"NV12" => Ok(PixelFormat::Nv12),
        other => Err(anyhow!(
            "unsupported v4l2 pixel format {}",
            String::from_utf8_lossy(other)
        )),
    }
}

impl V4l2Source {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            active_format: PixelFormat::Rgb24,
            config,
            state: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;

        let device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let (width, height, pixel_format) = self.negotiate(&device)?;
        self.request_fps(&device);

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("map v4l2 capture buffers"))
            },
        }
        .try_build();
        let state = match state {
            Ok(state) => state,
            Err(err) => {
                self.last_error = Some(format!("{:#}", err));
                return Err(err);
            }
        };

        self.state = Some(state);
        self.active_width = width;
        self.active_height = height;
        self.active_format = pixel_format;
        self.last_error = None;
        log::info!(
            "camera {} streaming {}x{} as {:?}",
            self.config.device,
            width,
            height,
            pixel_format
        );
        Ok(())
    }

    /// Ask for the configured size in RGB3 and accept whatever convertible format
    /// the driver settles on.
    fn negotiate(&self, device: &v4l::Device) -> Result<(u32, u32, PixelFormat)> {
        use v4l::video::Capture;

        let mut wanted = device.format().context("query v4l2 format")?;
        wanted.width = self.config.width;
        wanted.height = self.config.height;
        wanted.fourcc = v4l::FourCC::new(b"RGB3");

        let granted = device.set_format(&wanted).or_else(|err| {
            log::warn!(
                "camera {} kept its own format ({}), falling back to the driver default",
                self.config.device,
                err
            );
            device.format()
        })?;
        let pixel_format = pixel_format_for(granted.fourcc)?;
        if (granted.width, granted.height) != (self.config.width, self.config.height) {
            log::info!(
                "camera {} delivers {}x{} instead of {}x{}",
                self.config.device,
                granted.width,
                granted.height,
                self.config.width,
                self.config.height
            );
        }
        Ok((granted.width, granted.height, pixel_format))
    }

    fn request_fps(&self, device: &v4l::Device) {
        use v4l::video::Capture;

        if self.config.target_fps == 0 {
            return;
        }
        let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
        if let Err(err) = device.set_params(&params) {
            log::debug!(
                "camera {} ignored {} fps request: {}",
                self.config.device,
                self.config.target_fps,
                err
            );
        }
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                anyhow::Error::new(err).context("capture v4l2 frame")
            })?;

        // Drivers may hand back a buffer larger than the payload.
        let used = (meta.bytesused as usize).min(buf.len());
        let rgb = normalize_to_rgb(
            &buf[..used],
            self.active_width,
            self.active_height,
            self.active_format,
        )?;

        let sequence = self.frame_count;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());

        Ok(Frame::from_rgb(
            self.active_width,
            self.active_height,
            rgb,
            sequence,
        )?)
    }

    pub fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}
