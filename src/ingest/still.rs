//! Still image source.
//!
//! Decodes one local image file on connect and replays it as a stream. Useful for
//! checking a model against a known picture without a camera attached.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::{CameraConfig, CaptureStats};
use crate::frame::Frame;

pub struct StillImageSource {
    config: CameraConfig,
    image: Option<RgbImage>,
    frame_count: u64,
}

impl StillImageSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            image: None,
            frame_count: 0,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        let path = Path::new(&self.config.device);
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .to_rgb8();
        log::info!(
            "StillImageSource: loaded {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        self.image = Some(image);
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| anyhow!("still image source not connected"))?;
        let sequence = self.frame_count;
        self.frame_count += 1;
        Ok(Frame::from_image(image.clone(), sequence))
    }

    pub fn is_healthy(&self) -> bool {
        self.image.is_some()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}
