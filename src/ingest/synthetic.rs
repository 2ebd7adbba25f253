//! Synthetic capture source (`stub://`).
//!
//! Produces a reproducible scene: a dominant colour tint over a gradient with
//! seeded sensor noise. The tint rotates red, green, blue every `scene_period`
//! frames so a colour classifier sees the scene change.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{CameraConfig, CaptureStats};
use crate::frame::Frame;

const NOISE_AMPLITUDE: i16 = 12;

pub struct SyntheticSource {
    config: CameraConfig,
    frame_count: u64,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            frame_count: 0,
            rng,
        }
    }

    /// Synthetic sources are always "connected".
    pub fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        let sequence = self.frame_count;
        self.frame_count += 1;
        let pixels = self.generate_pixels(sequence);
        Ok(Frame::from_rgb(
            self.config.width,
            self.config.height,
            pixels,
            sequence,
        )?)
    }

    /// Index of the dominant channel for a given frame.
    pub fn dominant_channel(&self, sequence: u64) -> usize {
        let period = self.config.scene_period.max(1);
        ((sequence / period) % 3) as usize
    }

    fn generate_pixels(&mut self, sequence: u64) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let dominant = self.dominant_channel(sequence);

        let mut pixels = vec![0u8; width * height * 3];
        for (index, pixel) in pixels.chunks_exact_mut(3).enumerate() {
            let x = index % width;
            let gradient = (x * 40 / width.max(1)) as i16;
            for (channel, value) in pixel.iter_mut().enumerate() {
                let base: i16 = if channel == dominant { 190 } else { 50 };
                let noise = self.rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
                *value = (base + gradient + noise).clamp(0, 255) as u8;
            }
        }
        pixels
    }

    pub fn is_healthy(&self) -> bool {
        true
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}
