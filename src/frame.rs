//! Captured frames.
//!
//! - `Frame`: one RGB24 image buffer from the video stream, plus capture metadata.
//! - `FrameToken` (see `gate`): a frame that passed admission and is owned by the
//!   in-flight inference call.
//!
//! Sources normalise every pixel format to RGB24 before a `Frame` is built, so the
//! rest of the pipeline only deals with one layout.

use std::time::{Duration, Instant};

use image::RgbImage;

use crate::error::{ClassifyError, ClassifyResult};

/// Bytes per pixel of the normalised frame layout.
pub const RGB_CHANNELS: usize = 3;

/// One captured image buffer.
///
/// Not `Clone`: a frame is either handed to the gate or dropped.
pub struct Frame {
    image: RgbImage,
    /// Monotonic capture counter assigned by the source.
    pub sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Build a frame from tightly packed RGB24 pixels.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>, sequence: u64) -> ClassifyResult<Self> {
        if width == 0 || height == 0 {
            return Err(ClassifyError::invalid_frame(format!(
                "frame has zero dimension ({}x{})",
                width, height
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
            .ok_or_else(|| ClassifyError::invalid_frame("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(ClassifyError::invalid_frame(format!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| ClassifyError::invalid_frame("pixel buffer rejected"))?;
        Ok(Self::from_image(image, sequence))
    }

    pub fn from_image(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Time since capture. Used for latency logging only.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}
