//! Frame-to-model-input preprocessing.
//!
//! A frame is center-cropped and then resized to exactly the model's input size.
//! The functions here are pure: same frame and target in, same buffer out.

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, ClassifyResult};
use crate::frame::Frame;
use crate::model::ModelProfile;

/// Region of the source frame that feeds the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How the crop region is sized before scaling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropStrategy {
    /// Crop exactly the target size out of the middle of the frame.
    #[default]
    Exact,
    /// Crop the largest centered region with the target aspect ratio, then scale down.
    AspectFill,
}

impl fmt::Display for CropStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CropStrategy::Exact => f.write_str("exact"),
            CropStrategy::AspectFill => f.write_str("aspect-fill"),
        }
    }
}

impl FromStr for CropStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(CropStrategy::Exact),
            "aspect-fill" | "aspect_fill" | "fill" => Ok(CropStrategy::AspectFill),
            other => Err(anyhow::anyhow!(
                "unknown crop strategy '{}' (expected exact or aspect-fill)",
                other
            )),
        }
    }
}

/// Centered crop of `target_width x target_height` inside a `src_width x src_height` frame.
///
/// Origin is `((W - w) / 2, (H - h) / 2)` with integer division.
pub fn center_crop_rect(
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
) -> ClassifyResult<CropRect> {
    check_target(src_width, src_height, target_width, target_height)?;
    Ok(CropRect {
        x: (src_width - target_width) / 2,
        y: (src_height - target_height) / 2,
        width: target_width,
        height: target_height,
    })
}

/// Largest centered crop with the target's aspect ratio.
pub fn aspect_fill_rect(
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
) -> ClassifyResult<CropRect> {
    check_target(src_width, src_height, target_width, target_height)?;

    let (sw, sh) = (src_width as u64, src_height as u64);
    let (tw, th) = (target_width as u64, target_height as u64);
    let (crop_w, crop_h) = if sw * th >= sh * tw {
        // Source is wider than the target: keep full height.
        ((sh * tw / th) as u32, src_height)
    } else {
        (src_width, (sw * th / tw) as u32)
    };

    Ok(CropRect {
        x: (src_width - crop_w) / 2,
        y: (src_height - crop_h) / 2,
        width: crop_w,
        height: crop_h,
    })
}

fn check_target(
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
) -> ClassifyResult<()> {
    if target_width == 0 || target_height == 0 {
        return Err(ClassifyError::invalid_frame(format!(
            "target size {}x{} has a zero dimension",
            target_width, target_height
        )));
    }
    if target_width > src_width || target_height > src_height {
        return Err(ClassifyError::invalid_frame(format!(
            "source {}x{} is smaller than target {}x{}",
            src_width, src_height, target_width, target_height
        )));
    }
    Ok(())
}

/// Crop and scale with the default exact-center strategy.
pub fn crop_and_scale(
    frame: &Frame,
    target_width: u32,
    target_height: u32,
) -> ClassifyResult<RgbImage> {
    Preprocessor::default().crop_and_scale(frame, target_width, target_height)
}

#[derive(Clone, Copy, Debug)]
pub struct Preprocessor {
    strategy: CropStrategy,
    filter: FilterType,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            strategy: CropStrategy::Exact,
            filter: FilterType::Triangle,
        }
    }
}

impl Preprocessor {
    pub fn new(strategy: CropStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn strategy(&self) -> CropStrategy {
        self.strategy
    }

    pub fn crop_rect(
        &self,
        src_width: u32,
        src_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> ClassifyResult<CropRect> {
        match self.strategy {
            CropStrategy::Exact => {
                center_crop_rect(src_width, src_height, target_width, target_height)
            }
            CropStrategy::AspectFill => {
                aspect_fill_rect(src_width, src_height, target_width, target_height)
            }
        }
    }

    /// Produce the model input buffer for `profile`.
    pub fn prepare(&self, frame: &Frame, profile: ModelProfile) -> ClassifyResult<RgbImage> {
        self.crop_and_scale(frame, profile.input_width, profile.input_height)
    }

    pub fn crop_and_scale(
        &self,
        frame: &Frame,
        target_width: u32,
        target_height: u32,
    ) -> ClassifyResult<RgbImage> {
        let rect = self.crop_rect(frame.width(), frame.height(), target_width, target_height)?;
        let cropped =
            imageops::crop_imm(frame.image(), rect.x, rect.y, rect.width, rect.height).to_image();
        if cropped.dimensions() == (target_width, target_height) {
            return Ok(cropped);
        }
        Ok(imageops::resize(
            &cropped,
            target_width,
            target_height,
            self.filter,
        ))
    }
}
