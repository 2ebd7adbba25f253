//! Capture sources.
//!
//! This module provides the sources a camera stream can come from:
//! - Synthetic scenes (`stub://...`) for tests and demos
//! - Still image files replayed as a stream (local paths)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every source produces RGB24 `Frame`s with a monotonically increasing sequence
//! number. Pixel formats other than RGB24 are normalised at capture time.

mod normalize;
pub mod still;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::error::{ClassifyError, ClassifyResult};
use crate::frame::Frame;

pub use normalize::{normalize_to_rgb, PixelFormat};
pub use still::StillImageSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

const DEFAULT_SCENE_PERIOD: u64 = 30;
const DEFAULT_SEED: u64 = 0x5eed;

/// Configuration for a capture source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// `stub://name`, a local image path, or a V4L2 device node such as `/dev/video0`.
    pub device: String,
    /// Target frame rate. 0 delivers frames as fast as the source produces them.
    pub target_fps: u32,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Synthetic sources: frames between scene changes.
    pub scene_period: u64,
    /// Synthetic sources: noise seed.
    pub seed: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://camera".to_string(),
            target_fps: 15,
            width: 640,
            height: 480,
            scene_period: DEFAULT_SCENE_PERIOD,
            seed: DEFAULT_SEED,
        }
    }
}

/// Statistics for a capture source.
#[derive(Clone, Debug)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub device: String,
}

/// A camera stream, dispatched on the configured device string.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    Still(StillImageSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Source),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> ClassifyResult<Self> {
        let device = config.device.trim();
        if device.is_empty() {
            return Err(ClassifyError::device_unavailable("no capture device configured"));
        }
        if device.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(config)),
            });
        }
        if device.contains("://") {
            return Err(ClassifyError::device_unavailable(format!(
                "unsupported capture URL '{}' (expected stub://, a device node, or a local image)",
                device
            )));
        }
        if device.starts_with("/dev/video") {
            return Self::video_node(config);
        }
        Ok(Self {
            backend: CameraBackend::Still(StillImageSource::new(config)),
        })
    }

    #[cfg(feature = "ingest-v4l2")]
    fn video_node(config: CameraConfig) -> ClassifyResult<Self> {
        Ok(Self {
            backend: CameraBackend::V4l2(V4l2Source::new(config)),
        })
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn video_node(config: CameraConfig) -> ClassifyResult<Self> {
        Err(ClassifyError::device_unavailable(format!(
            "{} requires the ingest-v4l2 feature",
            config.device
        )))
    }

    /// Open the device. Failures are `DeviceUnavailable`.
    pub fn connect(&mut self) -> ClassifyResult<()> {
        let result = match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            CameraBackend::Still(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.connect(),
        };
        result.map_err(|err| ClassifyError::device_unavailable(format!("{:#}", err)))
    }

    /// Capture the next frame.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            CameraBackend::Still(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.next_frame(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_healthy(),
            CameraBackend::Still(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.is_healthy(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> CaptureStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            CameraBackend::Still(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(device: &str) -> CameraConfig {
        CameraConfig {
            device: device.to_string(),
            ..CameraConfig::default()
        }
    }

    #[test]
    fn stub_device_produces_frames() -> Result<()> {
        let mut source = CameraSource::new(config("stub://test"))?;
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!((frame.width(), frame.height()), (640, 480));
        assert_eq!(source.stats().frames_captured, 1);
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn remote_urls_are_unavailable() {
        let err = CameraSource::new(config("rtsp://10.0.0.2/stream")).err().unwrap();
        assert!(matches!(err, ClassifyError::DeviceUnavailable(_)));
    }

    #[test]
    fn empty_device_is_unavailable() {
        let err = CameraSource::new(config("  ")).err().unwrap();
        assert!(matches!(err, ClassifyError::DeviceUnavailable(_)));
    }

    #[test]
    fn missing_image_fails_on_connect() {
        let mut source = CameraSource::new(config("/nonexistent/frame.jpg")).unwrap();
        let err = source.connect().unwrap_err();
        assert!(matches!(err, ClassifyError::DeviceUnavailable(_)));
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn video_nodes_need_v4l2_feature() {
        let err = CameraSource::new(config("/dev/video0")).err().unwrap();
        assert!(matches!(err, ClassifyError::DeviceUnavailable(_)));
    }
}
