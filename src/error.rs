use thiserror::Error;

/// Errors surfaced by the capture, preprocessing and inference paths.
///
/// None of these are retried automatically. The next captured frame is the retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// Capture could not be initialised (missing device, unsupported source).
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    /// A frame could not be turned into a model input buffer.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    /// The model call failed.
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

impl ClassifyError {
    pub fn device_unavailable(detail: impl Into<String>) -> Self {
        Self::DeviceUnavailable(detail.into())
    }

    pub fn invalid_frame(detail: impl Into<String>) -> Self {
        Self::InvalidFrame(detail.into())
    }

    pub fn inference_failed(detail: impl Into<String>) -> Self {
        Self::InferenceFailed(detail.into())
    }

    /// Short kind name, used in status lines and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceUnavailable(_) => "device_unavailable",
            Self::InvalidFrame(_) => "invalid_frame",
            Self::InferenceFailed(_) => "inference_failed",
        }
    }
}

pub type ClassifyResult<T> = std::result::Result<T, ClassifyError>;
