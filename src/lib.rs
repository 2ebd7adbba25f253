//! Live camera classification
//!
//! This crate classifies frames from a live camera with one of several image
//! classification models and shows the top label as frames keep arriving.
//!
//! # Architecture
//!
//! At most one inference is in flight at any time. Frames captured while the
//! model is busy are dropped, never queued, so the displayed label always
//! describes a recent frame.
//!
//! # Module Structure
//!
//! - `ingest`: Capture sources (synthetic scenes, still images, V4L2 devices)
//! - `gate`: Single-flight admission (`FrameGate`, `FrameToken`)
//! - `preprocess`: Center-crop and scale to the model's input size
//! - `model`: Supported models and their `ModelProfile`s
//! - `classify`: Classifier backends and the per-model registry
//! - `display`: Display state, snapshots and sinks
//! - `pipeline`: The capture and inference workers tying it together
//! - `config`: `classifyd` configuration (file + environment)

pub mod classify;
pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod gate;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod preprocess;

pub use classify::{BackendRegistry, ClassifierBackend, Prediction, StubBackend};
#[cfg(feature = "backend-tract")]
pub use classify::TractBackend;
pub use config::ClassifydConfig;
pub use display::{Display, DisplaySink, DisplaySnapshot, JsonSink, LogSink, PreviewWriter, Status};
pub use error::{ClassifyError, ClassifyResult};
pub use frame::Frame;
pub use gate::{FrameGate, FrameToken};
pub use ingest::{CameraConfig, CameraSource};
pub use model::{ModelKind, ModelProfile, ModelSelection};
pub use pipeline::{Admission, FrameSink, Pipeline, PipelineHandle};
pub use preprocess::{crop_and_scale, CropRect, CropStrategy, Preprocessor};
