//! Display state and the surfaces that render it.
//!
//! `DisplayState` is owned by `Display` and written only by the inference
//! completion path and by model selection. Everything that renders goes through
//! `DisplaySnapshot`, a plain copy.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use serde::Serialize;

use crate::classify::Prediction;
use crate::error::ClassifyError;
use crate::model::{ModelKind, ModelProfile};

/// Number of classes kept in a snapshot.
pub const SNAPSHOT_TOP_K: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum Status {
    Waiting,
    Label(String),
    Error(String),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Waiting => f.write_str("Waiting"),
            Status::Label(label) => f.write_str(label),
            Status::Error(message) => f.write_str(message),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub frames_seen: u64,
    pub frames_admitted: u64,
    pub frames_dropped: u64,
    pub inferences_completed: u64,
    pub inferences_failed: u64,
}

/// Read-only copy of the display state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplaySnapshot {
    pub model: ModelKind,
    pub profile: ModelProfile,
    pub status: Status,
    pub probabilities: Vec<(String, f64)>,
    pub counters: Counters,
    pub last_error: Option<String>,
    pub preview_enabled: bool,
}

impl DisplaySnapshot {
    /// One-line text rendering, e.g. `Resnet50: tabby (87.3%)`.
    pub fn summary(&self) -> String {
        match (&self.status, self.probabilities.first()) {
            (Status::Label(label), Some((_, p))) => {
                format!("{}: {} ({:.1}%)", self.profile.name, label, p * 100.0)
            }
            (status, _) => format!("{}: {}", self.profile.name, status),
        }
    }
}

struct DisplayState {
    model: ModelKind,
    status: Status,
    probabilities: Vec<(String, f64)>,
    counters: Counters,
    last_error: Option<String>,
}

impl DisplayState {
    fn snapshot(&self, preview_enabled: bool) -> DisplaySnapshot {
        DisplaySnapshot {
            model: self.model,
            profile: self.model.profile(),
            status: self.status.clone(),
            probabilities: self.probabilities.clone(),
            counters: self.counters,
            last_error: self.last_error.clone(),
            preview_enabled,
        }
    }
}

/// Shared handle to the display state.
#[derive(Clone)]
pub struct Display {
    state: Arc<Mutex<DisplayState>>,
    preview_enabled: Arc<AtomicBool>,
}

impl Display {
    pub fn new(model: ModelKind) -> Self {
        Self {
            state: Arc::new(Mutex::new(DisplayState {
                model,
                status: Status::Waiting,
                probabilities: Vec::new(),
                counters: Counters::default(),
                last_error: None,
            })),
            preview_enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        self.lock().snapshot(self.preview_enabled())
    }

    pub fn preview_enabled(&self) -> bool {
        self.preview_enabled.load(Ordering::Relaxed)
    }

    pub fn set_preview_enabled(&self, enabled: bool) {
        self.preview_enabled.store(enabled, Ordering::Relaxed);
    }

    /// A new model was selected; the old label no longer applies.
    pub(crate) fn model_selected(&self, model: ModelKind) -> DisplaySnapshot {
        let mut state = self.lock();
        if state.model != model {
            state.model = model;
            state.status = Status::Waiting;
            state.probabilities.clear();
        }
        state.snapshot(self.preview_enabled())
    }

    pub(crate) fn frame_seen(&self, admitted: bool) {
        let mut state = self.lock();
        state.counters.frames_seen += 1;
        if admitted {
            state.counters.frames_admitted += 1;
        } else {
            state.counters.frames_dropped += 1;
        }
    }

    pub(crate) fn record_prediction(
        &self,
        model: ModelKind,
        prediction: &Prediction,
    ) -> DisplaySnapshot {
        let mut state = self.lock();
        state.counters.inferences_completed += 1;
        // A result for a model that is no longer selected is counted but not shown.
        if state.model == model {
            state.status = Status::Label(prediction.label.clone());
            state.probabilities = prediction.top(SNAPSHOT_TOP_K).to_vec();
        }
        state.snapshot(self.preview_enabled())
    }

    /// A failed preprocess or inference for a frame admitted under `model`.
    pub(crate) fn record_inference_error(
        &self,
        model: ModelKind,
        error: &ClassifyError,
    ) -> DisplaySnapshot {
        let mut state = self.lock();
        let message = error.to_string();
        state.counters.inferences_failed += 1;
        // Same rule as predictions: a stale model's failure does not replace the status.
        if state.model == model {
            state.status = Status::Error(message.clone());
        }
        state.last_error = Some(message);
        state.snapshot(self.preview_enabled())
    }

    /// An admitted frame never reached the inference worker.
    pub(crate) fn admission_revoked(&self) {
        let mut state = self.lock();
        state.counters.frames_admitted = state.counters.frames_admitted.saturating_sub(1);
        state.counters.frames_dropped += 1;
    }

    /// Errors outside an inference cycle (device setup, capture). Always shown.
    pub(crate) fn record_error(&self, error: &ClassifyError) -> DisplaySnapshot {
        let mut state = self.lock();
        let message = error.to_string();
        if !matches!(error, ClassifyError::DeviceUnavailable(_)) {
            state.counters.inferences_failed += 1;
        }
        state.status = Status::Error(message.clone());
        state.last_error = Some(message);
        state.snapshot(self.preview_enabled())
    }
}

/// Something that shows display snapshots to a user.
pub trait DisplaySink: Send {
    fn render(&mut self, snapshot: &DisplaySnapshot) -> Result<()>;
}

/// Logs one summary line per update.
#[derive(Default)]
pub struct LogSink;

impl DisplaySink for LogSink {
    fn render(&mut self, snapshot: &DisplaySnapshot) -> Result<()> {
        match &snapshot.status {
            Status::Error(_) => log::warn!("{}", snapshot.summary()),
            _ => log::info!("{}", snapshot.summary()),
        }
        Ok(())
    }
}

/// Writes one JSON object per update.
pub struct JsonSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> DisplaySink for JsonSink<W> {
    fn render(&mut self, snapshot: &DisplaySnapshot) -> Result<()> {
        serde_json::to_writer(&mut self.out, snapshot).context("serialize display snapshot")?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Writes the latest preprocessed model input as a JPEG.
#[derive(Clone, Debug)]
pub struct PreviewWriter {
    path: PathBuf,
}

impl PreviewWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn write(&self, input: &RgbImage) -> Result<()> {
        input
            .save_with_format(&self.path, ImageFormat::Jpeg)
            .with_context(|| format!("write preview {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(label: &str) -> Prediction {
        Prediction::from_probabilities(vec![
            (label.to_string(), 0.9),
            ("other".to_string(), 0.1),
        ])
        .unwrap()
    }

    #[test]
    fn starts_waiting() {
        let display = Display::new(ModelKind::GoogLeNetPlaces);
        let snapshot = display.snapshot();
        assert_eq!(snapshot.status, Status::Waiting);
        assert_eq!(snapshot.summary(), "GoogLeNetPlaces: Waiting");
        assert_eq!(snapshot.counters, Counters::default());
    }

    #[test]
    fn prediction_updates_label_and_counters() {
        let display = Display::new(ModelKind::Resnet50);
        display.frame_seen(true);
        display.frame_seen(false);
        let snapshot = display.record_prediction(ModelKind::Resnet50, &prediction("tabby"));
        assert_eq!(snapshot.status, Status::Label("tabby".to_string()));
        assert_eq!(snapshot.summary(), "Resnet50: tabby (90.0%)");
        assert_eq!(snapshot.counters.frames_seen, 2);
        assert_eq!(snapshot.counters.frames_admitted, 1);
        assert_eq!(snapshot.counters.frames_dropped, 1);
        assert_eq!(snapshot.counters.inferences_completed, 1);
    }

    #[test]
    fn stale_model_result_is_not_shown() {
        let display = Display::new(ModelKind::Resnet50);
        display.model_selected(ModelKind::Vgg16);
        let snapshot = display.record_prediction(ModelKind::Resnet50, &prediction("tabby"));
        assert_eq!(snapshot.status, Status::Waiting);
        assert_eq!(snapshot.counters.inferences_completed, 1);
    }

    #[test]
    fn errors_are_shown_as_messages() {
        let display = Display::new(ModelKind::Vgg16);
        let snapshot =
            display.record_error(&ClassifyError::inference_failed("model call returned nil"));
        assert_eq!(
            snapshot.status,
            Status::Error("inference failed: model call returned nil".to_string())
        );
        assert_eq!(snapshot.counters.inferences_failed, 1);
        assert!(snapshot.last_error.is_some());
    }

    #[test]
    fn stale_model_failure_keeps_new_model_waiting() {
        let display = Display::new(ModelKind::InceptionV3);
        display.model_selected(ModelKind::Resnet50);
        let snapshot = display.record_inference_error(
            ModelKind::InceptionV3,
            &ClassifyError::invalid_frame("source 250x250 is smaller than target 299x299"),
        );
        assert_eq!(snapshot.model, ModelKind::Resnet50);
        assert_eq!(snapshot.status, Status::Waiting);
        assert_eq!(snapshot.counters.inferences_failed, 1);
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("invalid frame: source 250x250 is smaller than target 299x299")
        );

        let current = display.record_inference_error(
            ModelKind::Resnet50,
            &ClassifyError::inference_failed("backend crashed"),
        );
        assert_eq!(
            current.status,
            Status::Error("inference failed: backend crashed".to_string())
        );
        assert_eq!(current.counters.inferences_failed, 2);
    }

    #[test]
    fn revoked_admission_counts_as_dropped() {
        let display = Display::new(ModelKind::Vgg16);
        display.frame_seen(true);
        display.admission_revoked();
        let counters = display.snapshot().counters;
        assert_eq!(counters.frames_seen, 1);
        assert_eq!(counters.frames_admitted, 0);
        assert_eq!(counters.frames_dropped, 1);
    }

    #[test]
    fn json_sink_writes_one_line_per_snapshot() -> Result<()> {
        let display = Display::new(ModelKind::InceptionV3);
        let mut sink = JsonSink::new(Vec::new());
        sink.render(&display.snapshot())?;
        sink.render(&display.record_prediction(ModelKind::InceptionV3, &prediction("lakeside")))?;
        let out = String::from_utf8(sink.into_inner())?;
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let last: serde_json::Value = serde_json::from_str(lines[1])?;
        assert_eq!(last["model"], "inceptionv3");
        assert_eq!(last["status"]["state"], "label");
        assert_eq!(last["status"]["message"], "lakeside");
        assert_eq!(last["profile"]["input_width"], 299);
        Ok(())
    }

    #[test]
    fn preview_writer_saves_jpeg() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = PreviewWriter::new(dir.path().join("preview.jpg"));
        writer.write(&RgbImage::new(224, 224))?;
        let decoded = image::open(writer.path())?;
        assert_eq!((decoded.width(), decoded.height()), (224, 224));
        Ok(())
    }
}
