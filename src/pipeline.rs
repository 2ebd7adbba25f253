//! Capture -> gate -> preprocess -> inference -> display.
//!
//! Two workers run per pipeline:
//! - the capture worker pulls frames from a `CameraSource` and offers each one to
//!   the `FrameGate` through `FrameSink::on_frame`;
//! - the inference worker receives admitted `FrameToken`s over a capacity-1 channel,
//!   preprocesses, classifies, reopens the gate and publishes a `DisplaySnapshot`.
//!
//! The gate guarantees the channel never holds more than one token. An admitted
//! frame always runs to completion or failure; there is no cancellation and no
//! timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::classify::BackendRegistry;
use crate::display::{Display, DisplaySnapshot, PreviewWriter};
use crate::error::ClassifyError;
use crate::frame::Frame;
use crate::gate::{FrameGate, FrameToken};
use crate::ingest::CameraSource;
use crate::model::{ModelKind, ModelSelection};
use crate::preprocess::Preprocessor;

/// How often idle workers check the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Consecutive capture failures before the capture worker gives up.
const MAX_CAPTURE_FAILURES: u32 = 10;

/// Outcome of offering a frame to the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Dropped,
}

/// Per-frame callback used by the capture side.
#[derive(Clone)]
pub struct FrameSink {
    gate: FrameGate,
    selection: ModelSelection,
    display: Display,
    tx: SyncSender<FrameToken>,
}

impl FrameSink {
    /// Offer one captured frame. Frames arriving while an inference is in flight
    /// are dropped without error.
    pub fn on_frame(&self, frame: Frame) -> Admission {
        let model = self.selection.current();
        let Some(token) = self.gate.admit(frame, model) else {
            self.display.frame_seen(false);
            return Admission::Dropped;
        };
        self.display.frame_seen(true);
        if let Err(err) = self.tx.try_send(token) {
            // Only reachable after the inference worker has exited; dropping the
            // token reopens the gate.
            log::warn!("inference worker unavailable, frame dropped: {}", err);
            self.display.admission_revoked();
            return Admission::Dropped;
        }
        Admission::Admitted
    }
}

/// Pipeline builder.
pub struct Pipeline {
    registry: BackendRegistry,
    model: ModelKind,
    preprocessor: Preprocessor,
    preview: Option<PreviewWriter>,
}

impl Pipeline {
    pub fn new(registry: BackendRegistry, model: ModelKind) -> Self {
        Self {
            registry,
            model,
            preprocessor: Preprocessor::default(),
            preview: None,
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Write each model input to `writer` while preview is enabled.
    pub fn with_preview(mut self, writer: PreviewWriter) -> Self {
        self.preview = Some(writer);
        self
    }

    /// Spawn the inference worker. Returns the control handle and the presentation
    /// channel that receives a snapshot after every display change.
    pub fn start(self) -> Result<(PipelineHandle, Receiver<DisplaySnapshot>)> {
        let gate = FrameGate::new();
        let selection = ModelSelection::new(self.model);
        let display = Display::new(self.model);
        let shutdown = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::channel();
        let (tx, rx) = mpsc::sync_channel::<FrameToken>(1);

        let preview_configured = self.preview.is_some();
        let worker = InferenceWorker {
            registry: self.registry,
            preprocessor: self.preprocessor,
            preview: self.preview,
            display: display.clone(),
            events: events_tx.clone(),
            shutdown: shutdown.clone(),
        };
        let inference = std::thread::Builder::new()
            .name("inference".to_string())
            .spawn(move || worker.run(rx))?;

        log::info!(
            "pipeline started: model={} strategy={}",
            self.model,
            self.preprocessor.strategy()
        );

        let handle = PipelineHandle {
            has_preview: preview_configured,
            sink: FrameSink {
                gate,
                selection,
                display,
                tx,
            },
            events: events_tx,
            shutdown,
            inference: Some(inference),
            capture: None,
        };
        Ok((handle, events_rx))
    }
}

struct InferenceWorker {
    registry: BackendRegistry,
    preprocessor: Preprocessor,
    preview: Option<PreviewWriter>,
    display: Display,
    events: Sender<DisplaySnapshot>,
    shutdown: Arc<AtomicBool>,
}

impl InferenceWorker {
    fn run(self, rx: Receiver<FrameToken>) {
        loop {
            let token = match rx.recv_timeout(SHUTDOWN_POLL) {
                Ok(token) => token,
                Err(RecvTimeoutError::Timeout) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let snapshot = self.process(&token);
            token.complete();
            // Nobody listening is fine; the display state is still current.
            let _ = self.events.send(snapshot);
        }
        log::debug!("inference worker stopped");
    }

    fn process(&self, token: &FrameToken) -> DisplaySnapshot {
        let model = token.model();
        let started = Instant::now();
        let result = self
            .preprocessor
            .prepare(token.frame(), token.profile())
            .and_then(|input| {
                self.write_preview(&input);
                self.registry.classify(model, &input)
            });

        match result {
            Ok(prediction) => {
                log::debug!(
                    "frame #{} classified by {} as '{}' in {:?} (frame age {:?})",
                    token.frame().sequence,
                    model,
                    prediction.label,
                    started.elapsed(),
                    token.frame().age()
                );
                self.display.record_prediction(model, &prediction)
            }
            Err(err) => {
                log::warn!("frame #{} failed: {}", token.frame().sequence, err);
                self.display.record_inference_error(model, &err)
            }
        }
    }

    fn write_preview(&self, input: &image::RgbImage) {
        let Some(writer) = &self.preview else {
            return;
        };
        if !self.display.preview_enabled() {
            return;
        }
        if let Err(err) = writer.write(input) {
            log::warn!("preview not written: {:#}", err);
        }
    }
}

/// Control handle for a running pipeline.
pub struct PipelineHandle {
    sink: FrameSink,
    has_preview: bool,
    events: Sender<DisplaySnapshot>,
    shutdown: Arc<AtomicBool>,
    inference: Option<JoinHandle<()>>,
    capture: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Callback for pushing frames from a caller-driven capture loop.
    pub fn frame_sink(&self) -> FrameSink {
        self.sink.clone()
    }

    /// Run `source` on a dedicated capture worker, paced to `target_fps`
    /// (0 = as fast as the source delivers).
    pub fn spawn_capture(&mut self, mut source: CameraSource, target_fps: u32) -> Result<()> {
        if self.capture.is_some() {
            return Err(anyhow!("capture worker already running"));
        }
        let sink = self.sink.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        let interval = (target_fps > 0).then(|| Duration::from_secs(1) / target_fps);

        let join = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let mut failures = 0u32;
                while !shutdown.load(Ordering::SeqCst) {
                    let tick = Instant::now();
                    match source.next_frame() {
                        Ok(frame) => {
                            failures = 0;
                            sink.on_frame(frame);
                        }
                        Err(err) => {
                            failures += 1;
                            log::warn!(
                                "capture failed ({}/{}): {:#}",
                                failures,
                                MAX_CAPTURE_FAILURES,
                                err
                            );
                            if failures >= MAX_CAPTURE_FAILURES {
                                let err = ClassifyError::device_unavailable(format!(
                                    "{} stopped delivering frames: {:#}",
                                    source.stats().device,
                                    err
                                ));
                                let _ = events.send(sink.display.record_error(&err));
                                break;
                            }
                        }
                    }
                    if let Some(interval) = interval {
                        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
                            std::thread::sleep(rest);
                        }
                    }
                }
                let stats = source.stats();
                log::info!(
                    "capture worker stopped: {} frames from {}",
                    stats.frames_captured,
                    stats.device
                );
            })?;
        self.capture = Some(join);
        Ok(())
    }

    /// User action: switch models. Frames already admitted finish on the old model.
    pub fn select_model(&self, model: ModelKind) -> DisplaySnapshot {
        let previous = self.sink.selection.select(model);
        if previous != model {
            log::info!("model switched: {} -> {}", previous, model);
        }
        let snapshot = self.sink.display.model_selected(model);
        let _ = self.events.send(snapshot.clone());
        snapshot
    }

    /// Whether a preview writer was configured at build time.
    pub fn has_preview_writer(&self) -> bool {
        self.has_preview
    }

    pub fn set_preview(&self, enabled: bool) {
        self.sink.display.set_preview_enabled(enabled);
    }

    /// Surface an error that happened outside the workers (e.g. device setup).
    pub fn report_error(&self, error: &ClassifyError) -> DisplaySnapshot {
        let snapshot = self.sink.display.record_error(error);
        let _ = self.events.send(snapshot.clone());
        snapshot
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        self.sink.display.snapshot()
    }

    pub fn current_model(&self) -> ModelKind {
        self.sink.selection.current()
    }

    /// True while a capture worker is running.
    pub fn is_capturing(&self) -> bool {
        self.capture
            .as_ref()
            .is_some_and(|join| !join.is_finished())
    }

    /// True while an inference is in flight.
    pub fn is_busy(&self) -> bool {
        self.sink.gate.is_busy()
    }

    /// Stop both workers. An in-flight inference is allowed to finish.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.capture.take() {
            join.join()
                .map_err(|_| anyhow!("capture worker panicked"))?;
        }
        if let Some(join) = self.inference.take() {
            join.join()
                .map_err(|_| anyhow!("inference worker panicked"))?;
        }
        Ok(())
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
