use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use anyhow::Result;
use image::{Rgb, RgbImage};

use live_classify::{
    Admission, BackendRegistry, CameraConfig, CameraSource, ClassifierBackend, ClassifyError,
    ClassifyResult, DisplaySnapshot, Frame, ModelKind, Pipeline, Prediction, Status, StubBackend,
};

const WAIT: Duration = Duration::from_secs(5);

/// Reports each call's input width, then blocks until released.
struct BlockingBackend {
    started: Sender<u32>,
    release: Receiver<()>,
}

impl ClassifierBackend for BlockingBackend {
    fn name(&self) -> &'static str {
        "blocking"
    }

    fn classify(&mut self, input: &RgbImage) -> ClassifyResult<Prediction> {
        let _ = self.started.send(input.width());
        self.release
            .recv()
            .map_err(|_| ClassifyError::inference_failed("release channel closed"))?;
        Prediction::from_probabilities(vec![
            ("done".to_string(), 0.75),
            ("other".to_string(), 0.25),
        ])
    }
}

/// Fails every other call.
struct FlakyBackend {
    calls: u32,
}

impl ClassifierBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn classify(&mut self, _input: &RgbImage) -> ClassifyResult<Prediction> {
        self.calls += 1;
        if self.calls % 2 == 1 {
            return Err(ClassifyError::inference_failed("model returned no output"));
        }
        Prediction::from_probabilities(vec![("ok".to_string(), 1.0)])
    }
}

fn frame(sequence: u64) -> Frame {
    Frame::from_image(RgbImage::from_pixel(640, 480, Rgb([90, 120, 30])), sequence)
}

fn blocking_registry() -> (BackendRegistry, Receiver<u32>, Sender<()>) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let mut registry = BackendRegistry::new();
    registry.set_fallback(BlockingBackend {
        started: started_tx,
        release: release_rx,
    });
    (registry, started_rx, release_tx)
}

fn next_label(events: &Receiver<DisplaySnapshot>) -> Result<DisplaySnapshot> {
    loop {
        let snapshot = events.recv_timeout(WAIT)?;
        if snapshot.counters.inferences_completed + snapshot.counters.inferences_failed > 0 {
            return Ok(snapshot);
        }
    }
}

#[test]
fn frames_arriving_during_inference_are_dropped() -> Result<()> {
    let (registry, started, release) = blocking_registry();
    let (handle, events) = Pipeline::new(registry, ModelKind::Resnet50).start()?;
    let sink = handle.frame_sink();

    assert_eq!(sink.on_frame(frame(0)), Admission::Admitted);
    assert_eq!(started.recv_timeout(WAIT)?, 224);
    assert!(handle.is_busy());

    assert_eq!(sink.on_frame(frame(1)), Admission::Dropped);
    assert_eq!(sink.on_frame(frame(2)), Admission::Dropped);
    assert!(handle.is_busy());

    release.send(())?;
    let snapshot = next_label(&events)?;
    assert_eq!(snapshot.status, Status::Label("done".to_string()));
    assert_eq!(snapshot.summary(), "Resnet50: done (75.0%)");
    assert_eq!(snapshot.counters.frames_seen, 3);
    assert_eq!(snapshot.counters.frames_admitted, 1);
    assert_eq!(snapshot.counters.frames_dropped, 2);
    assert_eq!(snapshot.counters.inferences_completed, 1);

    // The gate reopens before the result is published.
    assert!(!handle.is_busy());
    assert_eq!(sink.on_frame(frame(3)), Admission::Admitted);
    started.recv_timeout(WAIT)?;
    release.send(())?;
    let snapshot = events.recv_timeout(WAIT)?;
    assert_eq!(snapshot.counters.inferences_completed, 2);

    handle.stop()
}

#[test]
fn model_switch_applies_to_next_admitted_frame() -> Result<()> {
    let (registry, started, release) = blocking_registry();
    let (handle, events) = Pipeline::new(registry, ModelKind::Resnet50).start()?;
    let sink = handle.frame_sink();

    assert_eq!(sink.on_frame(frame(0)), Admission::Admitted);
    assert_eq!(started.recv_timeout(WAIT)?, 224);

    let selected = handle.select_model(ModelKind::InceptionV3);
    assert_eq!(selected.model, ModelKind::InceptionV3);
    assert_eq!(selected.status, Status::Waiting);
    assert_eq!(events.recv_timeout(WAIT)?.model, ModelKind::InceptionV3);

    // The in-flight frame finishes on the old model; its label is not shown.
    release.send(())?;
    let stale = events.recv_timeout(WAIT)?;
    assert_eq!(stale.counters.inferences_completed, 1);
    assert_eq!(stale.status, Status::Waiting);
    assert_eq!(stale.profile.name, "Inceptionv3");

    assert_eq!(sink.on_frame(frame(1)), Admission::Admitted);
    assert_eq!(started.recv_timeout(WAIT)?, 299);
    release.send(())?;
    let fresh = events.recv_timeout(WAIT)?;
    assert_eq!(fresh.status, Status::Label("done".to_string()));
    assert_eq!(fresh.summary(), "Inceptionv3: done (75.0%)");

    handle.stop()
}

#[test]
fn inference_failure_is_displayed_and_gate_reopens() -> Result<()> {
    let mut registry = BackendRegistry::new();
    registry.set_fallback(FlakyBackend { calls: 0 });
    let (handle, events) = Pipeline::new(registry, ModelKind::Vgg16).start()?;
    let sink = handle.frame_sink();

    assert_eq!(sink.on_frame(frame(0)), Admission::Admitted);
    let failed = events.recv_timeout(WAIT)?;
    assert_eq!(
        failed.status,
        Status::Error("inference failed: model returned no output".to_string())
    );
    assert_eq!(failed.counters.inferences_failed, 1);
    assert!(!handle.is_busy());

    assert_eq!(sink.on_frame(frame(1)), Admission::Admitted);
    let recovered = events.recv_timeout(WAIT)?;
    assert_eq!(recovered.status, Status::Label("ok".to_string()));
    assert_eq!(
        recovered.last_error.as_deref(),
        Some("inference failed: model returned no output")
    );

    handle.stop()
}

#[test]
fn synthetic_camera_runs_end_to_end() -> Result<()> {
    let mut registry = BackendRegistry::new();
    registry.set_fallback(StubBackend::new());
    let (mut handle, events) = Pipeline::new(registry, ModelKind::GoogLeNetPlaces).start()?;

    let mut source = CameraSource::new(CameraConfig {
        device: "stub://integration".to_string(),
        target_fps: 0,
        ..CameraConfig::default()
    })?;
    source.connect()?;
    handle.spawn_capture(source, 0)?;

    let mut last = next_label(&events)?;
    while last.counters.inferences_completed < 3 {
        last = events.recv_timeout(WAIT)?;
    }
    handle.stop()?;

    let counters = last.counters;
    assert_eq!(
        counters.frames_seen,
        counters.frames_admitted + counters.frames_dropped
    );
    assert!(counters.inferences_completed <= counters.frames_admitted);
    assert_eq!(counters.inferences_failed, 0);
    match &last.status {
        Status::Label(label) => assert!(["red", "green", "blue"].contains(&label.as_str())),
        other => panic!("unexpected status {:?}", other),
    }
    Ok(())
}

#[test]
fn unavailable_device_is_reported() -> Result<()> {
    let mut registry = BackendRegistry::new();
    registry.set_fallback(StubBackend::new());
    let (handle, _events) = Pipeline::new(registry, ModelKind::GoogLeNetPlaces).start()?;

    let mut source = CameraSource::new(CameraConfig {
        device: "/nonexistent/camera.jpg".to_string(),
        ..CameraConfig::default()
    })?;
    let err = source.connect().unwrap_err();
    assert_eq!(err.kind(), "device_unavailable");

    let snapshot = handle.report_error(&err);
    assert!(matches!(snapshot.status, Status::Error(_)));
    assert_eq!(snapshot.counters.inferences_failed, 0);
    assert!(!handle.is_busy());

    handle.stop()
}

#[test]
fn capture_worker_gives_up_on_a_dead_source() -> Result<()> {
    let mut registry = BackendRegistry::new();
    registry.set_fallback(StubBackend::new());
    let (mut handle, events) = Pipeline::new(registry, ModelKind::GoogLeNetPlaces).start()?;

    // Never connected, so every capture attempt fails.
    let source = CameraSource::new(CameraConfig {
        device: "/nonexistent/dead-camera.jpg".to_string(),
        target_fps: 0,
        ..CameraConfig::default()
    })?;
    handle.spawn_capture(source, 0)?;

    let snapshot = events.recv_timeout(WAIT)?;
    match &snapshot.status {
        Status::Error(message) => {
            assert!(message.starts_with("capture device unavailable: /nonexistent/dead-camera.jpg"))
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(snapshot.counters.inferences_failed, 0);
    assert_eq!(snapshot.counters.frames_seen, 0);

    let deadline = std::time::Instant::now() + WAIT;
    while handle.is_capturing() {
        assert!(std::time::Instant::now() < deadline, "capture worker still running");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());

    handle.stop()
}
