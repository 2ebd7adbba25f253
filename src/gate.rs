//! Single-flight admission for inference.
//!
//! The capture worker asks the gate before handing a frame over. While an inference
//! is in flight every new frame is dropped; there is no queue. The inference
//! completion path is the only place that clears the busy flag, through
//! `FrameToken::complete` or by dropping the token.
//!
//! There is no timeout. A stalled inference call keeps the gate closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::frame::Frame;
use crate::model::{ModelKind, ModelProfile};

#[derive(Clone, Debug, Default)]
pub struct FrameGate {
    busy: Arc<AtomicBool>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true and marks the gate busy when nothing is in flight.
    pub fn try_admit(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clears the busy flag. Called once an inference completes or fails.
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Admit a frame, producing the token the inference call will own.
    ///
    /// Returns `None` when busy; the frame is dropped with it.
    pub fn admit(&self, frame: Frame, model: ModelKind) -> Option<FrameToken> {
        if !self.try_admit() {
            return None;
        }
        Some(FrameToken {
            frame,
            model,
            gate: Some(self.clone()),
        })
    }
}

/// An admitted frame awaiting inference.
///
/// Carries the model selected at admission, so a model switch mid-inference never
/// mixes profiles. Completing or dropping the token releases the gate exactly once.
#[derive(Debug)]
pub struct FrameToken {
    frame: Frame,
    model: ModelKind,
    gate: Option<FrameGate>,
}

impl FrameToken {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn profile(&self) -> ModelProfile {
        self.model.profile()
    }

    /// Finish the inference cycle and reopen the gate.
    pub fn complete(mut self) {
        self.release_gate();
    }

    fn release_gate(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release();
        }
    }
}

impl Drop for FrameToken {
    fn drop(&mut self) {
        self.release_gate();
    }
}
