use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use image::RgbImage;

use crate::classify::result::Prediction;
use crate::error::{ClassifyError, ClassifyResult};
use crate::model::ModelKind;

use super::backend::ClassifierBackend;

pub type SharedBackend = Arc<Mutex<dyn ClassifierBackend>>;

/// Thread-safe registry of classifier backends, one per model.
///
/// Backends are wrapped in `Mutex` because `ClassifierBackend::classify` takes `&mut self`.
/// Models without a backend of their own fall back to the default backend.
pub struct BackendRegistry {
    backends: HashMap<ModelKind, SharedBackend>,
    fallback: Option<SharedBackend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            fallback: None,
        }
    }

    /// Register the backend that serves `kind`.
    pub fn register<B: ClassifierBackend + 'static>(&mut self, kind: ModelKind, backend: B) {
        log::debug!("registered backend '{}' for {}", backend.name(), kind);
        self.backends.insert(kind, Arc::new(Mutex::new(backend)));
    }

    /// Backend used for every model without a dedicated one.
    pub fn set_fallback<B: ClassifierBackend + 'static>(&mut self, backend: B) {
        self.fallback = Some(Arc::new(Mutex::new(backend)));
    }

    pub fn has_dedicated(&self, kind: ModelKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// Backend for a model: its own, else the fallback.
    pub fn backend_for(&self, kind: ModelKind) -> ClassifyResult<SharedBackend> {
        self.backends
            .get(&kind)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| {
                ClassifyError::inference_failed(format!("no backend registered for {}", kind))
            })
    }

    /// Names of the backend serving each model, in selection order.
    pub fn list(&self) -> Vec<(ModelKind, String)> {
        ModelKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let backend = self.backend_for(kind).ok()?;
                let name = backend.lock().ok()?.name().to_string();
                Some((kind, name))
            })
            .collect()
    }

    /// Warm up every distinct backend once.
    pub fn warm_up(&self) -> ClassifyResult<()> {
        let mut seen: Vec<SharedBackend> = Vec::new();
        for backend in self.backends.values().chain(self.fallback.iter()) {
            if seen.iter().any(|b| Arc::ptr_eq(b, backend)) {
                continue;
            }
            let mut guard = backend
                .lock()
                .map_err(|_| ClassifyError::inference_failed("backend lock poisoned"))?;
            guard.warm_up()?;
            seen.push(backend.clone());
        }
        Ok(())
    }

    /// Run the backend for `kind` on a preprocessed buffer.
    pub fn classify(&self, kind: ModelKind, input: &RgbImage) -> ClassifyResult<Prediction> {
        let backend = self.backend_for(kind)?;
        let mut guard = backend
            .lock()
            .map_err(|_| ClassifyError::inference_failed("backend lock poisoned"))?;
        guard.classify(input)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
