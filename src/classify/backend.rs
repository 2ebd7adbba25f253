use image::RgbImage;

use crate::classify::result::Prediction;
use crate::error::ClassifyResult;

/// Classifier backend trait.
///
/// A backend is handed a buffer that already matches its model's input size and
/// returns the top label with per-class probabilities. Model execution, weights and
/// acceleration all live behind this boundary.
pub trait ClassifierBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the model on a preprocessed buffer.
    ///
    /// Failures are reported as `ClassifyError::InferenceFailed`.
    fn classify(&mut self, input: &RgbImage) -> ClassifyResult<Prediction>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> ClassifyResult<()> {
        Ok(())
    }
}
