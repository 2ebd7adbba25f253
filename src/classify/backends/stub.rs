use image::RgbImage;

use crate::classify::backend::ClassifierBackend;
use crate::classify::result::{softmax, Prediction};
use crate::error::{ClassifyError, ClassifyResult};

const LABELS: [&str; 3] = ["red", "green", "blue"];

/// Stub backend for testing and demos.
///
/// Scores each class by the mean intensity of its colour channel, so the result
/// depends only on the input pixels.
#[derive(Default)]
pub struct StubBackend {
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed `classify` calls.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl ClassifierBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&mut self, input: &RgbImage) -> ClassifyResult<Prediction> {
        let pixel_count = input.width() as u64 * input.height() as u64;
        if pixel_count == 0 {
            return Err(ClassifyError::inference_failed("empty input buffer"));
        }

        let mut sums = [0u64; 3];
        for pixel in input.pixels() {
            for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                *sum += channel as u64;
            }
        }
        // Mean intensity in 0..=1, sharpened so a dominant channel stands out.
        let scores: Vec<f32> = sums
            .iter()
            .map(|sum| (*sum as f64 / pixel_count as f64 / 255.0 * 8.0) as f32)
            .collect();

        self.calls += 1;
        Prediction::from_probabilities(
            LABELS
                .iter()
                .map(|label| label.to_string())
                .zip(softmax(&scores)),
        )
    }
}
