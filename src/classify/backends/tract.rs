#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::classify::backend::ClassifierBackend;
use crate::classify::result::{softmax, Prediction};
use crate::error::{ClassifyError, ClassifyResult};
use crate::model::ModelProfile;

/// Tract-based backend for ONNX image classifiers.
///
/// Loads a local model file with a `1x3xHxW` f32 input and treats the first output
/// as class logits.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    labels: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for `profile`'s input size.
    pub fn new<P: AsRef<Path>>(model_path: P, profile: ModelProfile) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (width, height) = (profile.input_width, profile.input_height);
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} for {} ({}x{})",
            model_path.display(),
            profile.name,
            width,
            height
        );

        Ok(Self {
            model,
            width,
            height,
            labels: Vec::new(),
        })
    }

    /// Attach class labels, one per line. Blank lines are skipped.
    pub fn with_labels_file<P: AsRef<Path>>(mut self, labels_path: P) -> Result<Self> {
        let labels_path = labels_path.as_ref();
        let raw = std::fs::read_to_string(labels_path)
            .with_context(|| format!("failed to read labels from {}", labels_path.display()))?;
        self.labels = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(self)
    }

    fn build_input(&self, input: &RgbImage) -> Result<Tensor> {
        let (width, height) = input.dimensions();
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "input size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let tensor = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, channel, y, x)| input.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );

        Ok(tensor.into_tensor())
    }

    fn label_for(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", index))
    }

    fn extract_prediction(&self, outputs: TVec<TValue>) -> Result<Prediction> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let scores: Vec<f32> = scores.iter().copied().collect();
        let probabilities = softmax(&scores);
        Ok(Prediction::from_probabilities(
            probabilities
                .into_iter()
                .enumerate()
                .map(|(index, p)| (self.label_for(index), p)),
        )?)
    }

    fn run(&mut self, input: &RgbImage) -> Result<Prediction> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        self.extract_prediction(outputs)
    }
}

impl ClassifierBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, input: &RgbImage) -> ClassifyResult<Prediction> {
        self.run(input)
            .map_err(|err| ClassifyError::inference_failed(format!("{:#}", err)))
    }

    fn warm_up(&mut self) -> ClassifyResult<()> {
        let blank = RgbImage::new(self.width, self.height);
        self.classify(&blank).map(|_| ())
    }
}
