//! preprocess_probe - show what a model actually sees
//!
//! Loads a still image, runs it through the same crop-and-scale step classifyd
//! uses, writes the model input as a JPEG and prints the crop region.

use anyhow::{Context, Result};
use clap::Parser;
use image::ImageFormat;
use serde::Serialize;
use std::path::PathBuf;

use live_classify::{
    BackendRegistry, CropRect, CropStrategy, Frame, ModelKind, Preprocessor, StubBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input image.
    #[arg(long)]
    input: PathBuf,
    /// Model whose input size to target.
    #[arg(long, default_value = "googlenet-places")]
    model: String,
    /// Crop strategy: exact or aspect-fill.
    #[arg(long, default_value = "exact")]
    strategy: String,
    /// Where to write the model input JPEG.
    #[arg(long, default_value = "model_input.jpg")]
    out: PathBuf,
    /// Also classify the model input with the stub backend.
    #[arg(long, default_value_t = false)]
    classify: bool,
}

#[derive(Serialize)]
struct ProbeReport {
    input: String,
    source_width: u32,
    source_height: u32,
    model: ModelKind,
    strategy: String,
    crop: CropRect,
    output: String,
    label: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let model: ModelKind = args.model.parse()?;
    let strategy: CropStrategy = args.strategy.parse()?;
    let profile = model.profile();

    let image = image::open(&args.input)
        .with_context(|| format!("open {}", args.input.display()))?
        .to_rgb8();
    let frame = Frame::from_image(image, 0);

    let preprocessor = Preprocessor::new(strategy);
    let rect = preprocessor.crop_rect(
        frame.width(),
        frame.height(),
        profile.input_width,
        profile.input_height,
    )?;
    let input = preprocessor.prepare(&frame, profile)?;
    input
        .save_with_format(&args.out, ImageFormat::Jpeg)
        .with_context(|| format!("write {}", args.out.display()))?;

    let label = if args.classify {
        let mut registry = BackendRegistry::new();
        registry.set_fallback(StubBackend::new());
        Some(registry.classify(model, &input)?.label)
    } else {
        None
    };

    let report = ProbeReport {
        input: args.input.display().to_string(),
        source_width: frame.width(),
        source_height: frame.height(),
        model,
        strategy: strategy.to_string(),
        crop: rect,
        output: args.out.display().to_string(),
        label,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
