use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ingest::CameraConfig;
use crate::model::ModelKind;
use crate::preprocess::CropStrategy;

#[derive(Debug, Deserialize, Default)]
struct ClassifydConfigFile {
    model: Option<String>,
    capture: Option<CaptureConfigFile>,
    preprocess: Option<PreprocessConfigFile>,
    preview: Option<PreviewConfigFile>,
    models: Option<HashMap<String, ModelFileConfig>>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    scene_period: Option<u64>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PreprocessConfigFile {
    strategy: Option<CropStrategy>,
}

#[derive(Debug, Deserialize, Default)]
struct PreviewConfigFile {
    path: Option<PathBuf>,
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
struct ModelFileConfig {
    onnx_path: PathBuf,
    labels_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClassifydConfig {
    pub model: ModelKind,
    pub capture: CameraConfig,
    pub strategy: CropStrategy,
    pub preview: PreviewSettings,
    /// ONNX files per model. Models without one use the stub backend.
    pub model_files: HashMap<ModelKind, ModelFiles>,
}

#[derive(Debug, Clone, Default)]
pub struct PreviewSettings {
    pub path: Option<PathBuf>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub onnx_path: PathBuf,
    pub labels_path: Option<PathBuf>,
}

impl Default for ClassifydConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            capture: CameraConfig::default(),
            strategy: CropStrategy::default(),
            preview: PreviewSettings::default(),
            model_files: HashMap::new(),
        }
    }
}

impl ClassifydConfig {
    /// Load from `CLASSIFY_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CLASSIFY_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if any), apply env overrides, validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ClassifydConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClassifydConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let model = match file.model.as_deref() {
            Some(name) => name.parse()?,
            None => defaults.model,
        };
        let capture = file.capture.unwrap_or_default();
        let capture = CameraConfig {
            device: capture.device.unwrap_or(defaults.capture.device),
            target_fps: capture.target_fps.unwrap_or(defaults.capture.target_fps),
            width: capture.width.unwrap_or(defaults.capture.width),
            height: capture.height.unwrap_or(defaults.capture.height),
            scene_period: capture.scene_period.unwrap_or(defaults.capture.scene_period),
            seed: capture.seed.unwrap_or(defaults.capture.seed),
        };
        let strategy = file
            .preprocess
            .and_then(|preprocess| preprocess.strategy)
            .unwrap_or(defaults.strategy);
        let preview = file.preview.unwrap_or_default();
        let preview = PreviewSettings {
            enabled: preview.enabled.unwrap_or(preview.path.is_some()),
            path: preview.path,
        };

        let mut model_files = HashMap::new();
        for (name, files) in file.models.unwrap_or_default() {
            let kind: ModelKind = name
                .parse()
                .with_context(|| format!("invalid entry in [models]: {}", name))?;
            model_files.insert(
                kind,
                ModelFiles {
                    onnx_path: files.onnx_path,
                    labels_path: files.labels_path,
                },
            );
        }

        Ok(Self {
            model,
            capture,
            strategy,
            preview,
            model_files,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("CLASSIFY_DEVICE") {
            if !device.trim().is_empty() {
                self.capture.device = device;
            }
        }
        if let Ok(model) = std::env::var("CLASSIFY_MODEL") {
            if !model.trim().is_empty() {
                self.model = model.parse()?;
            }
        }
        if let Ok(fps) = std::env::var("CLASSIFY_FPS") {
            self.capture.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("CLASSIFY_FPS must be a non-negative integer"))?;
        }
        if let Ok(width) = std::env::var("CLASSIFY_WIDTH") {
            self.capture.width = width
                .trim()
                .parse()
                .map_err(|_| anyhow!("CLASSIFY_WIDTH must be an integer number of pixels"))?;
        }
        if let Ok(height) = std::env::var("CLASSIFY_HEIGHT") {
            self.capture.height = height
                .trim()
                .parse()
                .map_err(|_| anyhow!("CLASSIFY_HEIGHT must be an integer number of pixels"))?;
        }
        if let Ok(strategy) = std::env::var("CLASSIFY_STRATEGY") {
            if !strategy.trim().is_empty() {
                self.strategy = strategy.parse()?;
            }
        }
        if let Ok(path) = std::env::var("CLASSIFY_PREVIEW_PATH") {
            if !path.trim().is_empty() {
                self.preview.path = Some(PathBuf::from(path));
                self.preview.enabled = true;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.capture.device.trim().is_empty() {
            return Err(anyhow!("capture device must not be empty"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!(
                "capture size must be non-zero, got {}x{}",
                self.capture.width,
                self.capture.height
            ));
        }
        if self.capture.scene_period == 0 {
            return Err(anyhow!("scene_period must be greater than zero"));
        }
        if self.preview.enabled && self.preview.path.is_none() {
            return Err(anyhow!("preview enabled without a preview path"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ClassifydConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() -> Result<()> {
        let cfg = ClassifydConfig::from_file(ClassifydConfigFile::default())?;
        assert_eq!(cfg.model, ModelKind::GoogLeNetPlaces);
        assert_eq!(cfg.capture.device, "stub://camera");
        assert_eq!((cfg.capture.width, cfg.capture.height), (640, 480));
        assert_eq!(cfg.strategy, CropStrategy::Exact);
        assert!(!cfg.preview.enabled);
        assert!(cfg.model_files.is_empty());
        Ok(())
    }

    #[test]
    fn preview_path_enables_preview_by_default() -> Result<()> {
        let file: ClassifydConfigFile =
            serde_json::from_str(r#"{"preview": {"path": "/tmp/p.jpg"}}"#)?;
        let cfg = ClassifydConfig::from_file(file)?;
        assert!(cfg.preview.enabled);
        Ok(())
    }

    #[test]
    fn unknown_model_names_are_rejected() {
        let file: ClassifydConfigFile = serde_json::from_str(r#"{"model": "alexnet"}"#).unwrap();
        assert!(ClassifydConfig::from_file(file).is_err());

        let file: ClassifydConfigFile =
            serde_json::from_str(r#"{"models": {"alexnet": {"onnx_path": "a.onnx"}}}"#).unwrap();
        assert!(ClassifydConfig::from_file(file).is_err());
    }

    #[test]
    fn zero_capture_size_fails_validation() -> Result<()> {
        let file: ClassifydConfigFile = serde_json::from_str(r#"{"capture": {"width": 0}}"#)?;
        let mut cfg = ClassifydConfig::from_file(file)?;
        assert!(cfg.validate().is_err());
        Ok(())
    }
}
