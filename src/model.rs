//! Selectable model variants and their input profiles.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Input shape required by a classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ModelProfile {
    pub name: &'static str,
    pub input_width: u32,
    pub input_height: u32,
}

/// The classifiers a user can pick from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[default]
    #[serde(rename = "googlenet-places")]
    GoogLeNetPlaces,
    #[serde(rename = "inceptionv3")]
    InceptionV3,
    #[serde(rename = "resnet50")]
    Resnet50,
    #[serde(rename = "vgg16")]
    Vgg16,
}

const GOOGLENET_PLACES: ModelProfile = ModelProfile {
    name: "GoogLeNetPlaces",
    input_width: 224,
    input_height: 224,
};

const INCEPTION_V3: ModelProfile = ModelProfile {
    name: "Inceptionv3",
    input_width: 299,
    input_height: 299,
};

const RESNET50: ModelProfile = ModelProfile {
    name: "Resnet50",
    input_width: 224,
    input_height: 224,
};

const VGG16: ModelProfile = ModelProfile {
    name: "VGG16",
    input_width: 224,
    input_height: 224,
};

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::GoogLeNetPlaces,
        ModelKind::InceptionV3,
        ModelKind::Resnet50,
        ModelKind::Vgg16,
    ];

    pub fn profile(self) -> ModelProfile {
        match self {
            ModelKind::GoogLeNetPlaces => GOOGLENET_PLACES,
            ModelKind::InceptionV3 => INCEPTION_V3,
            ModelKind::Resnet50 => RESNET50,
            ModelKind::Vgg16 => VGG16,
        }
    }

    /// Stable key used in config files and commands.
    pub fn key(self) -> &'static str {
        match self {
            ModelKind::GoogLeNetPlaces => "googlenet-places",
            ModelKind::InceptionV3 => "inceptionv3",
            ModelKind::Resnet50 => "resnet50",
            ModelKind::Vgg16 => "vgg16",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().name)
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        ModelKind::ALL
            .into_iter()
            .find(|kind| {
                let key: String = kind.key().chars().filter(|c| *c != '-').collect();
                key == wanted || kind.profile().name.to_ascii_lowercase() == wanted
            })
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown model '{}' (expected one of: {})",
                    s,
                    ModelKind::ALL.map(|kind| kind.key()).join(", ")
                )
            })
    }
}

/// Currently selected model, shared between the user-facing side and the capture worker.
///
/// The capture worker reads it once per admitted frame; the profile travels with the
/// frame from then on.
#[derive(Clone, Debug, Default)]
pub struct ModelSelection {
    current: Arc<RwLock<ModelKind>>,
}

impl ModelSelection {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            current: Arc::new(RwLock::new(kind)),
        }
    }

    pub fn current(&self) -> ModelKind {
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Switch models. Returns the previous selection.
    pub fn select(&self, kind: ModelKind) -> ModelKind {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inception_uses_larger_input() {
        let profile = ModelKind::InceptionV3.profile();
        assert_eq!((profile.input_width, profile.input_height), (299, 299));
        for kind in [ModelKind::GoogLeNetPlaces, ModelKind::Resnet50, ModelKind::Vgg16] {
            let profile = kind.profile();
            assert_eq!((profile.input_width, profile.input_height), (224, 224));
        }
    }

    #[test]
    fn parses_keys_and_display_names() {
        assert_eq!("resnet50".parse::<ModelKind>().unwrap(), ModelKind::Resnet50);
        assert_eq!("VGG16".parse::<ModelKind>().unwrap(), ModelKind::Vgg16);
        assert_eq!(
            "GoogLeNetPlaces".parse::<ModelKind>().unwrap(),
            ModelKind::GoogLeNetPlaces
        );
        assert_eq!(
            "googlenet-places".parse::<ModelKind>().unwrap(),
            ModelKind::GoogLeNetPlaces
        );
        assert_eq!(
            " Inceptionv3 ".parse::<ModelKind>().unwrap(),
            ModelKind::InceptionV3
        );
        assert!("alexnet".parse::<ModelKind>().is_err());
    }

    #[test]
    fn selection_is_shared_between_clones() {
        let selection = ModelSelection::default();
        let reader = selection.clone();
        assert_eq!(reader.current(), ModelKind::GoogLeNetPlaces);

        let previous = selection.select(ModelKind::InceptionV3);
        assert_eq!(previous, ModelKind::GoogLeNetPlaces);
        assert_eq!(reader.current(), ModelKind::InceptionV3);
    }

    #[test]
    fn serde_matches_keys() {
        for kind in ModelKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.key()));
            let back: ModelKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }
}
