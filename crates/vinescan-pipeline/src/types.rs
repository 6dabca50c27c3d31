//! Shared types for the vinescan classification pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::disease::RecordLanguage;
use crate::foliage::{FoliageMaskKind, Segmentation};
use crate::preprocess::InputTensor;
use crate::resolve::ClassificationResult;

/// Re-export `GrayImage` so downstream crates can reference the binary
/// foliage mask without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can reference decoded and
/// segmented rasters without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing raster.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Configuration for the classification pipeline.
///
/// The resize target and class table are fixed by the model contract and
/// are deliberately not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Which foliage interval test segments the leaf before inference.
    #[serde(default)]
    pub foliage_mask: FoliageMaskKind,

    /// Language of the description and remedy shown with the verdict.
    #[serde(default)]
    pub language: RecordLanguage,
}

impl PipelineConfig {
    /// Default foliage mask strategy.
    pub const DEFAULT_FOLIAGE_MASK: FoliageMaskKind = FoliageMaskKind::DegreeHue;
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            foliage_mask: Self::DEFAULT_FOLIAGE_MASK,
            language: RecordLanguage::default(),
        }
    }
}

/// Where the pretrained model lives and how long loading may take.
///
/// `load_timeout` is serialized as fractional seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the model artifact.
    pub model_path: std::path::PathBuf,

    /// Upper bound on model loading before giving up with
    /// [`PipelineError::ModelLoadTimeout`].
    #[serde(with = "crate::diagnostics::duration_serde", default = "default_load_timeout")]
    pub load_timeout: Duration,
}

impl ModelConfig {
    /// Default model-load timeout.
    pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

    /// Model config for `model_path` with the default timeout.
    #[must_use]
    pub fn new(model_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            load_timeout: Self::DEFAULT_LOAD_TIMEOUT,
        }
    }
}

const fn default_load_timeout() -> Duration {
    ModelConfig::DEFAULT_LOAD_TIMEOUT
}

/// Every intermediate of one classification run.
///
/// Lets a display host show the segmented leaf next to the verdict.
/// Does not derive `PartialEq` because `GrayImage` comparisons walk pixel
/// data.
#[derive(Debug, Clone)]
pub struct StagedClassification {
    /// Decoded RGBA image before segmentation.
    pub original: RgbaImage,
    /// Foliage-masked image, binary mask and kept-pixel count.
    pub segmentation: Segmentation,
    /// Model input built from the masked image.
    pub tensor: InputTensor,
    /// The winning class plus the raw scores.
    pub result: ClassificationResult,
    /// Source image dimensions in pixels.
    pub dimensions: Dimensions,
}

impl StagedClassification {
    /// The masked image actually fed to the model (before resizing).
    #[must_use]
    pub const fn segmented(&self) -> &RgbaImage {
        &self.segmentation.image
    }
}

/// Errors that can occur during pipeline processing.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A raster buffer could not be built from the supplied pixel data.
    #[error("failed to acquire raster buffer: {0}")]
    Context(String),

    /// The model artifact is missing, unreadable, or incompatible.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Model loading did not finish within the configured timeout.
    #[error("model loading timed out after {timeout:?}")]
    ModelLoadTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The model failed while running inference.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The winning score index has no entry in the disease table.
    #[error("class index {index} has no disease record (table has {class_count} entries)")]
    UnknownClass {
        /// Index of the winning score.
        index: usize,
        /// Number of entries in the disease table.
        class_count: usize,
    },

    /// The score vector was empty or held no comparable value.
    #[error("model produced no usable scores")]
    NoScores,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Human-readable message suitable for showing to an end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyInput => "Please upload an image first.".to_string(),
            Self::ImageDecode(_) => {
                "Could not read the image. Please upload a PNG, JPEG, BMP, or WebP photo."
                    .to_string()
            }
            Self::Context(_) => "The image could not be prepared for analysis.".to_string(),
            Self::ModelLoad(_) | Self::ModelLoadTimeout { .. } => {
                "The classification model is unavailable. Please try again later.".to_string()
            }
            Self::Inference(_) | Self::UnknownClass { .. } | Self::NoScores => {
                "The leaf could not be classified. Please try a different photo.".to_string()
            }
            Self::InvalidConfig(msg) => format!("Invalid settings: {msg}"),
        }
    }
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `image::ImageError` does not implement serde, so the `ImageDecode`
/// variant stores its `Display` string instead.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    Context(String),
    ModelLoad(String),
    ModelLoadTimeout {
        #[serde(with = "crate::diagnostics::duration_serde")]
        timeout: Duration,
    },
    Inference(String),
    UnknownClass {
        index: usize,
        class_count: usize,
    },
    NoScores,
    InvalidConfig(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::Context(s) => PipelineErrorProxy::Context(s.clone()),
            Self::ModelLoad(s) => PipelineErrorProxy::ModelLoad(s.clone()),
            Self::ModelLoadTimeout { timeout } => {
                PipelineErrorProxy::ModelLoadTimeout { timeout: *timeout }
            }
            Self::Inference(s) => PipelineErrorProxy::Inference(s.clone()),
            Self::UnknownClass { index, class_count } => PipelineErrorProxy::UnknownClass {
                index: *index,
                class_count: *class_count,
            },
            Self::NoScores => PipelineErrorProxy::NoScores,
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image::ImageError cannot be rebuilt; keep the
            // decode-failure kind and carry the message as an I/O cause.
            PipelineErrorProxy::ImageDecode(msg) => Self::ImageDecode(image::ImageError::IoError(
                std::io::Error::new(std::io::ErrorKind::InvalidData, msg),
            )),
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::Context(s) => Self::Context(s),
            PipelineErrorProxy::ModelLoad(s) => Self::ModelLoad(s),
            PipelineErrorProxy::ModelLoadTimeout { timeout } => Self::ModelLoadTimeout { timeout },
            PipelineErrorProxy::Inference(s) => Self::Inference(s),
            PipelineErrorProxy::UnknownClass { index, class_count } => {
                Self::UnknownClass { index, class_count }
            }
            PipelineErrorProxy::NoScores => Self::NoScores,
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
        })
    }
}
