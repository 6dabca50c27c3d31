//! vinescan-pipeline: grape-leaf disease classification pipeline (sans-IO).
//!
//! Turns a leaf photograph into one of four disease verdicts through:
//! decode -> HSV foliage segmentation -> nearest-neighbor resize to the
//! model input -> inference -> arg-max -> static disease record.
//!
//! This crate operates on in-memory byte slices and returns structured
//! data. The only I/O is the optional ONNX model loader behind the `onnx`
//! feature; browser and CLI interaction lives in the host crates.

pub mod classifier;
pub mod diagnostics;
pub mod disease;
pub mod foliage;
pub mod hsv;
pub mod pipeline;
pub mod preprocess;
pub mod resolve;
pub mod types;

pub use classifier::Classifier;
#[cfg(feature = "onnx")]
pub use classifier::OnnxClassifier;
pub use disease::{DiseaseClass, DiseaseRecord, RecordLanguage};
pub use foliage::{FoliageMaskKind, FoliageMasker, Segmentation};
pub use pipeline::Pipeline;
pub use preprocess::InputTensor;
pub use resolve::{ClassificationResult, ScoreVector};
pub use types::{
    Dimensions, ModelConfig, PipelineConfig, PipelineError, StagedClassification,
};

/// Classify one leaf image.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP), a configuration and a
/// loaded model, and returns the winning disease class with the raw
/// scores.
///
/// # Pipeline steps
///
/// 1. Decode the image to RGBA
/// 2. Foliage segmentation (pluggable interval test)
/// 3. Nearest-neighbor resize to 224x224 and tensor conversion
/// 4. One model invocation
/// 5. First-max arg-max and disease lookup
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
/// Returns whatever the classifier fails with, untouched.
/// Returns [`PipelineError::NoScores`] or [`PipelineError::UnknownClass`]
/// when the scores cannot be mapped to a disease.
pub fn classify<C: Classifier + ?Sized>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    classifier: &C,
) -> Result<ClassificationResult, PipelineError> {
    // 1. Decode.
    let image = preprocess::decode(image_bytes)?;
    let rgba = preprocess::to_rgba(&image);

    // 2. Foliage segmentation.
    let segmentation = config.foliage_mask.segment(&rgba);

    // 3. Resize and tensor conversion.
    let tensor = InputTensor::from_rgba(&segmentation.image);

    // 4. Inference.
    let scores = classifier.predict(&tensor)?;

    // 5. Arg-max and disease lookup.
    let result = resolve::resolve(scores)?;
    tracing::debug!(label = result.label(), "classified leaf");
    Ok(result)
}

/// Classify one leaf image and keep every intermediate.
///
/// Same as [`classify`], but the returned [`StagedClassification`] also
/// holds the decoded image, the segmentation and the model input, so a
/// host can show the segmented leaf next to the verdict.
///
/// # Errors
///
/// Same as [`classify`].
pub fn classify_staged<C: Classifier + ?Sized>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    classifier: &C,
) -> Result<StagedClassification, PipelineError> {
    Ok(Pipeline::new(image_bytes.to_vec(), *config)
        .decode()?
        .segment()
        .prepare_input()
        .infer(classifier)?
        .resolve()?
        .into_result())
}
